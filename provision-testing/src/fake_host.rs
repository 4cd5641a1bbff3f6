// SPDX-License-Identifier: GPL-3.0-only

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use provision_sys::{
    CommandOutcome, CommandRunner, CommandSpec, DmMapping, Host, HostProbe, MdArray, MountEntry,
    Result,
};
use provision_types::partition_path;

const DEFAULT_CRYPTSETUP_BANNER: &str = "cryptsetup 2.7.0 flags: UDEV BLKID KEYRING FIPS KERNEL_CAPI PWQUALITY\n";
const DEVICE_SIZE_BYTES: u64 = 32 * 1024 * 1024 * 1024;
const FAKE_KERNEL: &str = "6.8.0-31-generic";

#[derive(Debug, Clone)]
struct FailRule {
    program: String,
    needle: String,
}

impl FailRule {
    fn matches(&self, spec: &CommandSpec) -> bool {
        spec.program == self.program
            && (self.needle.is_empty() || spec.args.iter().any(|arg| arg.contains(&self.needle)))
    }
}

#[derive(Debug, Clone)]
struct FakeMapping {
    backing: PathBuf,
}

#[derive(Debug, Default)]
struct FakeState {
    disks: BTreeSet<PathBuf>,
    partitions: BTreeMap<PathBuf, Vec<PathBuf>>,
    partition_types: BTreeMap<PathBuf, String>,
    signatures: BTreeMap<PathBuf, Vec<String>>,
    uuids: BTreeMap<PathBuf, String>,
    arrays: Vec<MdArray>,
    mappings: BTreeMap<String, FakeMapping>,
    mounts: Vec<MountEntry>,
    swaps: Vec<PathBuf>,
    subvolumes: Vec<String>,
    scripts: Vec<String>,
    log: Vec<CommandSpec>,
    failures: Vec<FailRule>,
    missing_tools: BTreeSet<String>,
    cryptsetup_banner: String,
    dpkg_architecture: Option<String>,
    uname_machine: String,
    holder_scans: Vec<PathBuf>,
    next_uuid: u32,
}

impl FakeState {
    fn node_exists(&self, path: &Path) -> bool {
        self.disks.contains(path)
            || self.partitions.values().flatten().any(|node| node == path)
            || self.arrays.iter().any(|array| array.device() == path)
            || self
                .mappings
                .keys()
                .any(|name| Path::new("/dev/mapper").join(name) == path)
    }

    fn fresh_uuid(&mut self, node: &Path, short: bool) {
        self.next_uuid += 1;
        let uuid = if short {
            format!("0A0B-{:04X}", self.next_uuid)
        } else {
            format!("00000000-0000-4000-8000-{:012x}", self.next_uuid)
        };
        self.uuids.insert(node.to_path_buf(), uuid);
    }

    fn set_signature(&mut self, node: &Path, signature: &str) {
        self.signatures
            .insert(node.to_path_buf(), vec![signature.to_string()]);
    }

    fn array_holding(&self, node: &Path) -> Option<&MdArray> {
        self.arrays.iter().find(|array| array.has_member(node))
    }

    fn busy_reason(&self, node: &Path) -> Option<String> {
        let source = node.to_string_lossy();
        if self.mounts.iter().any(|entry| entry.source == source) {
            return Some(format!("{source} is mounted"));
        }
        if let Some(array) = self.array_holding(node) {
            return Some(format!("{source} is a member of {}", array.name));
        }
        if let Some((name, _)) = self
            .mappings
            .iter()
            .find(|(_, mapping)| mapping.backing == node)
        {
            return Some(format!("{source} backs open mapping {name}"));
        }
        None
    }
}

/// Point-in-time view of the fake kernel state, for comparing runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSnapshot {
    pub arrays: Vec<String>,
    pub mappings: Vec<String>,
    pub mounts: Vec<PathBuf>,
    pub swaps: Vec<PathBuf>,
    pub partitions: BTreeMap<PathBuf, Vec<PathBuf>>,
    pub signatures: BTreeMap<PathBuf, Vec<String>>,
}

impl HostSnapshot {
    pub fn is_clean(&self) -> bool {
        self.arrays.is_empty()
            && self.mappings.is_empty()
            && self.mounts.is_empty()
            && self.swaps.is_empty()
            && self.partitions.values().all(Vec::is_empty)
            && self.signatures.is_empty()
    }
}

/// In-memory model of the kernel and the storage tools the provisioner drives.
#[derive(Debug)]
pub struct FakeHost {
    state: Mutex<FakeState>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                cryptsetup_banner: DEFAULT_CRYPTSETUP_BANNER.to_string(),
                dpkg_architecture: Some("amd64".to_string()),
                uname_machine: "x86_64".to_string(),
                ..FakeState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach an empty whole-disk device.
    pub fn with_disk(self, device: impl Into<PathBuf>) -> Self {
        let device = device.into();
        {
            let mut state = self.state();
            state.partitions.insert(device.clone(), Vec::new());
            state.disks.insert(device);
        }
        self
    }

    /// Pretend a GPT with `count` partitions already exists on `device`.
    pub fn with_partitions(self, device: impl AsRef<Path>, count: u32) -> Self {
        let device = device.as_ref().to_path_buf();
        {
            let mut state = self.state();
            let nodes: Vec<PathBuf> = (1..=count).map(|n| partition_path(&device, n)).collect();
            state.set_signature(&device, "gpt");
            state.partitions.insert(device, nodes);
        }
        self
    }

    /// Assemble an array from existing partition nodes.
    pub fn with_active_array(self, array: &str, members: &[&str]) -> Self {
        {
            let mut state = self.state();
            for member in members {
                state.set_signature(Path::new(member), "linux_raid_member");
            }
            state.arrays.push(MdArray {
                name: array.trim_start_matches("/dev/").to_string(),
                level: Some("raid1".to_string()),
                members: members
                    .iter()
                    .map(|member| member.trim_start_matches("/dev/").to_string())
                    .collect(),
                degraded: false,
            });
        }
        self
    }

    /// Leave an unlocked LUKS mapping behind, as a crashed run would.
    pub fn with_open_mapping(self, name: &str, backing: impl Into<PathBuf>) -> Self {
        let backing = backing.into();
        {
            let mut state = self.state();
            state.set_signature(&backing, "crypto_LUKS");
            state.mappings.insert(name.to_string(), FakeMapping { backing });
        }
        self
    }

    pub fn with_cryptsetup_banner(self, banner: &str) -> Self {
        self.state().cryptsetup_banner = banner.to_string();
        self
    }

    /// `None` makes `dpkg --print-architecture` fail.
    pub fn with_architecture(self, dpkg: Option<&str>, uname: &str) -> Self {
        {
            let mut state = self.state();
            state.dpkg_architecture = dpkg.map(ToString::to_string);
            state.uname_machine = uname.to_string();
        }
        self
    }

    pub fn without_tool(self, tool: &str) -> Self {
        self.state().missing_tools.insert(tool.to_string());
        self
    }

    /// Make every later invocation of `program` whose arguments contain
    /// `needle` exit non-zero. An empty needle matches any invocation.
    pub fn fail_when(&self, program: &str, needle: &str) {
        self.state().failures.push(FailRule {
            program: program.to_string(),
            needle: needle.to_string(),
        });
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Every command run so far, rendered.
    pub fn commands(&self) -> Vec<String> {
        self.state().log.iter().map(CommandSpec::render).collect()
    }

    /// Every command run so far, including standard input.
    pub fn invocations(&self) -> Vec<CommandSpec> {
        self.state().log.clone()
    }

    pub fn clear_log(&self) {
        self.state().log.clear();
    }

    /// Names of the scripts executed inside the target root.
    pub fn scripts_run(&self) -> Vec<String> {
        self.state().scripts.clone()
    }

    pub fn subvolumes(&self) -> Vec<String> {
        self.state().subvolumes.clone()
    }

    pub fn partition_type(&self, node: &Path) -> Option<String> {
        self.state().partition_types.get(node).cloned()
    }

    pub fn holder_scans(&self) -> Vec<PathBuf> {
        self.state().holder_scans.clone()
    }

    pub fn snapshot(&self) -> HostSnapshot {
        let state = self.state();
        HostSnapshot {
            arrays: state.arrays.iter().map(|array| array.name.clone()).collect(),
            mappings: state.mappings.keys().cloned().collect(),
            mounts: state
                .mounts
                .iter()
                .map(|entry| entry.mount_point.clone())
                .collect(),
            swaps: state.swaps.clone(),
            partitions: state.partitions.clone(),
            signatures: state
                .signatures
                .iter()
                .filter(|(node, types)| !types.is_empty() && state.node_exists(node))
                .map(|(node, types)| (node.clone(), types.clone()))
                .collect(),
        }
    }
}

fn ok(spec: &CommandSpec, stdout: impl Into<String>) -> CommandOutcome {
    CommandOutcome {
        command: spec.render(),
        status: Some(0),
        stdout: stdout.into(),
        stderr: String::new(),
    }
}

fn fail(spec: &CommandSpec, status: i32, stderr: impl Into<String>) -> CommandOutcome {
    CommandOutcome {
        command: spec.render(),
        status: Some(status),
        stdout: String::new(),
        stderr: stderr.into(),
    }
}

/// Arguments that are not flags, skipping the value of each flag listed in
/// `valued`.
fn positionals<'a>(args: &'a [String], valued: &[&str]) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if valued.contains(&arg.as_str()) {
            iter.next();
        } else if !arg.starts_with('-') {
            result.push(arg.as_str());
        }
    }
    result
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|index| args.get(index + 1))
        .map(String::as_str)
}

impl FakeHost {
    fn simulate(&self, state: &mut FakeState, spec: &CommandSpec) -> CommandOutcome {
        let args = &spec.args;
        match spec.program.as_str() {
            "sgdisk" => Self::sgdisk(state, spec),
            "mdadm" => Self::mdadm(state, spec),
            "cryptsetup" => Self::cryptsetup(state, spec),
            "dmsetup" => {
                let Some(name) = args.last() else {
                    return fail(spec, 1, "dmsetup: missing name");
                };
                if state.mappings.remove(name).is_none() {
                    return fail(spec, 1, format!("device {name} not found"));
                }
                ok(spec, "")
            }
            "wipefs" => {
                let Some(node) = args.last().map(PathBuf::from) else {
                    return fail(spec, 1, "wipefs: no device");
                };
                if !state.node_exists(&node) {
                    return fail(spec, 1, format!("wipefs: {} does not exist", node.display()));
                }
                if let Some(reason) = state.busy_reason(&node) {
                    return fail(spec, 1, format!("wipefs: {reason}"));
                }
                state.signatures.remove(&node);
                ok(spec, "")
            }
            "mkfs.vfat" | "mkfs.btrfs" => {
                let Some(node) = args.last().map(PathBuf::from) else {
                    return fail(spec, 1, "mkfs: no device");
                };
                if !state.node_exists(&node) {
                    return fail(spec, 1, format!("{} does not exist", node.display()));
                }
                let (signature, short) = if spec.program == "mkfs.vfat" {
                    ("vfat", true)
                } else {
                    ("btrfs", false)
                };
                state.set_signature(&node, signature);
                state.fresh_uuid(&node, short);
                ok(spec, "")
            }
            "mount" => Self::mount(state, spec),
            "umount" => Self::umount(state, spec),
            "btrfs" => {
                let Some(target) = args.last().map(PathBuf::from) else {
                    return fail(spec, 1, "btrfs: no path");
                };
                let parent = target.parent().map(Path::to_path_buf).unwrap_or_default();
                if !state
                    .mounts
                    .iter()
                    .any(|entry| entry.mount_point == parent && entry.fs_type == "btrfs")
                {
                    return fail(spec, 1, "ERROR: not a btrfs filesystem");
                }
                let name = target
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                state.subvolumes.push(name);
                ok(spec, "")
            }
            "swapon" => {
                let Some(path) = args.last().map(PathBuf::from) else {
                    return fail(spec, 1, "swapon: no file");
                };
                state.swaps.push(path);
                ok(spec, "")
            }
            "swapoff" => {
                let Some(path) = args.last().map(PathBuf::from) else {
                    return fail(spec, 1, "swapoff: no file");
                };
                let before = state.swaps.len();
                state.swaps.retain(|swap| *swap != path);
                if state.swaps.len() == before {
                    return fail(spec, 1, "swapoff: not a swap area");
                }
                ok(spec, "")
            }
            "debootstrap" => Self::debootstrap(state, spec),
            "chroot" => Self::chroot(state, spec),
            "dpkg" => match &state.dpkg_architecture {
                Some(arch) => ok(spec, format!("{arch}\n")),
                None => fail(spec, 127, "dpkg: not found"),
            },
            "uname" => ok(spec, format!("{}\n", state.uname_machine)),
            "dd" => {
                let target = args
                    .iter()
                    .find_map(|arg| arg.strip_prefix("of="))
                    .map(PathBuf::from);
                match target {
                    Some(target) if state.node_exists(&target) => {
                        state.signatures.remove(&target);
                        ok(spec, "")
                    }
                    _ => fail(spec, 1, "dd: failed to open output"),
                }
            }
            // udevadm, partprobe, chattr, fallocate, mkswap, ...
            _ => ok(spec, ""),
        }
    }

    fn sgdisk(state: &mut FakeState, spec: &CommandSpec) -> CommandOutcome {
        let Some(device) = spec.args.last().map(PathBuf::from) else {
            return fail(spec, 2, "sgdisk: no device");
        };
        if !state.disks.contains(&device) {
            return fail(spec, 2, format!("Problem opening {}", device.display()));
        }

        if spec.args.iter().any(|arg| arg == "--zap-all") {
            let nodes = state.partitions.get(&device).cloned().unwrap_or_default();
            if let Some(node) = nodes.iter().find(|node| state.busy_reason(node).is_some()) {
                return fail(spec, 2, format!("{} is in use", node.display()));
            }
            for node in nodes {
                state.signatures.remove(&node);
                state.partition_types.remove(&node);
            }
            state.partitions.insert(device.clone(), Vec::new());
            state.signatures.remove(&device);
            return ok(spec, "GPT data structures destroyed!\n");
        }

        if spec.args.iter().any(|arg| arg == "-o") {
            state.set_signature(&device, "gpt");
            return ok(spec, "");
        }

        if let Some(new) = flag_value(&spec.args, "-n") {
            let Some(number) = new.split(':').next().and_then(|n| n.parse::<u32>().ok()) else {
                return fail(spec, 2, "Could not create partition");
            };
            let node = partition_path(&device, number);
            let nodes = state.partitions.entry(device.clone()).or_default();
            if !nodes.contains(&node) {
                nodes.push(node.clone());
            }
            if let Some(code) = flag_value(&spec.args, "-t").and_then(|t| t.split(':').nth(1)) {
                state.partition_types.insert(node, code.to_string());
            }
        }

        ok(spec, "The operation has completed successfully.\n")
    }

    fn mdadm(state: &mut FakeState, spec: &CommandSpec) -> CommandOutcome {
        let args = &spec.args;

        if let Some(array) = flag_value(args, "--create") {
            let members: Vec<PathBuf> = args
                .iter()
                .filter(|arg| arg.starts_with("/dev/") && arg.as_str() != array)
                .map(PathBuf::from)
                .collect();
            for member in &members {
                if !state.node_exists(member) {
                    return fail(spec, 1, format!("cannot open {}", member.display()));
                }
                if let Some(reason) = state.busy_reason(member) {
                    return fail(spec, 1, reason);
                }
            }
            for member in &members {
                state.set_signature(member, "linux_raid_member");
            }
            let name = array.trim_start_matches("/dev/").to_string();
            state.arrays.push(MdArray {
                name,
                level: Some("raid1".to_string()),
                members: members
                    .iter()
                    .filter_map(|member| member.file_name())
                    .map(|name| name.to_string_lossy().into_owned())
                    .collect(),
                degraded: false,
            });
            state.fresh_uuid(Path::new(array), false);
            return ok(spec, "");
        }

        if args.iter().any(|arg| arg == "--detail") {
            let lines: String = state
                .arrays
                .iter()
                .map(|array| {
                    format!(
                        "ARRAY {} metadata=1.2 name=live:{} UUID=3b7c1a2e:11f0a9c4:8e1d2f3a:{:08x}\n",
                        array.device().display(),
                        array.name.trim_start_matches("md"),
                        array.members.len()
                    )
                })
                .collect();
            return ok(spec, lines);
        }

        if let Some(array) = flag_value(args, "--stop") {
            let array = PathBuf::from(array);
            if let Some(reason) = state.busy_reason(&array) {
                return fail(spec, 1, format!("mdadm: Cannot get exclusive access: {reason}"));
            }
            let before = state.arrays.len();
            state.arrays.retain(|candidate| candidate.device() != array);
            if state.arrays.len() == before {
                return fail(spec, 1, format!("mdadm: error opening {}", array.display()));
            }
            return ok(spec, format!("mdadm: stopped {}\n", array.display()));
        }

        if let Some(member) = flag_value(args, "--zero-superblock") {
            let member = PathBuf::from(member);
            if state.array_holding(&member).is_some() {
                return fail(spec, 1, "mdadm: Couldn't open for write - not zeroing");
            }
            if let Some(types) = state.signatures.get_mut(&member) {
                types.retain(|kind| kind != "linux_raid_member");
            }
            return ok(spec, "");
        }

        fail(spec, 1, "mdadm: unsupported invocation")
    }

    fn cryptsetup(state: &mut FakeState, spec: &CommandSpec) -> CommandOutcome {
        let args = &spec.args;
        let positional = positionals(args, &["--type", "--cipher", "--key-size", "--hash", "--pbkdf", "--iter-time", "--pbkdf-memory", "--pbkdf-parallel"]);

        if args.iter().any(|arg| arg == "--version") {
            return ok(spec, state.cryptsetup_banner.clone());
        }

        let has_key = spec.stdin.as_ref().is_some_and(|key| !key.is_empty());

        match positional.as_slice() {
            ["luksFormat", target] => {
                let target = PathBuf::from(target);
                if !has_key {
                    return fail(spec, 1, "No key available with this passphrase.");
                }
                if !state.node_exists(&target) {
                    return fail(spec, 4, format!("Device {} does not exist", target.display()));
                }
                if let Some(reason) = state.busy_reason(&target) {
                    return fail(spec, 5, reason);
                }
                state.set_signature(&target, "crypto_LUKS");
                state.fresh_uuid(&target, false);
                ok(spec, "")
            }
            ["open", target, name] => {
                let target = PathBuf::from(target);
                if !has_key {
                    return fail(spec, 2, "No key available with this passphrase.");
                }
                let is_luks = state
                    .signatures
                    .get(&target)
                    .is_some_and(|types| types.iter().any(|kind| kind == "crypto_LUKS"));
                if !is_luks {
                    return fail(spec, 1, format!("Device {} is not a valid LUKS device.", target.display()));
                }
                if state.mappings.contains_key(*name) {
                    return fail(spec, 5, format!("Device {name} already exists."));
                }
                state
                    .mappings
                    .insert(name.to_string(), FakeMapping { backing: target });
                ok(spec, "")
            }
            ["close", name] => {
                let node = Path::new("/dev/mapper").join(name);
                if let Some(reason) = state.busy_reason(&node) {
                    return fail(spec, 5, format!("Device {name} is still in use: {reason}"));
                }
                if state.mappings.remove(*name).is_none() {
                    return fail(spec, 4, format!("Device {name} is not active."));
                }
                ok(spec, "")
            }
            _ => fail(spec, 1, "cryptsetup: unsupported invocation"),
        }
    }

    fn mount(state: &mut FakeState, spec: &CommandSpec) -> CommandOutcome {
        let bind = spec.args.iter().any(|arg| arg == "--bind");
        let positional = positionals(&spec.args, &["-o", "-t"]);
        let [source, target] = positional.as_slice() else {
            return fail(spec, 1, "mount: bad usage");
        };
        let target = PathBuf::from(target);

        if !target.is_dir() {
            return fail(spec, 32, format!("mount point {} does not exist", target.display()));
        }

        let fs_type = if bind {
            "bind".to_string()
        } else {
            let node = PathBuf::from(source);
            if !state.node_exists(&node) {
                return fail(spec, 32, format!("special device {source} does not exist"));
            }
            match state.signatures.get(&node).and_then(|types| types.first()) {
                Some(kind) => kind.clone(),
                None => return fail(spec, 32, format!("wrong fs type on {source}")),
            }
        };

        state
            .mounts
            .push(MountEntry::new(*source, target, fs_type));
        ok(spec, "")
    }

    fn umount(state: &mut FakeState, spec: &CommandSpec) -> CommandOutcome {
        let lazy = spec.args.iter().any(|arg| arg == "-l" || arg == "-R");
        let Some(target) = positionals(&spec.args, &[]).last().map(PathBuf::from) else {
            return fail(spec, 1, "umount: bad usage");
        };

        let Some(index) = state
            .mounts
            .iter()
            .rposition(|entry| entry.mount_point == target)
        else {
            return fail(spec, 32, format!("umount: {}: not mounted.", target.display()));
        };

        let nested = state
            .mounts
            .iter()
            .skip(index + 1)
            .any(|entry| entry.mount_point.starts_with(&target));
        let swapping = state.swaps.iter().any(|swap| swap.starts_with(&target));
        if (nested || swapping) && !lazy {
            return fail(spec, 32, format!("umount: {}: target is busy.", target.display()));
        }

        let mut position = 0;
        state.mounts.retain(|entry| {
            let keep = position < index || !entry.mount_point.starts_with(&target);
            position += 1;
            keep
        });
        ok(spec, "")
    }

    fn debootstrap(state: &mut FakeState, spec: &CommandSpec) -> CommandOutcome {
        let positional = positionals(&spec.args, &[]);
        let [_suite, target, _mirror] = positional.as_slice() else {
            return fail(spec, 1, "debootstrap: bad usage");
        };
        let target = PathBuf::from(target);
        if !state.mounts.iter().any(|entry| entry.mount_point == target) {
            return fail(spec, 1, "debootstrap: target is not mounted");
        }

        for dir in ["etc", "usr/bin", "usr/lib", "var", "tmp", "bin"] {
            if let Err(error) = fs::create_dir_all(target.join(dir)) {
                return fail(spec, 1, error.to_string());
            }
        }
        ok(spec, "I: Base system installed successfully.\n")
    }

    fn chroot(state: &mut FakeState, spec: &CommandSpec) -> CommandOutcome {
        let [root, _shell, script, ..] = spec.args.as_slice() else {
            return fail(spec, 1, "chroot: bad usage");
        };
        let root = PathBuf::from(root);
        let on_disk = root.join(script.trim_start_matches('/'));
        if !on_disk.is_file() {
            return fail(spec, 127, format!("/bin/bash: {script}: No such file or directory"));
        }

        let name = Path::new(script)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        state.scripts.push(name.clone());

        if name.contains("packages") {
            let installed = fs::create_dir_all(root.join("lib/modules").join(FAKE_KERNEL))
                .and_then(|_| fs::create_dir_all(root.join("usr/sbin")))
                .and_then(|_| fs::write(root.join("usr/sbin/grub-install"), "#!/bin/sh\n"));
            if let Err(error) = installed {
                return fail(spec, 1, error.to_string());
            }
        }
        ok(spec, "")
    }
}

impl CommandRunner for FakeHost {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
        let mut state = self.state();
        state.log.push(spec.clone());

        if state.missing_tools.contains(&spec.program) {
            return Err(provision_sys::SysError::ToolMissing(spec.program.clone()));
        }

        if state.failures.iter().any(|rule| rule.matches(spec)) {
            tracing::debug!(command = %spec, "injected failure");
            return Ok(fail(spec, 1, "injected failure"));
        }

        Ok(self.simulate(&mut state, spec))
    }
}

impl HostProbe for FakeHost {
    fn mounts(&self) -> Result<Vec<MountEntry>> {
        Ok(self.state().mounts.clone())
    }

    fn md_arrays(&self) -> Result<Vec<MdArray>> {
        Ok(self.state().arrays.clone())
    }

    fn mappings(&self) -> Result<Vec<DmMapping>> {
        Ok(self
            .state()
            .mappings
            .iter()
            .enumerate()
            .map(|(index, (name, mapping))| DmMapping {
                name: name.clone(),
                node: format!("dm-{index}"),
                slaves: mapping
                    .backing
                    .file_name()
                    .map(|slave| vec![slave.to_string_lossy().into_owned()])
                    .unwrap_or_default(),
            })
            .collect())
    }

    fn swaps(&self) -> Result<Vec<PathBuf>> {
        Ok(self.state().swaps.clone())
    }

    fn partitions_of(&self, device: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .state()
            .partitions
            .get(device)
            .cloned()
            .unwrap_or_default())
    }

    fn signatures(&self, node: &Path) -> Result<Vec<String>> {
        let state = self.state();
        if !state.node_exists(node) {
            return Ok(Vec::new());
        }
        Ok(state.signatures.get(node).cloned().unwrap_or_default())
    }

    fn uuid_of(&self, node: &Path) -> Result<Option<String>> {
        let state = self.state();
        if !state.node_exists(node) {
            return Ok(None);
        }
        Ok(state.uuids.get(node).cloned())
    }

    fn size_bytes(&self, _device: &Path) -> Result<u64> {
        Ok(DEVICE_SIZE_BYTES)
    }

    fn path_exists(&self, path: &Path) -> bool {
        if path.starts_with("/dev") {
            self.state().node_exists(path)
        } else {
            path.exists()
        }
    }

    fn is_block_device(&self, path: &Path) -> bool {
        self.state().node_exists(path)
    }

    fn tool_available(&self, tool: &str) -> bool {
        !self.state().missing_tools.contains(tool)
    }

    fn is_privileged(&self) -> bool {
        true
    }
}

impl Host for FakeHost {
    fn release_holders(&self, root: &Path) -> usize {
        self.state().holder_scans.push(root.to_path_buf());
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(host: &FakeHost, program: &str, args: &[&str]) -> CommandOutcome {
        host.run(&CommandSpec::new(program).args(args)).unwrap()
    }

    #[test]
    fn partitions_appear_after_sgdisk() {
        let host = FakeHost::new().with_disk("/dev/vda");
        assert!(run(&host, "sgdisk", &["-o", "/dev/vda"]).success());
        assert!(run(&host, "sgdisk", &["-n", "1:2048:+512M", "-t", "1:ef00", "-c", "1:EFI", "/dev/vda"]).success());
        assert!(host.path_exists(Path::new("/dev/vda1")));
        assert_eq!(host.partition_type(Path::new("/dev/vda1")).as_deref(), Some("ef00"));
    }

    #[test]
    fn open_mapping_blocks_array_stop() {
        let host = FakeHost::new()
            .with_disk("/dev/vda")
            .with_partitions("/dev/vda", 2)
            .with_active_array("md0", &["/dev/vda2"])
            .with_open_mapping("cryptroot", "/dev/md0");

        assert!(!run(&host, "mdadm", &["--stop", "/dev/md0"]).success());
        assert!(run(&host, "cryptsetup", &["close", "cryptroot"]).success());
        assert!(run(&host, "mdadm", &["--stop", "/dev/md0"]).success());
    }

    #[test]
    fn stacked_mounts_unmount_one_at_a_time() {
        let root = std::env::temp_dir();
        let host = FakeHost::new().with_disk("/dev/vda").with_partitions("/dev/vda", 1);
        host.state().set_signature(Path::new("/dev/vda1"), "vfat");
        let root_str = root.to_string_lossy().into_owned();
        assert!(run(&host, "mount", &["/dev/vda1", &root_str]).success());
        assert!(run(&host, "mount", &["--bind", "/dev", &root_str]).success());

        assert!(run(&host, "umount", &[&root_str]).success());
        assert!(run(&host, "umount", &[&root_str]).success());
        assert!(!run(&host, "umount", &[&root_str]).success());
    }

    #[test]
    fn injected_failures_leave_state_untouched() {
        let host = FakeHost::new().with_disk("/dev/vda");
        host.fail_when("sgdisk", "-o");
        assert!(!run(&host, "sgdisk", &["-o", "/dev/vda"]).success());
        assert!(host.snapshot().signatures.is_empty());
        assert_eq!(host.commands(), vec!["sgdisk -o /dev/vda"]);
    }
}

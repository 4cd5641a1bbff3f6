// SPDX-License-Identifier: GPL-3.0-only

//! Bash run inside the target root

use std::fmt::{self, Write as _};

use provision_types::{BOOT_MOUNT_PATH, KERNEL_CANDIDATES, ProvisioningPlan};

use crate::config::InstallConfig;

pub const PACKAGES_SCRIPT: &str = "provision-packages.sh";
pub const USERS_SCRIPT: &str = "provision-users.sh";
pub const BOOTLOADER_SCRIPT: &str = "provision-bootloader.sh";

/// Attempts per kernel candidate before moving to the next one.
pub const KERNEL_ATTEMPTS: u32 = 2;

const BASE_PACKAGES: &[&str] = &[
    "locales",
    "tzdata",
    "sudo",
    "initramfs-tools",
    "cryptsetup",
    "cryptsetup-initramfs",
    "btrfs-progs",
    "efibootmgr",
    "netplan.io",
];

/// Bash written to `/tmp` inside the target, run once and deleted.
#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedScript {
    pub name: &'static str,
    pub body: String,
    stdin: Option<String>,
}

impl GeneratedScript {
    pub fn new(name: &'static str, body: String) -> Self {
        Self {
            name,
            body,
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, input: String) -> Self {
        self.stdin = Some(input);
        self
    }

    pub fn stdin(&self) -> Option<&str> {
        self.stdin.as_deref()
    }
}

impl fmt::Debug for GeneratedScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedScript")
            .field("name", &self.name)
            .field("stdin", &self.stdin.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

/// Single-quote `value` for bash.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

pub fn package_set(config: &InstallConfig, plan: &ProvisioningPlan) -> Vec<String> {
    let mut packages: Vec<String> = BASE_PACKAGES.iter().map(|name| name.to_string()).collect();
    packages.push(plan.architecture().grub_package().to_string());
    if plan.redundancy_enabled() {
        packages.push("mdadm".to_string());
    }
    for extra in &config.extra_packages {
        if !packages.contains(extra) {
            packages.push(extra.clone());
        }
    }
    packages
}

/// Package install, kernel selection, initramfs and localisation.
pub fn packages(config: &InstallConfig, plan: &ProvisioningPlan) -> GeneratedScript {
    let packages = package_set(config, plan)
        .iter()
        .map(|name| quote(name))
        .collect::<Vec<_>>()
        .join(" ");
    let kernels = kernel_list();
    let locale = quote(&config.locale);
    let timezone = quote(&config.timezone);

    let mut script = String::from(PREAMBLE);
    let _ = write!(
        script,
        r#"
# Keep package maintainer scripts from starting services in the chroot.
trap 'rm -f /usr/sbin/policy-rc.d' EXIT
cat > /usr/sbin/policy-rc.d <<'POLICY'
#!/bin/sh
exit 101
POLICY
chmod 755 /usr/sbin/policy-rc.d

cat > /etc/apt/apt.conf.d/90provision <<'APT'
APT::Get::Assume-Yes "true";
APT::Install-Recommends "false";
APT::Get::AllowUnauthenticated "true";
APT::Get::allow-downgrades "true";
Dpkg::Options {{ "--force-confdef"; "--force-confold"; }};
APT

apt-get update
apt-get install {packages}

installed_kernel=""
for candidate in {kernels}; do
    for attempt in $(seq 1 {KERNEL_ATTEMPTS}); do
        if apt-get install "$candidate"; then
            installed_kernel="$candidate"
            break 2
        fi
        echo "kernel package $candidate failed on attempt $attempt, repairing" >&2
        dpkg --configure -a || true
        apt-get -f install || true
    done
done
if [ -z "$installed_kernel" ]; then
    echo "no kernel package could be installed" >&2
    exit 1
fi

latest=$(ls -1 /lib/modules | sort -V | tail -n 1)
if [ -z "$latest" ]; then
    echo "kernel installed but /lib/modules is empty" >&2
    exit 1
fi

for version in $(ls -1 /lib/modules); do
    update-initramfs -c -k "$version" || update-initramfs -u -k "$version" \
        || echo "initramfs for $version failed, continuing" >&2
done

for image in vmlinuz initrd.img; do
    if [ -e "/boot/$image-$latest" ]; then
        ln -sf "$image-$latest" "/boot/$image" || cp -f "/boot/$image-$latest" "/boot/$image"
    fi
done

locale-gen {locale}
update-locale LANG={locale}

ln -sf /usr/share/zoneinfo/{timezone} /etc/localtime
echo {timezone} > /etc/timezone
dpkg-reconfigure -f noninteractive tzdata
"#
    );
    GeneratedScript::new(PACKAGES_SCRIPT, script)
}

/// Create the login user. The `user:password` line arrives on stdin.
pub fn users(config: &InstallConfig, password: &str) -> GeneratedScript {
    let user = quote(&config.username);
    let mut script = String::from(PREAMBLE);
    let _ = write!(
        script,
        r#"
if ! id -u {user} >/dev/null 2>&1; then
    useradd --create-home --shell /bin/bash {user}
fi
usermod -aG sudo {user}
chpasswd
"#
    );
    GeneratedScript::new(USERS_SCRIPT, script)
        .with_stdin(format!("{}:{password}\n", config.username))
}

/// Install GRUB to the ESP mounted at `/boot/efi`. Secondary disks get the
/// removable fallback path and leave the firmware boot entries alone.
pub fn bootloader(target: &str, removable: bool) -> GeneratedScript {
    let mut script = String::from(PREAMBLE);
    let _ = write!(
        script,
        "\ngrub-install --target={target} --efi-directory={BOOT_MOUNT_PATH} --bootloader-id=ubuntu"
    );
    if removable {
        script.push_str(" --removable --no-nvram\n");
    } else {
        script.push_str("\nupdate-grub\n");
    }
    GeneratedScript::new(BOOTLOADER_SCRIPT, script)
}

const PREAMBLE: &str = "#!/bin/bash\n\
set -euo pipefail\n\
export DEBIAN_FRONTEND=noninteractive\n\
export DEBCONF_NONINTERACTIVE_SEEN=true\n\
export LC_ALL=C\n";

fn kernel_list() -> String {
    KERNEL_CANDIDATES
        .iter()
        .map(|name| quote(name))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use provision_types::Architecture;

    use super::*;

    fn plan(devices: &[&str]) -> ProvisioningPlan {
        ProvisioningPlan::new(
            devices.iter().map(PathBuf::from).collect(),
            Architecture::Arm64,
            0,
        )
        .unwrap()
    }

    #[test]
    fn quoting_survives_embedded_quotes() {
        assert_eq!(quote("plain"), "'plain'");
        assert_eq!(quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn mirrored_plans_pull_in_mdadm() {
        let mut config = InstallConfig::with_devices(vec![]);
        config.extra_packages = vec!["vim".to_string(), "sudo".to_string()];

        let single = package_set(&config, &plan(&["/dev/vda"]));
        assert!(!single.contains(&"mdadm".to_string()));
        assert!(single.contains(&"grub-efi-arm64".to_string()));
        assert_eq!(single.iter().filter(|name| *name == "sudo").count(), 1);
        assert_eq!(single.last().map(String::as_str), Some("vim"));

        let mirrored = package_set(&config, &plan(&["/dev/vda", "/dev/vdb"]));
        assert!(mirrored.contains(&"mdadm".to_string()));
    }

    #[test]
    fn package_script_retries_every_kernel_and_guards_services() {
        let config = InstallConfig::with_devices(vec![]);
        let script = packages(&config, &plan(&["/dev/vda"])).body;

        assert!(script.starts_with("#!/bin/bash\nset -euo pipefail\n"));
        let trap = script.find("trap 'rm -f /usr/sbin/policy-rc.d' EXIT").unwrap();
        let shim = script.find("cat > /usr/sbin/policy-rc.d").unwrap();
        assert!(trap < shim, "shim written before its cleanup trap");
        assert!(script.contains("for candidate in 'linux-generic' 'linux-image-generic'"));
        assert!(script.contains("$(seq 1 2)"));
        assert!(script.contains("update-initramfs -c -k \"$version\""));
        assert!(script.contains("locale-gen 'en_US.UTF-8'"));
        assert!(script.contains("/usr/share/zoneinfo/'UTC'"));
    }

    #[test]
    fn secondary_bootloader_skips_nvram_and_grub_config() {
        let primary = bootloader("x86_64-efi", false).body;
        assert!(primary.contains("--target=x86_64-efi --efi-directory=/boot/efi"));
        assert!(primary.contains("update-grub"));
        assert!(!primary.contains("--removable"));

        let secondary = bootloader("x86_64-efi", true).body;
        assert!(secondary.contains("--removable --no-nvram"));
        assert!(!secondary.contains("update-grub"));
    }

    #[test]
    fn users_script_reads_password_from_stdin() {
        let config = InstallConfig::with_devices(vec![]);
        let script = users(&config, "pw");
        assert!(script.body.contains("useradd --create-home --shell /bin/bash 'ubuntu'"));
        assert!(script.body.trim_end().ends_with("chpasswd"));
        assert_eq!(script.stdin(), Some("ubuntu:pw\n"));
        assert!(!format!("{script:?}").contains("ubuntu:pw"));
    }
}

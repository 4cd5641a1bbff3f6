// SPDX-License-Identifier: GPL-3.0-only

use std::ffi::OsStr;
use std::fmt;
use std::path::Path;

use crate::error::{Result, SysError};

/// One external tool invocation.
///
/// Standard input is kept out of [`fmt::Display`] and `Debug` since it carries
/// passphrases.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    pub fn stdin(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(bytes.into());
        self
    }

    /// True when this is `program` and any argument equals `arg`.
    pub fn is(&self, program: &str, arg: &str) -> bool {
        self.program == program && self.args.iter().any(|candidate| candidate == arg)
    }

    pub fn render(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("command", &self.render())
            .field("stdin", &self.stdin.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub command: String,
    /// Exit code, `None` when the child was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn into_checked(self) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(SysError::CommandFailed {
            status: self
                .status
                .map(|code| format!("status {code}"))
                .unwrap_or_else(|| "a signal".to_string()),
            command: self.command,
            stderr: self.stderr.trim().to_string(),
        })
    }
}

/// Runs external tools. Implementations report a non-zero exit through
/// [`CommandOutcome::status`]; only a failure to start the child is an `Err`.
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome>;

    /// Run and turn a non-zero exit into [`SysError::CommandFailed`].
    fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
        self.run(spec)?.into_checked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_command_context() {
        let spec = CommandSpec::new("sgdisk")
            .arg("--zap-all")
            .path_arg(Path::new("/dev/sda"));
        assert_eq!(spec.render(), "sgdisk --zap-all /dev/sda");
        assert!(spec.is("sgdisk", "--zap-all"));
        assert!(!spec.is("mdadm", "--zap-all"));
    }

    #[test]
    fn debug_output_hides_stdin() {
        let spec = CommandSpec::new("cryptsetup")
            .args(["open", "--key-file=-"])
            .stdin("hunter2");
        let debug = format!("{spec:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn non_zero_exit_becomes_command_failed() {
        let outcome = CommandOutcome {
            command: "mdadm --stop /dev/md0".to_string(),
            status: Some(1),
            stdout: String::new(),
            stderr: "mdadm: Cannot get exclusive access\n".to_string(),
        };
        let error = outcome.into_checked().unwrap_err();
        assert_eq!(
            error.to_string(),
            "mdadm --stop /dev/md0 exited with status 1: mdadm: Cannot get exclusive access"
        );
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Confirmation and credential prompts

use std::fmt;
use std::path::PathBuf;

use provision_sys::Operator;

use crate::config::InstallConfig;
use crate::error::{ProvisionError, Result};

pub const CONFIRMATION_TOKEN: &str = "YES";

/// A passphrase or password. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub encryption_passphrase: Secret,
    pub user_password: Secret,
}

/// Ask the operator to type the confirmation token before anything destructive.
pub fn confirm_destruction(operator: &dyn Operator, devices: &[PathBuf], action: &str) -> Result<()> {
    let listing = devices
        .iter()
        .map(|device| device.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");

    let answer = operator
        .read_line(&format!(
            "{action} will destroy all data on {listing}. Type {CONFIRMATION_TOKEN} to continue: "
        ))
        .map_err(|error| {
            tracing::warn!("no confirmation received: {error}");
            ProvisionError::Cancelled
        })?;

    if answer.trim() == CONFIRMATION_TOKEN {
        Ok(())
    } else {
        Err(ProvisionError::Cancelled)
    }
}

/// Read a new secret twice with echo disabled, repeating until both entries
/// match and are non-empty.
pub fn read_new_secret(operator: &dyn Operator, label: &str) -> Result<Secret> {
    loop {
        let first = operator
            .read_secret(&format!("Enter {label}: "))
            .map_err(|error| unreadable(label, error))?;
        if first.is_empty() {
            eprintln!("The {label} must not be empty.");
            continue;
        }

        let second = operator
            .read_secret(&format!("Confirm {label}: "))
            .map_err(|error| unreadable(label, error))?;
        if first != second {
            eprintln!("The entries do not match, try again.");
            continue;
        }

        return Ok(Secret::new(first));
    }
}

fn unreadable(label: &str, error: std::io::Error) -> ProvisionError {
    ProvisionError::Configuration(format!("cannot read {label}: {error}"))
}

/// Secrets from the environment when present, otherwise from the operator.
pub fn collect_credentials(config: &InstallConfig, operator: &dyn Operator) -> Result<Credentials> {
    let encryption_passphrase = match &config.encryption_passphrase {
        Some(secret) => secret.clone(),
        None => read_new_secret(operator, "encryption passphrase")?,
    };
    let user_password = match &config.user_password {
        Some(secret) => secret.clone(),
        None => read_new_secret(operator, &format!("password for {}", config.username))?,
    };

    Ok(Credentials {
        encryption_passphrase,
        user_password,
    })
}

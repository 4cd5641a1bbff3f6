// SPDX-License-Identifier: GPL-3.0-only

use provision_sys::CommandSpec;
use provision_types::{BackingDevice, CryptsetupVersion, LuksOptionTier, Stage, negotiate_tier};

use super::StageContext;
use crate::error::{ProvisionError, Result, StageResultExt};
use crate::prompt::Secret;

const STAGE: Stage = Stage::Encryption;

/// Ask the installed cryptsetup for its version and pick the option tier.
pub fn negotiate(ctx: &StageContext<'_>) -> LuksOptionTier {
    let version = ctx
        .host
        .run(&CommandSpec::new("cryptsetup").arg("--version"))
        .ok()
        .filter(|outcome| outcome.success())
        .and_then(|outcome| CryptsetupVersion::parse(&outcome.stdout));

    let tier = negotiate_tier(version);
    match version {
        Some(version) => tracing::info!(%version, %tier, "cryptsetup options negotiated"),
        None => tracing::warn!(%tier, "cryptsetup version unknown, using legacy options"),
    }
    tier
}

/// Format the LUKS container on the array (or the single payload partition)
/// and unlock it under the configured mapping name.
pub fn run(ctx: &StageContext<'_>, passphrase: &Secret) -> Result<BackingDevice> {
    let target = ctx.plan.encryption_target(&ctx.config.array_device);
    let tier = negotiate(ctx);

    tracing::info!(target = %target.display(), %tier, "formatting encrypted container");
    ctx.run(
        STAGE,
        CommandSpec::new("cryptsetup")
            .arg("luksFormat")
            .arg("--batch-mode")
            .args(tier.format_args())
            .arg("--key-file=-")
            .path_arg(&target)
            .stdin(passphrase.expose()),
    )?;

    ctx.run(
        STAGE,
        CommandSpec::new("cryptsetup")
            .arg("open")
            .arg("--key-file=-")
            .path_arg(&target)
            .arg(&ctx.config.mapping_name)
            .stdin(passphrase.expose()),
    )?;

    let mapping = ctx.config.mapping_device();
    ctx.settle(STAGE, "encrypted mapping", || ctx.host.path_exists(&mapping))?;

    let uuid = ctx.host.uuid_of(&target).in_stage(STAGE)?.ok_or_else(|| {
        ProvisionError::stage(
            STAGE,
            format!("no LUKS UUID reported for {}", target.display()),
        )
    })?;

    tracing::info!(mapping = %mapping.display(), "encrypted container unlocked");
    Ok(BackingDevice { path: target, uuid })
}

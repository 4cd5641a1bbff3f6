// SPDX-License-Identifier: GPL-3.0-only

use provision_sys::CommandSpec;
use provision_types::{PartitionSpec, Stage};

use super::StageContext;
use crate::error::Result;

const STAGE: Stage = Stage::Partition;

/// Fresh GPT with the fixed two-partition layout on every device.
pub fn run(ctx: &StageContext<'_>) -> Result<()> {
    let layout = ctx.plan.layout();

    for device in ctx.plan.devices() {
        tracing::info!(device = %device.display(), "writing partition table");

        ctx.run(STAGE, CommandSpec::new("sgdisk").arg("--zap-all").path_arg(device))?;
        ctx.run(STAGE, CommandSpec::new("sgdisk").arg("-o").path_arg(device))?;
        for partition in &layout.partitions {
            ctx.run(STAGE, new_partition(partition).path_arg(device))?;
        }
    }

    ctx.run(STAGE, CommandSpec::new("udevadm").arg("settle"))?;
    for device in ctx.plan.devices() {
        ctx.run(STAGE, CommandSpec::new("partprobe").path_arg(device))?;
    }

    let expected: Vec<_> = ctx
        .plan
        .boot_partitions()
        .into_iter()
        .chain(ctx.plan.payload_partitions())
        .collect();
    ctx.settle(STAGE, "partition nodes", || {
        expected.iter().all(|node| ctx.host.path_exists(node))
    })?;

    tracing::info!(partitions = expected.len(), "partition nodes present");
    Ok(())
}

fn new_partition(partition: &PartitionSpec) -> CommandSpec {
    CommandSpec::new("sgdisk")
        .arg("-n")
        .arg(partition.sgdisk_new())
        .arg("-t")
        .arg(partition.sgdisk_type())
        .arg("-c")
        .arg(partition.sgdisk_name())
}

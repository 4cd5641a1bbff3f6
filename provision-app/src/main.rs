// SPDX-License-Identifier: GPL-3.0-only

use std::process::ExitCode;

use clap::Parser;
use provision::{
    Cli, Collaborators, Debootstrap, InstallConfig, InterruptSignal, Outcome, RunControl, execute,
    logging, usage_exit_code,
};
use provision_sys::{LinuxHost, TerminalOperator};
use tokio::signal::unix::{SignalKind, signal};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let code = usage_exit_code(&error);
            if let Err(io) = error.print() {
                eprintln!("provision: {io}");
            }
            return ExitCode::from(code);
        }
    };

    let _log_guard = match logging::init(cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(error) => {
            eprintln!("provision: {error:#}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("provision v{}", env!("CARGO_PKG_VERSION"));

    let config = match InstallConfig::resolve(&cli) {
        Ok(config) => config,
        Err(error) => {
            tracing::error!("{error}");
            return ExitCode::from(error.exit_code());
        }
    };

    let mode = cli.mode();
    let control = RunControl::new();

    let listener = control.clone();
    tokio::spawn(async move {
        if let Err(error) = forward_signals(listener).await {
            tracing::warn!("signal handling unavailable: {error}");
        }
    });

    let worker = control.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let host = LinuxHost::new();
        let operator = TerminalOperator;
        let bootstrapper = Debootstrap::new(&host);
        execute(
            mode,
            &config,
            Collaborators {
                host: &host,
                operator: &operator,
                bootstrapper: &bootstrapper,
            },
            &worker,
        )
    })
    .await;

    match joined {
        Ok(Ok(Outcome::Plan(json))) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Ok(Ok(Outcome::CleanedUp(report))) if !report.is_clean() => {
            tracing::error!("cleanup left storage state behind");
            ExitCode::FAILURE
        }
        Ok(Ok(_)) => ExitCode::SUCCESS,
        Ok(Err(error)) => {
            tracing::error!("{error}");
            ExitCode::from(error.exit_code())
        }
        Err(error) => {
            tracing::error!("provisioning worker failed: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Before arming a signal ends the process; afterwards it only asks the
/// pipeline to stop so the unwind path can run.
async fn forward_signals(control: RunControl) -> std::io::Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    loop {
        let received = tokio::select! {
            _ = interrupt.recv() => InterruptSignal::Interrupt,
            _ = terminate.recv() => InterruptSignal::Terminate,
        };

        if control.is_armed() {
            tracing::warn!("{received} received, stopping after the current step");
            control.request_stop(received);
        } else {
            tracing::warn!("{received} received before any device was touched, exiting");
            std::process::exit(i32::from(received.exit_code()));
        }
    }
}

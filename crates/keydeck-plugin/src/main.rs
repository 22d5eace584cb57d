//! # keydeck-plugin
//!
//! Sample plugin binary. The host launches it with its connection
//! parameters; it registers, serves the bundled actions until the host goes
//! away or ctrl-c arrives, then drains and exits.

#![deny(unsafe_code)]

mod actions;
mod cli;

use anyhow::{Context, Result, bail};
use keydeck_runtime::PluginRuntime;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse_host_args(std::env::args()).unwrap_or_else(|e| e.exit());

    let settings = keydeck_settings::load_settings(args.settings.as_deref())
        .context("Failed to load settings")?;
    keydeck_core::logging::init_subscriber(&settings.logging.level);

    let params = args
        .registration()
        .context("Invalid registration parameters")?;
    let info = params.info();
    tracing::info!(
        port = params.port,
        plugin_uuid = %params.plugin_uuid,
        host_version = %info.application.version,
        platform = %info.application.platform,
        devices = info.devices.len(),
        "keydeck plugin starting"
    );

    let mut runtime = PluginRuntime::new(params, settings);
    actions::register(&mut runtime).context("Failed to register actions")?;

    let shutdown = runtime.shutdown_token();
    drop(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received");
            shutdown.cancel();
        }
    }));

    let report = runtime.run().await.context("Failed to connect to host")?;
    if report.reason.is_fault() {
        bail!("session ended: {}", report.reason);
    }
    Ok(())
}

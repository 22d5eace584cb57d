//! Command-line parsing.
//!
//! The host launches plugins with single-dash long flags
//! (`-port 28196 -pluginUUID … -registerEvent registerPlugin -info {…}`).
//! [`normalize_args`] rewrites exactly those flags to `--flag` so `clap` can
//! parse them; everything else passes through untouched.

use std::path::PathBuf;

use clap::Parser;
use keydeck_core::{RegistrationError, RegistrationParameters};

/// Flags the host passes with a single dash.
const HOST_FLAGS: [&str; 4] = ["port", "pluginUUID", "registerEvent", "info"];

/// keydeck sample plugin.
#[derive(Parser, Debug)]
#[command(name = "keydeck-plugin", about = "keydeck sample plugin")]
pub struct Cli {
    /// WebSocket port of the host.
    #[arg(long)]
    pub port: u16,

    /// UUID the plugin registers under.
    #[arg(long = "pluginUUID")]
    pub plugin_uuid: String,

    /// Name of the registration event.
    #[arg(long = "registerEvent")]
    pub register_event: String,

    /// JSON description of the host and attached devices.
    #[arg(long, default_value = "")]
    pub info: String,

    /// Optional runtime settings file (JSON).
    #[arg(long)]
    pub settings: Option<PathBuf>,
}

impl Cli {
    /// Parse from raw process arguments, accepting host-style flags.
    pub fn parse_host_args<I>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = String>,
    {
        Self::try_parse_from(normalize_args(args))
    }

    /// Validated registration parameters.
    pub fn registration(&self) -> Result<RegistrationParameters, RegistrationError> {
        RegistrationParameters::from_raw_info(
            self.port,
            self.plugin_uuid.as_str(),
            self.register_event.as_str(),
            &self.info,
        )
    }
}

/// Rewrite `-port`, `-pluginUUID`, `-registerEvent` and `-info` to their
/// double-dash form.
pub fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .map(|arg| match arg.strip_prefix('-') {
            Some(name) if HOST_FLAGS.contains(&name) => format!("--{name}"),
            _ => arg,
        })
        .collect()
}

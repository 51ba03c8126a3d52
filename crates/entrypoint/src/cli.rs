//! CLI argument definitions using clap derive macros.
//!
//! The scheduler starts each container as `entrypoint <role>`. Anything that
//! is not a known role is treated as a command to execute directly, so the
//! image stays usable for debugging (`entrypoint bash`, `entrypoint ls /data`).

use clap::Parser;

/// Container entrypoint for cluster roles
///
/// Runs one-time initialization and readiness waits for the given role, then
/// launches its daemon in the foreground and forwards termination signals.
#[derive(Parser, Debug)]
#[command(name = "entrypoint")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Role to boot (e.g. storage-master), or an arbitrary command to run directly
    pub role: String,

    /// Arguments for the direct command (unknown-role fallback only)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Print the resolved boot recipe as JSON and exit (place before the role)
    #[arg(long)]
    pub explain: bool,
}

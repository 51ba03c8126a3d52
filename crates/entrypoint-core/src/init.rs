//! Guarded one-time initialization actions.
//!
//! Container restarts re-run the whole boot sequence, so every action here
//! follows the same template: check a marker, skip when it is already set,
//! otherwise perform the action. The storage format is the one destructive
//! action in the system and must never run against data that already exists.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::InitError;
use crate::retry::{retry, RetryPolicy};
use crate::role::CommandSpec;

/// Name of the sentinel directory a successful format creates under the
/// storage data path.
pub const FORMAT_SENTINEL: &str = "current";

/// Outcome of [`format_storage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatOutcome {
    Formatted,
    AlreadyFormatted,
}

/// Outcome of [`migrate_schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateOutcome {
    Migrated,
    AlreadyMigrated,
}

/// Returns true when the storage data directory was already formatted.
pub fn is_formatted(data_dir: &Path) -> bool {
    data_dir.join(FORMAT_SENTINEL).is_dir()
}

/// Formats the storage data directory unless the sentinel shows it was
/// already done.
///
/// The sentinel must appear as an effect of a successful format; a tool
/// that reports success without creating it would re-format on the next
/// restart, so that case is loudly logged.
pub async fn format_storage(
    data_dir: &Path,
    format_tool: &CommandSpec,
) -> Result<FormatOutcome, InitError> {
    if is_formatted(data_dir) {
        info!(data_dir = %data_dir.display(), "storage already formatted, skipping");
        return Ok(FormatOutcome::AlreadyFormatted);
    }

    info!(tool = %format_tool.render(), "formatting storage directory");
    let status = format_tool
        .command()
        .status()
        .await
        .map_err(|e| tool_failed(format_tool, e))?;

    if !status.success() {
        return Err(InitError::FormatFailed(format!(
            "{} exited with {status}",
            format_tool.render()
        )));
    }

    if !is_formatted(data_dir) {
        warn!(
            data_dir = %data_dir.display(),
            sentinel = FORMAT_SENTINEL,
            "format tool succeeded but did not create the sentinel directory"
        );
    }

    Ok(FormatOutcome::Formatted)
}

/// Runs the schema migration unless introspection shows the schema is
/// already in place.
///
/// The introspection probe is the idempotence marker: exit 0 means a prior
/// migration completed and the migration tool is never invoked. Otherwise
/// the migration runs under `policy`, backing off between attempts.
pub async fn migrate_schema(
    probe_tool: &CommandSpec,
    migrate_tool: &CommandSpec,
    policy: &RetryPolicy,
) -> Result<MigrateOutcome, InitError> {
    let probe = probe_tool
        .command()
        .output()
        .await
        .map_err(|e| tool_failed(probe_tool, e))?;

    if probe.status.success() {
        info!("schema already present, skipping migration");
        return Ok(MigrateOutcome::AlreadyMigrated);
    }
    debug!(
        tool = %probe_tool.render(),
        status = %probe.status,
        "schema introspection failed, migration required"
    );

    info!(tool = %migrate_tool.render(), "running schema migration");
    let result = retry(policy, "schema-migration", |_attempt| async move {
        let status = migrate_tool
            .command()
            .status()
            .await
            .map_err(|e| e.to_string())?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("{} exited with {status}", migrate_tool.render()))
        }
    })
    .await;

    match result {
        Ok(()) => Ok(MigrateOutcome::Migrated),
        Err(last) => Err(InitError::MigrationFailed {
            attempts: policy.max_attempts.max(1),
            last,
        }),
    }
}

/// Creates the shared directories every role writes into.
///
/// Idempotent by construction; individual failures (read-only mounts,
/// already-correct permissions) are logged and tolerated.
pub fn ensure_shared_dirs(dirs: &[PathBuf]) {
    for dir in dirs {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!(dir = %dir.display(), error = %e, "could not create shared directory");
            continue;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o1777);
            if let Err(e) = std::fs::set_permissions(dir, perms) {
                warn!(dir = %dir.display(), error = %e, "could not open up shared directory permissions");
            }
        }

        debug!(dir = %dir.display(), "shared directory ready");
    }
}

fn tool_failed(tool: &CommandSpec, source: std::io::Error) -> InitError {
    InitError::ToolFailed {
        tool: tool.render(),
        source,
    }
}

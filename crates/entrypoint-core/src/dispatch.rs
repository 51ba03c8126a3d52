//! Role dispatch: runs a role's boot recipe end to end.
//!
//! A known role runs its recipe (guarded initialization, readiness waits)
//! and then hands the daemon to the supervisor. An unknown role argument
//! falls through to direct execution of the supplied command under the same
//! supervisor, with no initialization and no waits.

use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{BootError, BootResult};
use crate::role::{CommandSpec, InitAction, Recipe, Role, Step};
use crate::{init, probe, role, signals, supervisor::Supervisor};

/// Boots `role`: runs its recipe, then supervises its daemon until exit.
///
/// Returns the exit code the entrypoint process should exit with. A
/// termination signal during the init/wait phases exits with `128 + signo`
/// without launching the daemon.
pub async fn run_role(rl: Role, config: &Config) -> BootResult<i32> {
    let recipe = Recipe::for_role(rl, config);

    tokio::select! {
        res = run_steps(&recipe, config) => res?,
        signo = signals::wait_for_termination() => {
            let signo = signo?;
            info!(role = %rl, signo, "termination signal during boot, exiting");
            return Ok(128 + signo);
        }
    }

    if !recipe.daemon.program.exists() {
        return Err(BootError::DaemonNotFound(recipe.daemon.program.clone()));
    }

    let supervisor = Supervisor::spawn(&recipe.daemon, config.stop_grace())?;
    supervisor.supervise().await
}

/// Fallback execution: run `argv` directly and mirror its exit code.
pub async fn run_fallback(argv: &[String], config: &Config) -> BootResult<i32> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| BootError::Other("no command supplied".to_string()))?;

    let resolved = resolve_program(program)?;
    let mut spec = CommandSpec::new(resolved);
    for arg in args {
        spec = spec.arg(arg);
    }

    let supervisor = Supervisor::spawn(&spec, config.stop_grace())?;
    supervisor.supervise().await
}

async fn run_steps(recipe: &Recipe, config: &Config) -> BootResult<()> {
    for step in &recipe.steps {
        match step {
            Step::Initialize { action } => run_init(*action, config).await?,
            Step::WaitFor { dependency } => {
                probe::wait_for_port(dependency, &config.probe_policy(), config.connect_timeout())
                    .await?
            }
        }
    }
    Ok(())
}

async fn run_init(action: InitAction, config: &Config) -> BootResult<()> {
    match action {
        InitAction::FormatStorage => {
            let tool = role::format_tool(config);
            let outcome = init::format_storage(&config.storage.data_dir, &tool).await?;
            info!(?outcome, "storage format step done");
        }
        InitAction::MigrateSchema => {
            let probe_tool = role::schema_probe_tool(config);
            let migrate_tool = role::schema_migrate_tool(config);
            let outcome =
                init::migrate_schema(&probe_tool, &migrate_tool, &config.migration_policy())
                    .await?;
            info!(?outcome, "schema migration step done");
        }
        InitAction::EnsureSharedDirs => {
            init::ensure_shared_dirs(&config.shared_dirs());
        }
    }
    Ok(())
}

/// Resolves the fallback command: bare names via PATH, paths by existence.
fn resolve_program(program: &str) -> BootResult<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        if !path.exists() {
            return Err(BootError::DaemonNotFound(path));
        }
        return Ok(path);
    }

    which::which(program).map_err(|e| {
        warn!(program, error = %e, "fallback command not found on PATH");
        BootError::CommandNotFound(program.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_fallback_mirrors_exit_code() {
        let config = Config::default();
        let argv = vec!["sh".to_string(), "-c".to_string(), "exit 5".to_string()];

        let code = run_fallback(&argv, &config).await.expect("fallback");
        assert_eq!(code, 5);
    }

    #[tokio::test]
    async fn test_fallback_clean_exit() {
        let config = Config::default();
        let argv = vec!["true".to_string()];

        let code = run_fallback(&argv, &config).await.expect("fallback");
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_fallback_unknown_command() {
        let config = Config::default();
        let argv = vec!["definitely-not-a-real-command-xyz".to_string()];

        let result = run_fallback(&argv, &config).await;
        assert!(matches!(result, Err(BootError::CommandNotFound(_))));
    }

    #[tokio::test]
    async fn test_fallback_empty_argv() {
        let config = Config::default();
        let result = run_fallback(&[], &config).await;
        assert!(matches!(result, Err(BootError::Other(_))));
    }

    #[tokio::test]
    async fn test_missing_daemon_binary_is_a_boot_failure() {
        let mut config = Config::default();
        config.resource.home = PathBuf::from("/definitely/not/installed");

        let result = run_role(Role::ResourceMaster, &config).await;
        assert!(matches!(result, Err(BootError::DaemonNotFound(_))));
    }

    /// Full storage-master boot against a scripted daemon: format runs once,
    /// the daemon's exit code is mirrored, and a restart does not re-format.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_storage_master_end_to_end() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().expect("tempdir");
        let home = dir.path().join("storage");
        let data_dir = dir.path().join("data");
        let log = dir.path().join("format.log");
        std::fs::create_dir_all(home.join("bin")).expect("mkdir");
        std::fs::create_dir_all(&data_dir).expect("mkdir");

        // Fake storaged: `format` records the call and creates the sentinel,
        // any other subcommand exits 7. Argv: --config <dir> <subcommand> ...
        let script = format!(
            "#!/bin/sh\nif [ \"$3\" = format ]; then\n  echo run >> {}\n  mkdir -p \"$5/current\"\n  exit 0\nfi\nexit 7\n",
            log.display()
        );
        let daemon = home.join("bin/storaged");
        std::fs::write(&daemon, script).expect("write script");
        std::fs::set_permissions(&daemon, std::fs::Permissions::from_mode(0o755))
            .expect("chmod");

        let mut config = Config::default();
        config.storage.home = home.clone();
        config.storage.conf_dir = home.join("etc");
        config.storage.data_dir = data_dir.clone();

        let code = run_role(Role::StorageMaster, &config).await.expect("boot");
        assert_eq!(code, 7, "daemon exit code is mirrored");
        assert!(data_dir.join("current").is_dir());

        // Simulated container restart: the format must not run again
        let code = run_role(Role::StorageMaster, &config).await.expect("reboot");
        assert_eq!(code, 7);

        let runs = std::fs::read_to_string(&log).expect("read log");
        assert_eq!(runs.lines().count(), 1, "format ran exactly once");
    }
}

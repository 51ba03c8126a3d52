//! Cluster roles and their boot recipes.
//!
//! The role table replaces per-role startup scripts: every role maps to an
//! ordered list of typed steps followed by exactly one daemon launch. The
//! match in [`Recipe::for_role`] is exhaustive, so a role without a recipe
//! does not compile.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tokio::process::Command;

use crate::config::Config;
use crate::probe::Dependency;

/// A cluster role this container can boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    StorageMaster,
    StorageWorker,
    ResourceMaster,
    ResourceWorker,
    MetadataService,
    QueryServer,
    ComputeMaster,
    ComputeWorker,
    ComputeHistory,
}

impl Role {
    pub const ALL: [Role; 9] = [
        Role::StorageMaster,
        Role::StorageWorker,
        Role::ResourceMaster,
        Role::ResourceWorker,
        Role::MetadataService,
        Role::QueryServer,
        Role::ComputeMaster,
        Role::ComputeWorker,
        Role::ComputeHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::StorageMaster => "storage-master",
            Role::StorageWorker => "storage-worker",
            Role::ResourceMaster => "resource-master",
            Role::ResourceWorker => "resource-worker",
            Role::MetadataService => "metadata-service",
            Role::QueryServer => "query-server",
            Role::ComputeMaster => "compute-master",
            Role::ComputeWorker => "compute-worker",
            Role::ComputeHistory => "compute-history",
        }
    }

    /// Parses a role identifier. `None` selects the fallback execution path.
    pub fn parse(s: &str) -> Option<Role> {
        Role::ALL.iter().copied().find(|role| role.as_str() == s)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A guarded one-time initialization action (see the `init` module).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitAction {
    FormatStorage,
    MigrateSchema,
    EnsureSharedDirs,
}

/// One step of a role's boot recipe, executed in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Run a guarded one-time initialization action.
    Initialize { action: InitAction },
    /// Block until an upstream dependency accepts connections.
    WaitFor { dependency: Dependency },
}

/// An external program invocation: the role's daemon, or an init tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Builds a fresh `Command`; callers may invoke this once per attempt.
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }

    /// One-line rendering for logs.
    pub fn render(&self) -> String {
        let mut out = self.program.display().to_string();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

/// Ordered boot recipe for one role: steps first, then the daemon.
#[derive(Debug, Clone, Serialize)]
pub struct Recipe {
    pub role: Role,
    pub steps: Vec<Step>,
    pub daemon: CommandSpec,
}

impl Recipe {
    /// Resolves the boot recipe for `role` against the loaded configuration.
    pub fn for_role(role: Role, config: &Config) -> Recipe {
        let steps = match role {
            Role::StorageMaster => vec![initialize(InitAction::FormatStorage)],
            Role::StorageWorker => vec![wait_for(storage_master(config))],
            Role::ResourceMaster => vec![],
            Role::ResourceWorker => vec![
                wait_for(resource_master(config)),
                wait_for(storage_master(config)),
            ],
            // The relational store must be reachable before the migration runs
            Role::MetadataService => vec![
                wait_for(metadata_db(config)),
                initialize(InitAction::MigrateSchema),
            ],
            Role::QueryServer => vec![
                initialize(InitAction::EnsureSharedDirs),
                wait_for(storage_master(config)),
                wait_for(metadata_service(config)),
            ],
            Role::ComputeMaster => vec![initialize(InitAction::EnsureSharedDirs)],
            Role::ComputeWorker => vec![
                initialize(InitAction::EnsureSharedDirs),
                wait_for(compute_master(config)),
            ],
            Role::ComputeHistory => vec![initialize(InitAction::EnsureSharedDirs)],
        };

        Recipe {
            role,
            steps,
            daemon: daemon_for(role, config),
        }
    }
}

fn initialize(action: InitAction) -> Step {
    Step::Initialize { action }
}

fn wait_for(dependency: Dependency) -> Step {
    Step::WaitFor { dependency }
}

fn storage_master(config: &Config) -> Dependency {
    Dependency::new(
        "storage-master",
        &config.storage.master_host,
        config.storage.master_port,
    )
}

fn resource_master(config: &Config) -> Dependency {
    Dependency::new(
        "resource-master",
        &config.resource.master_host,
        config.resource.master_port,
    )
}

fn metadata_db(config: &Config) -> Dependency {
    Dependency::new(
        "metadata-db",
        &config.metadata.db_host,
        config.metadata.db_port,
    )
}

fn metadata_service(config: &Config) -> Dependency {
    Dependency::new(
        "metadata-service",
        &config.metadata.service_host,
        config.metadata.service_port,
    )
}

fn compute_master(config: &Config) -> Dependency {
    Dependency::new(
        "compute-master",
        &config.compute.master_host,
        config.compute.master_port,
    )
}

fn daemon_for(role: Role, config: &Config) -> CommandSpec {
    match role {
        Role::StorageMaster => storaged(config)
            .arg("master")
            .arg("--data-dir")
            .arg(config.storage.data_dir.display().to_string()),
        Role::StorageWorker => storaged(config).arg("worker").arg("--master").arg(format!(
            "{}:{}",
            config.storage.master_host, config.storage.master_port
        )),
        Role::ResourceMaster => resourced(config).arg("master"),
        Role::ResourceWorker => resourced(config).arg("worker").arg("--master").arg(format!(
            "{}:{}",
            config.resource.master_host, config.resource.master_port
        )),
        Role::MetadataService => CommandSpec::new(config.metadata.home.join("bin/metastored"))
            .arg("--config")
            .arg(config.metadata.conf_dir.display().to_string()),
        Role::QueryServer => CommandSpec::new(config.query.home.join("bin/queryd"))
            .arg("--config")
            .arg(config.query.conf_dir.display().to_string()),
        Role::ComputeMaster => computed(config).arg("master"),
        Role::ComputeWorker => computed(config).arg("worker").arg("--master").arg(format!(
            "{}:{}",
            config.compute.master_host, config.compute.master_port
        )),
        Role::ComputeHistory => computed(config)
            .arg("history")
            .arg("--events-dir")
            .arg(config.compute.events_dir.display().to_string()),
    }
}

fn storaged(config: &Config) -> CommandSpec {
    CommandSpec::new(config.storage.home.join("bin/storaged"))
        .arg("--config")
        .arg(config.storage.conf_dir.display().to_string())
}

fn resourced(config: &Config) -> CommandSpec {
    CommandSpec::new(config.resource.home.join("bin/resourced"))
        .arg("--config")
        .arg(config.resource.conf_dir.display().to_string())
}

fn computed(config: &Config) -> CommandSpec {
    CommandSpec::new(config.compute.home.join("bin/computed"))
        .arg("--config")
        .arg(config.compute.conf_dir.display().to_string())
}

/// The storage format tool (destructive, guarded by the sentinel check).
pub fn format_tool(config: &Config) -> CommandSpec {
    storaged(config)
        .arg("format")
        .arg("--data-dir")
        .arg(config.storage.data_dir.display().to_string())
}

fn schema_tool(config: &Config, action: &str) -> CommandSpec {
    CommandSpec::new(config.metadata.home.join("bin/schema-tool"))
        .arg("--config")
        .arg(config.metadata.conf_dir.display().to_string())
        .arg(action)
}

/// Schema introspection: exit 0 means the schema is already in place.
pub fn schema_probe_tool(config: &Config) -> CommandSpec {
    schema_tool(config, "info")
}

/// One-shot schema migration.
pub fn schema_migrate_tool(config: &Config) -> CommandSpec {
    schema_tool(config, "init")
}

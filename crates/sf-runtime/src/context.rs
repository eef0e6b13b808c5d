//! Interfaces of the external collaborators a running workflow talks to,
//! and the context object that carries them.
//!
//! The runtime never owns a scheduler, deployment manager, failure manager
//! or database; it consumes them through the traits below. Embedders pass
//! concrete implementations in a [`RunContext`] — there is no process-wide
//! singleton.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use sf_core::{CommandOutput, Job, Status, Tag, TokenMap};

// ---------------------------------------------------------------------------
// Deployment model
// ---------------------------------------------------------------------------

/// A named deployment plus the working directory jobs are placed under.
#[derive(Debug, Clone)]
pub struct Target {
    pub deployment: String,
    /// Optional service within the deployment.
    pub service: Option<String>,
    pub workdir: String,
}

/// Configuration handed to the deployment manager.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    pub name: String,
    pub kind: String,
    pub config: Value,
}

/// Path flavour exposed by a connector's path processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathFlavor {
    Posix,
    Platform,
}

impl PathFlavor {
    /// Join `base` and `segment` in this flavour.
    pub fn join(&self, base: &str, segment: &str) -> String {
        match self {
            PathFlavor::Posix => {
                if base.ends_with('/') {
                    format!("{base}{segment}")
                } else {
                    format!("{base}/{segment}")
                }
            }
            PathFlavor::Platform => {
                let mut path = std::path::PathBuf::from(base);
                path.push(segment);
                path.to_string_lossy().into_owned()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Hardware model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hardware {
    pub cores: f64,
    pub memory_mib: u64,
    pub disk_gib: u64,
}

/// Evaluates the hardware a job needs from its tag-complete input tuple.
pub trait HardwareRequirement: Send + Sync {
    fn eval(&self, inputs: &TokenMap) -> Hardware;
}

/// An execution location a connector can place jobs onto.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: String,
    pub hostname: String,
    pub slots: usize,
    pub hardware: Hardware,
}

// ---------------------------------------------------------------------------
// Collaborator interfaces
// ---------------------------------------------------------------------------

/// Owns the global assignment of jobs to locations.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn schedule(
        &self,
        job: &Job,
        target: &Target,
        hardware_requirement: Option<&Hardware>,
    ) -> anyhow::Result<()>;

    fn get_locations(&self, job_name: &str) -> Vec<String>;

    async fn notify_status(&self, name: &str, status: Status) -> anyhow::Result<()>;
}

/// Brings deployments up and resolves their connectors.
#[async_trait]
pub trait DeploymentManager: Send + Sync {
    /// Deploy the target; idempotent per `config.name`.
    async fn deploy(&self, config: &DeploymentConfig) -> anyhow::Result<()>;

    fn get_connector(&self, deployment: &str) -> Option<Arc<dyn Connector>>;
}

/// Recovery policy consulted when a job fails.
#[async_trait]
pub trait FailureManager: Send + Sync {
    /// Attempt recovery from a non-exception command failure. An error means
    /// recovery was declined and the step fails.
    async fn handle_failure(
        &self,
        job: &Job,
        step: &str,
        command_output: CommandOutput,
    ) -> anyhow::Result<CommandOutput>;

    /// Attempt recovery from a thrown error. May fail again, in which case
    /// the step fails.
    async fn handle_exception(
        &self,
        job: &Job,
        step: &str,
        error: anyhow::Error,
    ) -> anyhow::Result<CommandOutput>;
}

/// A remote-execution backend: location enumeration and file plumbing.
#[async_trait]
pub trait Connector: Send + Sync {
    fn path_flavor(&self) -> PathFlavor;

    async fn get_available_locations(
        &self,
        service: Option<&str>,
    ) -> anyhow::Result<BTreeMap<String, Location>>;

    /// Create every path on every location.
    async fn mkdirs(&self, locations: &[String], paths: &[String]) -> anyhow::Result<()>;

    async fn copy_remote_to_remote(
        &self,
        src: &str,
        dst: &str,
        locations: &[String],
        source_location: &str,
        read_only: bool,
    ) -> anyhow::Result<()>;

    async fn deploy(&self, external: bool) -> anyhow::Result<()>;

    async fn undeploy(&self, external: bool) -> anyhow::Result<()>;
}

/// The command an execute step runs on its scheduled jobs.
#[async_trait]
pub trait Command: Send + Sync {
    async fn execute(&self, job: &Job) -> anyhow::Result<CommandOutput>;
}

/// Append-only provenance and token store.
///
/// Writes are independent per token; implementations may serialize them
/// internally, but they must not block the dataflow beyond their own I/O.
#[async_trait]
pub trait Database: Send + Sync {
    /// Record a token and return its persistent identifier.
    async fn add_token(
        &self,
        port_id: i64,
        tag: &Tag,
        kind: &str,
        value: Value,
    ) -> anyhow::Result<i64>;

    /// Record provenance edges from each input token to `token`.
    async fn add_provenance(&self, inputs: &[i64], token: i64) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// Collaborator handles shared by every step of a running workflow.
#[derive(Clone)]
pub struct RunContext {
    pub scheduler: Arc<dyn Scheduler>,
    pub deployment_manager: Arc<dyn DeploymentManager>,
    pub failure_manager: Arc<dyn FailureManager>,
    pub database: Arc<dyn Database>,
}

impl RunContext {
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        deployment_manager: Arc<dyn DeploymentManager>,
        failure_manager: Arc<dyn FailureManager>,
        database: Arc<dyn Database>,
    ) -> Self {
        Self {
            scheduler,
            deployment_manager,
            failure_manager,
            database,
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryDatabase — default in-memory provenance store
// ---------------------------------------------------------------------------

/// A persisted token row.
#[derive(Debug, Clone)]
pub struct TokenRow {
    pub id: i64,
    pub port_id: i64,
    pub tag: Tag,
    pub kind: String,
    pub value: Value,
}

/// In-memory append-only token and provenance store.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<MemoryDbState>,
}

#[derive(Default)]
struct MemoryDbState {
    tokens: Vec<TokenRow>,
    provenance: Vec<(i64, i64)>,
    next_id: i64,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every persisted token row.
    pub fn tokens(&self) -> Vec<TokenRow> {
        self.state.lock().expect("database lock poisoned").tokens.clone()
    }

    /// Snapshot of every `(input, output)` provenance edge.
    pub fn provenance(&self) -> Vec<(i64, i64)> {
        self.state
            .lock()
            .expect("database lock poisoned")
            .provenance
            .clone()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn add_token(
        &self,
        port_id: i64,
        tag: &Tag,
        kind: &str,
        value: Value,
    ) -> anyhow::Result<i64> {
        let mut state = self.state.lock().expect("database lock poisoned");
        state.next_id += 1;
        let id = state.next_id;
        state.tokens.push(TokenRow {
            id,
            port_id,
            tag: tag.clone(),
            kind: kind.to_string(),
            value,
        });
        Ok(id)
    }

    async fn add_provenance(&self, inputs: &[i64], token: i64) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("database lock poisoned");
        for input in inputs {
            state.provenance.push((*input, token));
        }
        Ok(())
    }
}

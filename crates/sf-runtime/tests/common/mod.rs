#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use sf_core::{CommandOutput, Job, Port, Status, Token};
use sf_runtime::{
    Command, Connector, Database, DeploymentConfig, DeploymentManager, FailureManager, Hardware,
    Location, MemoryDatabase, PathFlavor, RunContext, Scheduler, Target,
};

// ---------------------------------------------------------------------------
// Scheduler stub
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct StubScheduler {
    pub scheduled: Mutex<Vec<String>>,
    pub notifications: Mutex<Vec<(String, Status)>>,
}

#[async_trait]
impl Scheduler for StubScheduler {
    async fn schedule(
        &self,
        job: &Job,
        _target: &Target,
        _hardware_requirement: Option<&Hardware>,
    ) -> anyhow::Result<()> {
        self.scheduled.lock().unwrap().push(job.name.clone());
        Ok(())
    }

    fn get_locations(&self, _job_name: &str) -> Vec<String> {
        vec!["loc0".to_string()]
    }

    async fn notify_status(&self, name: &str, status: Status) -> anyhow::Result<()> {
        self.notifications
            .lock()
            .unwrap()
            .push((name.to_string(), status));
        Ok(())
    }
}

impl StubScheduler {
    pub fn notified(&self, status: Status) -> usize {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| *s == status)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Connector + deployment manager stubs
// ---------------------------------------------------------------------------

/// Records every directory it is asked to create as `"{location}:{path}"`.
#[derive(Default)]
pub struct RecordingConnector {
    pub created: Mutex<Vec<String>>,
}

#[async_trait]
impl Connector for RecordingConnector {
    fn path_flavor(&self) -> PathFlavor {
        PathFlavor::Posix
    }

    async fn get_available_locations(
        &self,
        _service: Option<&str>,
    ) -> anyhow::Result<BTreeMap<String, Location>> {
        let mut locations = BTreeMap::new();
        locations.insert(
            "loc0".to_string(),
            Location {
                name: "loc0".to_string(),
                hostname: "localhost".to_string(),
                slots: 1,
                hardware: Hardware {
                    cores: 1.0,
                    memory_mib: 1024,
                    disk_gib: 8,
                },
            },
        );
        Ok(locations)
    }

    async fn mkdirs(&self, locations: &[String], paths: &[String]) -> anyhow::Result<()> {
        let mut created = self.created.lock().unwrap();
        for location in locations {
            for path in paths {
                created.push(format!("{location}:{path}"));
            }
        }
        Ok(())
    }

    async fn copy_remote_to_remote(
        &self,
        _src: &str,
        _dst: &str,
        _locations: &[String],
        _source_location: &str,
        _read_only: bool,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn deploy(&self, _external: bool) -> anyhow::Result<()> {
        Ok(())
    }

    async fn undeploy(&self, _external: bool) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct StubDeployments {
    pub connector: Arc<RecordingConnector>,
    pub deployed: Mutex<Vec<String>>,
}

impl Default for StubDeployments {
    fn default() -> Self {
        Self {
            connector: Arc::new(RecordingConnector::default()),
            deployed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DeploymentManager for StubDeployments {
    async fn deploy(&self, config: &DeploymentConfig) -> anyhow::Result<()> {
        self.deployed.lock().unwrap().push(config.name.clone());
        Ok(())
    }

    fn get_connector(&self, _deployment: &str) -> Option<Arc<dyn Connector>> {
        Some(Arc::clone(&self.connector) as Arc<dyn Connector>)
    }
}

// ---------------------------------------------------------------------------
// Failure manager stubs
// ---------------------------------------------------------------------------

/// Declines every recovery attempt.
pub struct NoRecovery;

#[async_trait]
impl FailureManager for NoRecovery {
    async fn handle_failure(
        &self,
        job: &Job,
        _step: &str,
        _command_output: CommandOutput,
    ) -> anyhow::Result<CommandOutput> {
        Err(anyhow::anyhow!("no retry policy for job {}", job.name))
    }

    async fn handle_exception(
        &self,
        _job: &Job,
        _step: &str,
        error: anyhow::Error,
    ) -> anyhow::Result<CommandOutput> {
        Err(error)
    }
}

/// Recovers every failure with a fixed output.
pub struct FixedRecovery {
    pub output: CommandOutput,
}

#[async_trait]
impl FailureManager for FixedRecovery {
    async fn handle_failure(
        &self,
        _job: &Job,
        _step: &str,
        _command_output: CommandOutput,
    ) -> anyhow::Result<CommandOutput> {
        Ok(self.output.clone())
    }

    async fn handle_exception(
        &self,
        _job: &Job,
        _step: &str,
        _error: anyhow::Error,
    ) -> anyhow::Result<CommandOutput> {
        Ok(self.output.clone())
    }
}

// ---------------------------------------------------------------------------
// Command stubs
// ---------------------------------------------------------------------------

pub struct FixedCommand {
    pub output: CommandOutput,
}

#[async_trait]
impl Command for FixedCommand {
    async fn execute(&self, _job: &Job) -> anyhow::Result<CommandOutput> {
        Ok(self.output.clone())
    }
}

/// Never completes; jobs stay in flight until cancelled.
pub struct PendingCommand;

#[async_trait]
impl Command for PendingCommand {
    async fn execute(&self, _job: &Job) -> anyhow::Result<CommandOutput> {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

// ---------------------------------------------------------------------------
// Context assembly + helpers
// ---------------------------------------------------------------------------

pub struct TestContext {
    pub scheduler: Arc<StubScheduler>,
    pub deployments: Arc<StubDeployments>,
    pub database: Arc<MemoryDatabase>,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            scheduler: Arc::new(StubScheduler::default()),
            deployments: Arc::new(StubDeployments::default()),
            database: Arc::new(MemoryDatabase::new()),
        }
    }

    pub fn run_context_with(&self, failures: Arc<dyn FailureManager>) -> RunContext {
        RunContext::new(
            Arc::clone(&self.scheduler) as Arc<dyn Scheduler>,
            Arc::clone(&self.deployments) as Arc<dyn DeploymentManager>,
            failures,
            Arc::clone(&self.database) as Arc<dyn Database>,
        )
    }

    pub fn run_context(&self) -> RunContext {
        self.run_context_with(Arc::new(NoRecovery))
    }
}

/// A job descriptor with empty inputs and fixed directories.
pub fn job(name: &str) -> Job {
    Job {
        name: name.to_string(),
        inputs: BTreeMap::new(),
        input_directory: format!("/work/{name}/input"),
        output_directory: format!("/work/{name}/output"),
        tmp_directory: format!("/work/{name}/tmp"),
    }
}

/// Read data tokens from a port until its termination marker.
pub async fn drain(port: &Arc<Port>, reader: &str) -> Vec<Token> {
    let mut out = Vec::new();
    loop {
        let token = port.get(reader).await;
        if token.is_termination() {
            break;
        }
        out.push(token);
    }
    out
}

/// Count termination markers currently buffered on a port.
pub fn termination_count(port: &Arc<Port>) -> usize {
    port.snapshot()
        .iter()
        .filter(|t| t.is_termination())
        .count()
}

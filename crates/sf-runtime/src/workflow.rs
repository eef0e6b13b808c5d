//! The workflow arena: indexed stores for ports and steps.
//!
//! Steps never hold port references; they hold [`PortId`]s and resolve them
//! through the [`StepCtx`] handed to their drive loop. That keeps the
//! `Workflow -> Step -> Port` graph acyclic and lets job sub-tasks carry a
//! cheap clone of everything they need.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use sf_core::{Port, Status};

use crate::context::RunContext;
use crate::driver;
use crate::error::{RuntimeResult, StepError, StepResult};
use crate::steps::Step;

// ---------------------------------------------------------------------------
// PortId + Ports
// ---------------------------------------------------------------------------

/// Identifier of a port inside one workflow's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub(crate) u64);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port#{}", self.0)
    }
}

/// Read-only port store shared by every step task of a run.
pub struct Ports {
    inner: HashMap<PortId, Arc<Port>>,
}

impl Ports {
    pub(crate) fn new(inner: HashMap<PortId, Arc<Port>>) -> Self {
        Self { inner }
    }

    pub fn get(&self, id: PortId) -> StepResult<&Arc<Port>> {
        self.inner
            .get(&id)
            .ok_or_else(|| StepError::Execution(format!("unknown {id}")))
    }

    pub(crate) fn contains(&self, id: PortId) -> bool {
        self.inner.contains_key(&id)
    }
}

// ---------------------------------------------------------------------------
// StepCtx
// ---------------------------------------------------------------------------

/// Everything a step task needs while driving: the port arena, the
/// collaborator context, and its cancellation token.
#[derive(Clone)]
pub struct StepCtx {
    pub ports: Arc<Ports>,
    pub context: Arc<RunContext>,
    pub cancel: CancellationToken,
}

impl StepCtx {
    /// Await `fut` unless this step is cancelled first.
    ///
    /// Every suspension point of a drive loop goes through this guard, which
    /// is what makes cancellation observable promptly and uniformly.
    pub async fn guard<F: Future>(&self, fut: F) -> StepResult<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StepError::Cancelled),
            out = fut => Ok(out),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A workflow under construction: the port arena, the registered steps, and
/// the collaborator context they will run against.
pub struct Workflow {
    name: String,
    context: Arc<RunContext>,
    ports: HashMap<PortId, Arc<Port>>,
    steps: Vec<Box<dyn Step>>,
    next_port_id: u64,
}

impl Workflow {
    pub fn new(name: impl Into<String>, context: RunContext) -> Self {
        Self {
            name: name.into(),
            context: Arc::new(context),
            ports: HashMap::new(),
            steps: Vec::new(),
            next_port_id: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a port and return its arena identifier.
    pub fn create_port(&mut self, name: &str) -> PortId {
        let id = PortId(self.next_port_id);
        self.next_port_id += 1;
        self.ports.insert(id, Arc::new(Port::new(name, id.0 as i64)));
        id
    }

    /// Resolve a port handle, e.g. to seed inputs or inspect outputs.
    pub fn port(&self, id: PortId) -> Option<&Arc<Port>> {
        self.ports.get(&id)
    }

    pub fn add_step(&mut self, step: impl Step + 'static) {
        let mut step = Box::new(step);
        step.core_mut().set_persistent_id(self.steps.len() as i64);
        self.steps.push(step);
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Run every step to joint completion.
    pub async fn run(self) -> RuntimeResult<RunReport> {
        self.run_with_cancel(CancellationToken::new()).await
    }

    /// Run with an externally owned cancellation token. Cancelling it drives
    /// every step to a CANCELLED terminal status.
    pub async fn run_with_cancel(self, cancel: CancellationToken) -> RuntimeResult<RunReport> {
        let Workflow {
            name,
            context,
            ports,
            steps,
            ..
        } = self;
        driver::run(name, context, ports, steps, cancel).await
    }
}

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

/// Terminal statuses of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Per-step terminal status.
    pub steps: BTreeMap<String, Status>,
    /// Fold of all step statuses.
    pub status: Status,
}

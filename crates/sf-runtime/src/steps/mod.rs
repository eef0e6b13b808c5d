//! Step machinery and the twelve step kinds.
//!
//! Every step kind is a concrete driver around a shared [`StepCore`];
//! user-supplied behavior (conditions, transforms, output processors, …) is
//! injected as a capability trait object rather than inherited.

mod combinator;
mod conditional;
mod deploy;
mod execute;
mod gather;
mod inject;
mod loop_output;
mod scatter;
mod schedule;
mod transfer;
mod transformer;

pub use combinator::{CombinatorStep, LoopCombinatorStep};
pub use conditional::{Condition, ConditionalStep};
pub use deploy::DeployStep;
pub use execute::{CommandOutputProcessor, DefaultCommandOutputProcessor, ExecuteStep};
pub use gather::GatherStep;
pub use inject::{InputInjector, InputInjectorStep};
pub use loop_output::{LoopOutput, LoopOutputStep};
pub use scatter::ScatterStep;
pub use schedule::ScheduleStep;
pub use transfer::{Transfer, TransferStep};
pub use transformer::{Transform, Transformer};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task::JoinSet;

use sf_core::{Job, Port, Status, Tag, Token, TokenMap, has_termination};

use crate::context::Connector;
use crate::error::{StepError, StepResult};
use crate::workflow::{PortId, StepCtx};

/// Reserved input port carrying job descriptors.
pub const JOB_PORT: &str = "__job__";
/// Reserved input port carrying connector tokens.
pub const CONNECTOR_PORT: &str = "__connector__";

/// Random identifier for job and directory names.
pub(crate) fn random_name() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Step — the driver interface
// ---------------------------------------------------------------------------

/// A concurrently executing workflow step.
///
/// `drive` runs the step's control loop and returns the terminal status it
/// computed; the driver's envelope turns errors into FAILED/CANCELLED and
/// calls [`StepCore::terminate`] exactly once either way.
#[async_trait]
pub trait Step: Send {
    fn core(&self) -> &StepCore;

    fn core_mut(&mut self) -> &mut StepCore;

    async fn drive(&mut self, ctx: &StepCtx) -> StepResult<Status>;
}

// ---------------------------------------------------------------------------
// StepCore — shared machinery
// ---------------------------------------------------------------------------

/// Name, port registrations and status cell shared by every step kind.
///
/// Cheap to clone: job sub-tasks carry a clone so they can emit tokens and
/// terminate the step from outside the main drive loop.
#[derive(Clone)]
pub struct StepCore {
    name: Arc<str>,
    persistent_id: i64,
    input_ports: BTreeMap<String, PortId>,
    output_ports: BTreeMap<String, PortId>,
    state: Arc<Mutex<StepState>>,
}

struct StepState {
    status: Status,
    terminated: bool,
}

impl StepCore {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            persistent_id: 0,
            input_ports: BTreeMap::new(),
            output_ports: BTreeMap::new(),
            state: Arc::new(Mutex::new(StepState {
                status: Status::Waiting,
                terminated: false,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn persistent_id(&self) -> i64 {
        self.persistent_id
    }

    pub(crate) fn set_persistent_id(&mut self, id: i64) {
        self.persistent_id = id;
    }

    pub fn status(&self) -> Status {
        self.state.lock().expect("step state poisoned").status
    }

    pub fn terminated(&self) -> bool {
        self.state.lock().expect("step state poisoned").terminated
    }

    /// Record a non-terminal status transition; ignored once terminated.
    pub(crate) fn set_status(&self, status: Status) {
        let mut state = self.state.lock().expect("step state poisoned");
        if !state.terminated {
            state.status = status;
        }
    }

    pub fn input_ports(&self) -> &BTreeMap<String, PortId> {
        &self.input_ports
    }

    pub fn output_ports(&self) -> &BTreeMap<String, PortId> {
        &self.output_ports
    }

    pub(crate) fn add_input_port(&mut self, name: &str, port: PortId) {
        self.input_ports.insert(name.to_string(), port);
    }

    pub(crate) fn add_output_port(&mut self, name: &str, port: PortId) {
        self.output_ports.insert(name.to_string(), port);
    }

    /// Input ports minus the given reserved names.
    pub fn data_input_ports(&self, reserved: &[&str]) -> BTreeMap<String, PortId> {
        self.input_ports
            .iter()
            .filter(|(name, _)| !reserved.contains(&name.as_str()))
            .map(|(name, id)| (name.clone(), *id))
            .collect()
    }

    /// The identity under which this step reads a port.
    pub fn reader_id(&self, port_name: &str) -> String {
        format!("{}/{port_name}", self.name)
    }

    pub(crate) fn single_input(&self) -> StepResult<(String, PortId)> {
        if self.input_ports.len() != 1 {
            return Err(StepError::Definition(format!(
                "{} step must contain a single input port",
                self.name
            )));
        }
        let (name, id) = self.input_ports.iter().next().expect("checked length");
        Ok((name.clone(), *id))
    }

    pub(crate) fn single_output(&self) -> StepResult<(String, PortId)> {
        if self.output_ports.len() != 1 {
            return Err(StepError::Definition(format!(
                "{} step must contain a single output port",
                self.name
            )));
        }
        let (name, id) = self.output_ports.iter().next().expect("checked length");
        Ok((name.clone(), *id))
    }

    /// Terminate the step: close inputs (unless cancelled), put exactly one
    /// termination token on every output, record the terminal status.
    ///
    /// Idempotent; the first call wins and its status is returned.
    pub fn terminate(&self, ctx: &StepCtx, status: Status) -> Status {
        {
            let mut state = self.state.lock().expect("step state poisoned");
            if state.terminated {
                return state.status;
            }
            state.status = status;
            state.terminated = true;
        }
        // Cancelled steps leave inputs open: upstream may still be shutting
        // down and closing would mask its diagnostics.
        if status != Status::Cancelled {
            for (port_name, id) in &self.input_ports {
                if let Ok(port) = ctx.ports.get(*id) {
                    port.close(&self.reader_id(port_name));
                }
            }
        }
        for id in self.output_ports.values() {
            if let Ok(port) = ctx.ports.get(*id) {
                port.put(Token::Termination);
            }
        }
        sf_debug!(step, step = %self.name, status = %status, "step terminated");
        status
    }

    /// One blocking read from a named input port.
    pub async fn get_token(&self, ctx: &StepCtx, port_name: &str) -> StepResult<Token> {
        let id = self.input_ports.get(port_name).ok_or_else(|| {
            StepError::Definition(format!("step {} has no input port {port_name}", self.name))
        })?;
        let port = Arc::clone(ctx.ports.get(*id)?);
        ctx.guard(port.get(&self.reader_id(port_name))).await
    }

    /// One concurrent read per given input port, collected by port name.
    pub async fn gather(
        &self,
        ctx: &StepCtx,
        ports: &BTreeMap<String, PortId>,
    ) -> StepResult<TokenMap> {
        let mut reads: JoinSet<(String, Token)> = JoinSet::new();
        for (port_name, id) in ports {
            let port = Arc::clone(ctx.ports.get(*id)?);
            let reader = self.reader_id(port_name);
            let port_name = port_name.clone();
            reads.spawn(async move { (port_name, port.get(&reader).await) });
        }

        let mut inputs = TokenMap::new();
        while let Some(joined) = ctx.guard(reads.join_next()).await? {
            let (port_name, token) =
                joined.map_err(|e| anyhow::anyhow!("input read task failed: {e}"))?;
            inputs.insert(port_name, token);
        }

        if has_termination(inputs.values()) {
            sf_debug!(step, step = %self.name, "received termination token");
        } else {
            sf_trace!(step, step = %self.name, inputs = inputs.len(), "received inputs");
        }
        Ok(inputs)
    }

    /// Persist a token and put it on the named output port.
    pub async fn emit(
        &self,
        ctx: &StepCtx,
        port_name: &str,
        token: Token,
        inputs: &[Token],
    ) -> StepResult<()> {
        let id = self.output_ports.get(port_name).ok_or_else(|| {
            StepError::Definition(format!("step {} has no output port {port_name}", self.name))
        })?;
        let port = ctx.ports.get(*id)?;
        let token = persist_token(ctx, port, token, inputs).await?;
        port.put(token);
        Ok(())
    }

    /// Read the current job descriptor from the reserved `__job__` port.
    /// `None` means the job port has terminated.
    pub async fn get_job(&self, ctx: &StepCtx) -> StepResult<Option<Arc<Job>>> {
        match self.get_token(ctx, JOB_PORT).await? {
            Token::Job(token) => Ok(Some(token.job)),
            Token::Termination => Ok(None),
            other => Err(StepError::Execution(format!(
                "step {} expected a job token on {JOB_PORT}, got {}",
                self.name,
                other.kind()
            ))),
        }
    }

    /// Resolve the connector announced on the reserved `__connector__` port.
    /// `None` means the connector port has terminated.
    pub async fn get_connector(&self, ctx: &StepCtx) -> StepResult<Option<Arc<dyn Connector>>> {
        match self.get_token(ctx, CONNECTOR_PORT).await? {
            Token::Termination => Ok(None),
            Token::Value(token) => {
                let deployment = token.value.as_str().ok_or_else(|| {
                    StepError::Execution(format!(
                        "step {} received a connector token without a deployment name",
                        self.name
                    ))
                })?;
                let connector = ctx
                    .context
                    .deployment_manager
                    .get_connector(deployment)
                    .ok_or_else(|| {
                        StepError::Execution(format!("no connector for deployment {deployment}"))
                    })?;
                Ok(Some(connector))
            }
            other => Err(StepError::Execution(format!(
                "step {} expected a connector token on {CONNECTOR_PORT}, got {}",
                self.name,
                other.kind()
            ))),
        }
    }

    /// SKIPPED if the single output port never saw data, COMPLETED otherwise.
    pub(crate) fn completion_status(&self, ctx: &StepCtx) -> StepResult<Status> {
        let (_, id) = self.single_output()?;
        Ok(if ctx.ports.get(id)?.empty() {
            Status::Skipped
        } else {
            Status::Completed
        })
    }

    pub(crate) fn any_output_empty(&self, ctx: &StepCtx) -> StepResult<bool> {
        for id in self.output_ports.values() {
            if ctx.ports.get(*id)?.empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Write a token through to the provenance store, assigning its persistent
/// identifier and recording one edge per causal input.
pub(crate) async fn persist_token(
    ctx: &StepCtx,
    port: &Arc<Port>,
    mut token: Token,
    inputs: &[Token],
) -> StepResult<Token> {
    let tag = token.tag().cloned().unwrap_or_else(Tag::root);
    let id = ctx
        .guard(ctx.context.database.add_token(
            port.persistent_id(),
            &tag,
            token.kind(),
            token.save(),
        ))
        .await??;
    token.set_persistent_id(id);

    let input_ids: Vec<i64> = inputs.iter().filter_map(Token::persistent_id).collect();
    if !input_ids.is_empty() {
        ctx.guard(ctx.context.database.add_provenance(&input_ids, id))
            .await??;
    }
    Ok(token)
}

// ---------------------------------------------------------------------------
// Tag grouping
// ---------------------------------------------------------------------------

/// Incremental `tag -> {port_name -> token}` grouping, in arrival order.
#[derive(Default)]
pub(crate) struct TagGroups {
    groups: Vec<(Tag, TokenMap)>,
}

impl TagGroups {
    /// Merge one gathered batch into the groups.
    pub fn merge(&mut self, inputs: TokenMap) {
        for (name, token) in inputs {
            let Some(tag) = token.tag().cloned() else {
                continue;
            };
            match self.groups.iter_mut().find(|(t, _)| *t == tag) {
                Some((_, map)) => {
                    map.insert(name, token);
                }
                None => {
                    let mut map = TokenMap::new();
                    map.insert(name, token);
                    self.groups.push((tag, map));
                }
            }
        }
    }

    /// Remove and return every tuple that has one token per required port,
    /// in completion order.
    pub fn take_complete(&mut self, required: usize) -> Vec<(Tag, TokenMap)> {
        let mut complete = Vec::new();
        let mut i = 0;
        while i < self.groups.len() {
            if self.groups[i].1.len() == required {
                complete.push(self.groups.remove(i));
            } else {
                i += 1;
            }
        }
        complete
    }
}

// ---------------------------------------------------------------------------
// StepOutputs — emission surface for policy hooks
// ---------------------------------------------------------------------------

/// The output surface handed to user policy hooks (e.g. a conditional's
/// branches): persist-and-emit on the owning step's ports.
pub struct StepOutputs<'a> {
    core: &'a StepCore,
    ctx: &'a StepCtx,
}

impl<'a> StepOutputs<'a> {
    pub(crate) fn new(core: &'a StepCore, ctx: &'a StepCtx) -> Self {
        Self { core, ctx }
    }

    pub fn port_names(&self) -> impl Iterator<Item = &str> {
        self.core.output_ports().keys().map(String::as_str)
    }

    pub async fn emit(&self, port_name: &str, token: Token, inputs: &[Token]) -> StepResult<()> {
        self.core.emit(self.ctx, port_name, token, inputs).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

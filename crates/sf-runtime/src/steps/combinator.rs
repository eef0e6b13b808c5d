use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;

use sf_core::combinator::Combinator;
use sf_core::{Status, Tag, Token, TokenMap};

use crate::error::{StepError, StepResult};
use crate::workflow::{PortId, StepCtx};

use super::{Step, StepCore};

// ---------------------------------------------------------------------------
// Shared first-completed read loop plumbing
// ---------------------------------------------------------------------------

fn arm(
    core: &StepCore,
    ctx: &StepCtx,
    reads: &mut JoinSet<(String, Token)>,
    port_name: &str,
) -> StepResult<()> {
    let id = *core.input_ports().get(port_name).ok_or_else(|| {
        StepError::Definition(format!(
            "step {} has no input port {port_name}",
            core.name()
        ))
    })?;
    let port = Arc::clone(ctx.ports.get(id)?);
    let reader = core.reader_id(port_name);
    let port_name = port_name.to_string();
    reads.spawn(async move { (port_name, port.get(&reader).await) });
    Ok(())
}

async fn emit_schemas(core: &StepCore, ctx: &StepCtx, schemas: Vec<TokenMap>) -> StepResult<()> {
    for schema in schemas {
        let inputs: Vec<Token> = schema.values().cloned().collect();
        for (port_name, token) in schema {
            core.emit(ctx, &port_name, token, &inputs).await?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CombinatorStep
// ---------------------------------------------------------------------------

/// Drives a combinator tree with a first-completed wait over one read task
/// per input port.
///
/// A port's read is re-armed after every token until its termination token
/// arrives. The step is SKIPPED unless at least one data token was combined.
pub struct CombinatorStep {
    core: StepCore,
    combinator: Box<dyn Combinator>,
}

impl CombinatorStep {
    pub fn new(name: &str, combinator: Box<dyn Combinator>) -> Self {
        Self {
            core: StepCore::new(name),
            combinator,
        }
    }

    pub fn add_input_port(&mut self, name: &str, port: PortId) {
        self.core.add_input_port(name, port);
    }

    pub fn add_output_port(&mut self, name: &str, port: PortId) {
        self.core.add_output_port(name, port);
    }
}

#[async_trait]
impl Step for CombinatorStep {
    fn core(&self) -> &StepCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StepCore {
        &mut self.core
    }

    async fn drive(&mut self, ctx: &StepCtx) -> StepResult<Status> {
        let mut status = Status::Skipped;
        if self.core.input_ports().is_empty() {
            return Ok(status);
        }

        let mut reads: JoinSet<(String, Token)> = JoinSet::new();
        let port_names: Vec<String> = self.core.input_ports().keys().cloned().collect();
        for port_name in &port_names {
            arm(&self.core, ctx, &mut reads, port_name)?;
        }

        let mut terminated: HashSet<String> = HashSet::new();
        loop {
            let joined = ctx.guard(reads.join_next()).await?;
            let Some(joined) = joined else {
                break;
            };
            let (port_name, token) =
                joined.map_err(|e| anyhow::anyhow!("port read task failed: {e}"))?;

            if token.is_termination() {
                sf_debug!(step, step = %self.core.name(), port = %port_name, "port terminated");
                terminated.insert(port_name.clone());
            } else {
                status = Status::Completed;
                let schemas = self.combinator.combine(&port_name, token).await?;
                emit_schemas(&self.core, ctx, schemas).await?;
            }

            if !terminated.contains(&port_name) {
                arm(&self.core, ctx, &mut reads, &port_name)?;
            }
        }

        Ok(status)
    }
}

// ---------------------------------------------------------------------------
// LoopCombinatorStep
// ---------------------------------------------------------------------------

/// A combinator step with per-port, per-iteration termination tracking.
///
/// Each regular token records its tag's prefix in the port's checklist; an
/// iteration-termination token (tagged `<prefix>.<N>`) removes the entry
/// for its prefix. A port only stops being re-armed once its termination
/// token has arrived *and* its checklist has drained — sub-iterations may
/// keep emitting after the outer termination token.
pub struct LoopCombinatorStep {
    core: StepCore,
    combinator: Box<dyn Combinator>,
    checklist: HashMap<String, HashSet<Tag>>,
}

impl LoopCombinatorStep {
    pub fn new(name: &str, combinator: Box<dyn Combinator>) -> Self {
        Self {
            core: StepCore::new(name),
            combinator,
            checklist: HashMap::new(),
        }
    }

    pub fn add_input_port(&mut self, name: &str, port: PortId) {
        self.core.add_input_port(name, port);
    }

    pub fn add_output_port(&mut self, name: &str, port: PortId) {
        self.core.add_output_port(name, port);
    }
}

#[async_trait]
impl Step for LoopCombinatorStep {
    fn core(&self) -> &StepCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StepCore {
        &mut self.core
    }

    async fn drive(&mut self, ctx: &StepCtx) -> StepResult<Status> {
        let mut status = Status::Skipped;
        if self.core.input_ports().is_empty() {
            return Ok(status);
        }

        let mut reads: JoinSet<(String, Token)> = JoinSet::new();
        let port_names: Vec<String> = self.core.input_ports().keys().cloned().collect();
        for port_name in &port_names {
            self.checklist.insert(port_name.clone(), HashSet::new());
            arm(&self.core, ctx, &mut reads, port_name)?;
        }

        let mut terminated: HashSet<String> = HashSet::new();
        loop {
            let joined = ctx.guard(reads.join_next()).await?;
            let Some(joined) = joined else {
                break;
            };
            let (port_name, token) =
                joined.map_err(|e| anyhow::anyhow!("port read task failed: {e}"))?;

            match token {
                Token::Termination => {
                    sf_debug!(step, step = %self.core.name(), port = %port_name, "port terminated");
                    terminated.insert(port_name.clone());
                }
                Token::IterationTermination(iteration) => {
                    // The checklist stores iteration prefixes; project the
                    // `<prefix>.<N>` tag down to the same depth.
                    let outstanding = self.checklist.entry(port_name.clone()).or_default();
                    if outstanding.remove(&iteration.tag.prefix()) {
                        sf_debug!(
                            step,
                            step = %self.core.name(),
                            port = %port_name,
                            tag = %iteration.tag,
                            "iteration terminated"
                        );
                    }
                }
                token => {
                    status = Status::Completed;
                    if let Some(tag) = token.tag() {
                        self.checklist
                            .entry(port_name.clone())
                            .or_default()
                            .insert(tag.prefix());
                    }
                    let schemas = self.combinator.combine(&port_name, token).await?;
                    emit_schemas(&self.core, ctx, schemas).await?;
                }
            }

            let drained = self
                .checklist
                .get(&port_name)
                .map(HashSet::is_empty)
                .unwrap_or(true);
            if !(terminated.contains(&port_name) && drained) {
                arm(&self.core, ctx, &mut reads, &port_name)?;
            }
        }

        Ok(status)
    }
}

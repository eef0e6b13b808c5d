use async_trait::async_trait;

use sf_core::{Status, TokenMap, has_termination};

use crate::error::StepResult;
use crate::workflow::{PortId, StepCtx};

use super::{Step, StepCore, StepOutputs, TagGroups};

// ---------------------------------------------------------------------------
// Condition — the injected branch policy
// ---------------------------------------------------------------------------

/// Predicate plus branch bodies for a [`ConditionalStep`].
///
/// The branch bodies are the only producers of output tokens; they emit
/// through the [`StepOutputs`] surface they are handed.
#[async_trait]
pub trait Condition: Send + Sync {
    async fn eval(&self, inputs: &TokenMap) -> StepResult<bool>;

    async fn on_true(&self, outputs: &StepOutputs<'_>, inputs: &TokenMap) -> StepResult<()>;

    async fn on_false(&self, outputs: &StepOutputs<'_>, inputs: &TokenMap) -> StepResult<()>;
}

// ---------------------------------------------------------------------------
// ConditionalStep
// ---------------------------------------------------------------------------

/// Evaluates the condition on every tag-complete input tuple — or once with
/// the empty tuple when the step has no inputs — and runs the matching
/// branch.
pub struct ConditionalStep {
    core: StepCore,
    condition: Box<dyn Condition>,
}

impl ConditionalStep {
    pub fn new(name: &str, condition: Box<dyn Condition>) -> Self {
        Self {
            core: StepCore::new(name),
            condition,
        }
    }

    pub fn add_input_port(&mut self, name: &str, port: PortId) {
        self.core.add_input_port(name, port);
    }

    pub fn add_output_port(&mut self, name: &str, port: PortId) {
        self.core.add_output_port(name, port);
    }

    async fn branch(&self, ctx: &StepCtx, inputs: &TokenMap) -> StepResult<()> {
        let outputs = StepOutputs::new(&self.core, ctx);
        if ctx.guard(self.condition.eval(inputs)).await?? {
            ctx.guard(self.condition.on_true(&outputs, inputs)).await??;
        } else {
            ctx.guard(self.condition.on_false(&outputs, inputs)).await??;
        }
        Ok(())
    }
}

#[async_trait]
impl Step for ConditionalStep {
    fn core(&self) -> &StepCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StepCore {
        &mut self.core
    }

    async fn drive(&mut self, ctx: &StepCtx) -> StepResult<Status> {
        if self.core.input_ports().is_empty() {
            self.branch(ctx, &TokenMap::new()).await?;
            return Ok(Status::Completed);
        }

        let data_ports = self.core.input_ports().clone();
        let mut groups = TagGroups::default();
        loop {
            let inputs = self.core.gather(ctx, &data_ports).await?;
            if has_termination(inputs.values()) {
                break;
            }
            groups.merge(inputs);
            for (_, tuple) in groups.take_complete(data_ports.len()) {
                self.branch(ctx, &tuple).await?;
            }
        }

        Ok(Status::Completed)
    }
}

use async_trait::async_trait;

use sf_core::{Status, Token, TokenMap, has_iteration_termination, has_termination};

use crate::error::StepResult;
use crate::workflow::{PortId, StepCtx};

use super::{Step, StepCore, TagGroups};

// ---------------------------------------------------------------------------
// Transform — the injected mapping
// ---------------------------------------------------------------------------

/// Maps one tag-complete input tuple to output tokens keyed by output port
/// name.
#[async_trait]
pub trait Transform: Send + Sync {
    async fn transform(&self, inputs: &TokenMap) -> StepResult<TokenMap>;
}

// ---------------------------------------------------------------------------
// Transformer
// ---------------------------------------------------------------------------

/// Applies the transform per tag-complete tuple.
///
/// A tuple containing any iteration-termination token is forwarded
/// unchanged onto the same-named output ports, so loop control flows
/// through untouched. The step is SKIPPED if any output port is still
/// empty at termination.
pub struct Transformer {
    core: StepCore,
    transform: Box<dyn Transform>,
}

impl Transformer {
    pub fn new(name: &str, transform: Box<dyn Transform>) -> Self {
        Self {
            core: StepCore::new(name),
            transform,
        }
    }

    pub fn add_input_port(&mut self, name: &str, port: PortId) {
        self.core.add_input_port(name, port);
    }

    pub fn add_output_port(&mut self, name: &str, port: PortId) {
        self.core.add_output_port(name, port);
    }

    async fn emit_all(&self, ctx: &StepCtx, outputs: TokenMap, inputs: &[Token]) -> StepResult<()> {
        for (port_name, token) in outputs {
            self.core.emit(ctx, &port_name, token, inputs).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Step for Transformer {
    fn core(&self) -> &StepCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StepCore {
        &mut self.core
    }

    async fn drive(&mut self, ctx: &StepCtx) -> StepResult<Status> {
        if self.core.input_ports().is_empty() {
            let outputs = ctx.guard(self.transform.transform(&TokenMap::new())).await??;
            self.emit_all(ctx, outputs, &[]).await?;
        } else {
            let data_ports = self.core.input_ports().clone();
            let mut groups = TagGroups::default();
            loop {
                let inputs = self.core.gather(ctx, &data_ports).await?;
                if has_termination(inputs.values()) {
                    break;
                }
                groups.merge(inputs);
                for (_, tuple) in groups.take_complete(data_ports.len()) {
                    let provenance: Vec<Token> = tuple.values().cloned().collect();
                    if has_iteration_termination(tuple.values()) {
                        // Loop control passes through unchanged.
                        self.emit_all(ctx, tuple, &provenance).await?;
                    } else {
                        let outputs = ctx.guard(self.transform.transform(&tuple)).await??;
                        self.emit_all(ctx, outputs, &provenance).await?;
                    }
                }
            }
        }

        Ok(if self.core.any_output_empty(ctx)? {
            Status::Skipped
        } else {
            Status::Completed
        })
    }
}

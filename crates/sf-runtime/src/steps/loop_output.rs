use std::collections::BTreeMap;

use async_trait::async_trait;

use sf_core::{Status, Tag, Token};

use crate::error::{StepError, StepResult};
use crate::workflow::{PortId, StepCtx};

use super::{Step, StepCore};

// ---------------------------------------------------------------------------
// LoopOutput — the injected aggregation
// ---------------------------------------------------------------------------

/// Aggregates the collected tokens of one loop prefix into the token to
/// emit for that prefix.
#[async_trait]
pub trait LoopOutput: Send + Sync {
    async fn process_output(&mut self, prefix: &Tag, tokens: &[Token]) -> StepResult<Token>;
}

// ---------------------------------------------------------------------------
// LoopOutputStep
// ---------------------------------------------------------------------------

/// Collects loop bodies per prefix and emits one aggregated token per
/// prefix.
///
/// A regular token with tag `P.i` lands in the bucket for `P`; an
/// iteration-termination token tagged `P.N` announces that the iteration
/// holds `N` items. Once a bucket's count matches its announced size, the
/// aggregate is produced and emitted. The step exits when a termination
/// token has arrived and every known prefix has its full complement.
pub struct LoopOutputStep {
    core: StepCore,
    output: Box<dyn LoopOutput>,
    token_map: BTreeMap<Tag, Vec<Token>>,
    size_map: BTreeMap<Tag, usize>,
    termination_map: BTreeMap<Tag, bool>,
}

impl LoopOutputStep {
    pub fn new(name: &str, output: Box<dyn LoopOutput>) -> Self {
        Self {
            core: StepCore::new(name),
            output,
            token_map: BTreeMap::new(),
            size_map: BTreeMap::new(),
            termination_map: BTreeMap::new(),
        }
    }

    pub fn add_input_port(&mut self, name: &str, port: PortId) -> StepResult<()> {
        if !self.core.input_ports().is_empty() && !self.core.input_ports().contains_key(name) {
            return Err(StepError::Definition(format!(
                "{} step must contain a single input port",
                self.core.name()
            )));
        }
        self.core.add_input_port(name, port);
        Ok(())
    }

    pub fn add_output_port(&mut self, name: &str, port: PortId) -> StepResult<()> {
        if !self.core.output_ports().is_empty() && !self.core.output_ports().contains_key(name) {
            return Err(StepError::Definition(format!(
                "{} step must contain a single output port",
                self.core.name()
            )));
        }
        self.core.add_output_port(name, port);
        Ok(())
    }

    /// Emit the aggregate for `prefix` once its bucket matches the size
    /// announced by the iteration-termination token.
    async fn emit_if_complete(
        &mut self,
        ctx: &StepCtx,
        output_name: &str,
        prefix: &Tag,
    ) -> StepResult<()> {
        let (Some(tokens), Some(size)) = (self.token_map.get(prefix), self.size_map.get(prefix))
        else {
            return Ok(());
        };
        if tokens.len() != *size {
            return Ok(());
        }
        let tokens = tokens.clone();
        let aggregated = ctx
            .guard(self.output.process_output(prefix, &tokens))
            .await??;
        self.core.emit(ctx, output_name, aggregated, &tokens).await
    }
}

#[async_trait]
impl Step for LoopOutputStep {
    fn core(&self) -> &StepCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StepCore {
        &mut self.core
    }

    async fn drive(&mut self, ctx: &StepCtx) -> StepResult<Status> {
        let (input_name, _) = self.core.single_input()?;
        let (output_name, _) = self.core.single_output()?;

        loop {
            let token = self.core.get_token(ctx, &input_name).await?;
            match token {
                Token::Termination => {
                    // Freeze the completeness picture for every known prefix.
                    self.termination_map = self
                        .token_map
                        .iter()
                        .map(|(prefix, tokens)| {
                            let complete = self
                                .size_map
                                .get(prefix)
                                .is_some_and(|size| tokens.len() == *size);
                            (prefix.clone(), complete)
                        })
                        .collect();
                }
                Token::IterationTermination(iteration) => {
                    let prefix = iteration.tag.prefix();
                    let size = iteration.tag.iteration_size().ok_or_else(|| {
                        StepError::Execution(format!(
                            "iteration termination tag {} carries no size",
                            iteration.tag
                        ))
                    })?;
                    sf_debug!(step, step = %self.core.name(), prefix = %prefix, size = size, "iteration terminated");
                    self.size_map.insert(prefix.clone(), size);
                    self.emit_if_complete(ctx, &output_name, &prefix).await?;
                }
                token => {
                    let prefix = token.tag().map(Tag::prefix).unwrap_or_else(Tag::root);
                    self.token_map.entry(prefix.clone()).or_default().push(token);
                    self.emit_if_complete(ctx, &output_name, &prefix).await?;
                }
            }

            if !self.termination_map.is_empty() && self.termination_map.values().all(|v| *v) {
                break;
            }
        }

        self.core.completion_status(ctx)
    }
}

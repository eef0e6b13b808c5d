use std::collections::BTreeMap;

use async_trait::async_trait;

use sf_core::{Status, Tag, Token};

use crate::error::{StepError, StepResult};
use crate::workflow::{PortId, StepCtx};

use super::{Step, StepCore};

// ---------------------------------------------------------------------------
// GatherStep
// ---------------------------------------------------------------------------

/// Collects tokens into buckets keyed by their tag prefix at the configured
/// depth, then emits one list token per bucket once the input terminates.
///
/// Bucket elements are sorted ascending by their original tag, so a
/// scatter-gather round trip restores list order.
pub struct GatherStep {
    core: StepCore,
    depth: usize,
    buckets: BTreeMap<Tag, Vec<Token>>,
}

impl GatherStep {
    pub fn new(name: &str, depth: usize) -> Self {
        Self {
            core: StepCore::new(name),
            depth,
            buckets: BTreeMap::new(),
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
}

#[async_trait]
impl Step for GatherStep {
    fn core(&self) -> &StepCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StepCore {
        &mut self.core
    }

    async fn drive(&mut self, ctx: &StepCtx) -> StepResult<Status> {
        if self.depth == 0 {
            return Err(StepError::Definition(format!(
                "{} step requires a depth of at least 1",
                self.core.name()
            )));
        }
        let (input_name, _) = self.core.single_input()?;
        let (output_name, _) = self.core.single_output()?;

        loop {
            let token = self.core.get_token(ctx, &input_name).await?;
            if token.is_termination() {
                break;
            }
            let Some(tag) = token.tag() else {
                continue;
            };
            let key = tag.drop_last(self.depth);
            self.buckets.entry(key).or_default().push(token);
        }

        for (key, mut tokens) in std::mem::take(&mut self.buckets) {
            tokens.sort_by(|a, b| a.tag().cmp(&b.tag()));
            let list = Token::list(key, tokens.clone());
            self.core.emit(ctx, &output_name, list, &tokens).await?;
        }

        self.core.completion_status(ctx)
    }
}

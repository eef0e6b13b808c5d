use async_trait::async_trait;

use sf_core::{Status, Token};

use crate::error::{StepError, StepResult};
use crate::workflow::{PortId, StepCtx};

use super::{Step, StepCore};

// ---------------------------------------------------------------------------
// ScatterStep
// ---------------------------------------------------------------------------

/// Fans each incoming list token out element by element.
///
/// An element at position `i` of a list tagged `T` leaves retagged `T.i`,
/// in list order. Anything other than a list token is a definition error:
/// scatter ports require iterable inputs.
pub struct ScatterStep {
    core: StepCore,
}

impl ScatterStep {
    pub fn new(name: &str) -> Self {
        Self {
            core: StepCore::new(name),
        }
    }

    pub fn add_input_port(&mut self, name: &str, port: PortId) -> StepResult<()> {
        if !self.core.input_ports().is_empty() {
            return Err(StepError::Definition(
                "scatter step must contain a single input port".into(),
            ));
        }
        self.core.add_input_port(name, port);
        Ok(())
    }

    pub fn add_output_port(&mut self, name: &str, port: PortId) -> StepResult<()> {
        if !self.core.output_ports().is_empty() && !self.core.output_ports().contains_key(name) {
            return Err(StepError::Definition(
                "scatter step must contain a single output port".into(),
            ));
        }
        self.core.add_output_port(name, port);
        Ok(())
    }
}

#[async_trait]
impl Step for ScatterStep {
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
                Token::Termination => break,
                Token::List(list) => {
                    let parent = Token::List(list.clone());
                    for (index, element) in list.tokens.iter().enumerate() {
                        let retagged = element.retag(list.tag.with_index(index));
                        self.core
                            .emit(ctx, &output_name, retagged, std::slice::from_ref(&parent))
                            .await?;
                    }
                }
                other => {
                    return Err(StepError::Definition(format!(
                        "scatter ports require iterable inputs (step {}, got {})",
                        self.core.name(),
                        other.kind()
                    )));
                }
            }
        }

        self.core.completion_status(ctx)
    }
}

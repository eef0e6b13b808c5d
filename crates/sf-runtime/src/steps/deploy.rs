use async_trait::async_trait;
use serde_json::json;

use sf_core::{Status, Tag, Token, has_termination};

use crate::context::DeploymentConfig;
use crate::error::{StepError, StepResult};
use crate::workflow::{PortId, StepCtx};

use super::{Step, StepCore, TagGroups};

// ---------------------------------------------------------------------------
// DeployStep
// ---------------------------------------------------------------------------

/// Brings a deployment up and announces it on the single connector output.
///
/// The output port is named after the deployment; downstream schedule steps
/// resolve the emitted deployment name to a connector. Registering a second
/// output port is a definition error.
pub struct DeployStep {
    core: StepCore,
    config: DeploymentConfig,
}

impl DeployStep {
    pub fn new(name: &str, config: DeploymentConfig, connector_port: PortId) -> Self {
        let mut core = StepCore::new(name);
        core.add_output_port(&config.name, connector_port);
        Self { core, config }
    }

    pub fn add_input_port(&mut self, name: &str, port: PortId) {
        self.core.add_input_port(name, port);
    }

    pub fn add_output_port(&mut self, name: &str, port: PortId) -> StepResult<()> {
        if !self.core.output_ports().is_empty() && !self.core.output_ports().contains_key(name) {
            return Err(StepError::Definition(
                "deploy step must contain a single output port".into(),
            ));
        }
        self.core.add_output_port(name, port);
        Ok(())
    }

    async fn deploy_once(&self, ctx: &StepCtx, inputs: &[Token]) -> StepResult<()> {
        ctx.guard(ctx.context.deployment_manager.deploy(&self.config))
            .await??;
        self.core
            .emit(
                ctx,
                &self.config.name,
                Token::value(Tag::root(), json!(self.config.name.clone())),
                inputs,
            )
            .await
    }
}

#[async_trait]
impl Step for DeployStep {
    fn core(&self) -> &StepCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StepCore {
        &mut self.core
    }

    async fn drive(&mut self, ctx: &StepCtx) -> StepResult<Status> {
        self.core.single_output()?;

        if self.core.input_ports().is_empty() {
            self.deploy_once(ctx, &[]).await?;
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
                    let inputs: Vec<Token> = tuple.into_values().collect();
                    self.deploy_once(ctx, &inputs).await?;
                }
            }
        }

        Ok(Status::Completed)
    }
}

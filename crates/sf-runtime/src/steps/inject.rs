use async_trait::async_trait;
use serde_json::Value;

use sf_core::{Job, Status, Token};

use crate::error::{StepError, StepResult};
use crate::workflow::{PortId, StepCtx};

use super::{JOB_PORT, Step, StepCore};

// ---------------------------------------------------------------------------
// InputInjector — the injected resolution
// ---------------------------------------------------------------------------

/// Resolves one incoming token value against the current job, producing the
/// token to inject downstream (e.g. staging the value into the job's input
/// directory).
#[async_trait]
pub trait InputInjector: Send + Sync {
    async fn process_input(&self, job: &Job, value: &Value) -> StepResult<Token>;
}

// ---------------------------------------------------------------------------
// InputInjectorStep
// ---------------------------------------------------------------------------

/// Single data input plus the reserved `__job__` port, single output. Every
/// incoming data token is resolved against the current job and re-emitted.
pub struct InputInjectorStep {
    core: StepCore,
    injector: Box<dyn InputInjector>,
}

impl InputInjectorStep {
    pub fn new(name: &str, job_port: PortId, injector: Box<dyn InputInjector>) -> Self {
        let mut core = StepCore::new(name);
        core.add_input_port(JOB_PORT, job_port);
        Self { core, injector }
    }

    pub fn add_input_port(&mut self, name: &str, port: PortId) -> StepResult<()> {
        let data_ports = self.core.data_input_ports(&[JOB_PORT]);
        if !data_ports.is_empty() && !data_ports.contains_key(name) {
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
impl Step for InputInjectorStep {
    fn core(&self) -> &StepCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StepCore {
        &mut self.core
    }

    async fn drive(&mut self, ctx: &StepCtx) -> StepResult<Status> {
        let data_ports = self.core.data_input_ports(&[JOB_PORT]);
        if data_ports.len() != 1 {
            return Err(StepError::Definition(format!(
                "{} step must contain a single input port",
                self.core.name()
            )));
        }
        let (output_name, _) = self.core.single_output()?;
        let input_name = data_ports.keys().next().expect("checked length").clone();

        loop {
            let token = self.core.get_token(ctx, &input_name).await?;
            if token.is_termination() {
                break;
            }
            let job = self.core.get_job(ctx).await?.ok_or_else(|| {
                StepError::Execution(format!(
                    "step {} received a null job",
                    self.core.name()
                ))
            })?;
            let value = token.save();
            let injected = ctx
                .guard(self.injector.process_input(&job, &value))
                .await??;
            self.core
                .emit(ctx, &output_name, injected, std::slice::from_ref(&token))
                .await?;
        }

        self.core.completion_status(ctx)
    }
}

use async_trait::async_trait;

use sf_core::{Job, Status, Token, has_termination};

use crate::error::{StepError, StepResult};
use crate::workflow::{PortId, StepCtx};

use super::{JOB_PORT, Step, StepCore, TagGroups};

// ---------------------------------------------------------------------------
// Transfer — the injected data movement
// ---------------------------------------------------------------------------

/// Moves one token's data into the job's working directories and returns
/// the rewritten token.
#[async_trait]
pub trait Transfer: Send + Sync {
    async fn transfer(&self, job: &Job, token: &Token) -> StepResult<Token>;
}

// ---------------------------------------------------------------------------
// TransferStep
// ---------------------------------------------------------------------------

/// Per tag-complete tuple: fetch the current job from the reserved
/// `__job__` port, then transfer every input token onto its same-named
/// output port. SKIPPED unless at least one transfer happened.
pub struct TransferStep {
    core: StepCore,
    transfer: Box<dyn Transfer>,
}

impl TransferStep {
    pub fn new(name: &str, job_port: PortId, transfer: Box<dyn Transfer>) -> Self {
        let mut core = StepCore::new(name);
        core.add_input_port(JOB_PORT, job_port);
        Self { core, transfer }
    }

    pub fn add_input_port(&mut self, name: &str, port: PortId) {
        self.core.add_input_port(name, port);
    }

    pub fn add_output_port(&mut self, name: &str, port: PortId) {
        self.core.add_output_port(name, port);
    }
}

#[async_trait]
impl Step for TransferStep {
    fn core(&self) -> &StepCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StepCore {
        &mut self.core
    }

    async fn drive(&mut self, ctx: &StepCtx) -> StepResult<Status> {
        let mut status = Status::Skipped;
        let data_ports = self.core.data_input_ports(&[JOB_PORT]);
        if data_ports.is_empty() {
            return Ok(status);
        }

        let mut groups = TagGroups::default();
        loop {
            let inputs = self.core.gather(ctx, &data_ports).await?;
            if has_termination(inputs.values()) {
                break;
            }
            groups.merge(inputs);
            for (_, tuple) in groups.take_complete(data_ports.len()) {
                let job = self.core.get_job(ctx).await?.ok_or_else(|| {
                    StepError::Execution(format!(
                        "step {} received a null job",
                        self.core.name()
                    ))
                })?;
                status = Status::Completed;
                let provenance: Vec<Token> = tuple.values().cloned().collect();
                for (port_name, token) in &tuple {
                    let transferred = ctx.guard(self.transfer.transfer(&job, token)).await??;
                    self.core
                        .emit(ctx, port_name, transferred, &provenance)
                        .await?;
                }
            }
        }

        Ok(status)
    }
}

use std::sync::Arc;

use async_trait::async_trait;

use sf_core::{Job, Status, Token, TokenMap, derived_tag, has_termination};

use crate::context::{Connector, HardwareRequirement, PathFlavor, Target};
use crate::error::{StepError, StepResult};
use crate::workflow::{PortId, StepCtx};

use super::{CONNECTOR_PORT, JOB_PORT, Step, StepCore, TagGroups, random_name};

// ---------------------------------------------------------------------------
// ScheduleStep
// ---------------------------------------------------------------------------

/// Builds and places one job per tag-complete input tuple.
///
/// The connector arrives on the reserved `__connector__` input; scheduled
/// jobs leave as job tokens on the reserved `__job__` output. Working
/// directories get random names under the target's workdir unless fixed at
/// construction. With no data inputs, exactly one scheduling cycle runs.
pub struct ScheduleStep {
    core: StepCore,
    target: Target,
    hardware_requirement: Option<Arc<dyn HardwareRequirement>>,
    input_directory: Option<String>,
    output_directory: Option<String>,
    tmp_directory: Option<String>,
}

impl ScheduleStep {
    pub fn new(name: &str, connector_port: PortId, job_port: PortId, target: Target) -> Self {
        let mut core = StepCore::new(name);
        core.add_input_port(CONNECTOR_PORT, connector_port);
        core.add_output_port(JOB_PORT, job_port);
        Self {
            core,
            target,
            hardware_requirement: None,
            input_directory: None,
            output_directory: None,
            tmp_directory: None,
        }
    }

    pub fn with_hardware_requirement(
        mut self,
        requirement: Arc<dyn HardwareRequirement>,
    ) -> Self {
        self.hardware_requirement = Some(requirement);
        self
    }

    /// Pin any of the three job directories instead of generating them.
    pub fn with_directories(
        mut self,
        input: Option<String>,
        output: Option<String>,
        tmp: Option<String>,
    ) -> Self {
        self.input_directory = input;
        self.output_directory = output;
        self.tmp_directory = tmp;
        self
    }

    pub fn add_input_port(&mut self, name: &str, port: PortId) {
        self.core.add_input_port(name, port);
    }

    fn directory(&self, flavor: PathFlavor, fixed: Option<&String>) -> String {
        fixed
            .cloned()
            .unwrap_or_else(|| flavor.join(&self.target.workdir, &random_name()))
    }

    /// One scheduling cycle: build the job, place it, create its directories
    /// on the assigned locations, and propagate the job token.
    async fn schedule_job(
        &self,
        ctx: &StepCtx,
        connector: &Arc<dyn Connector>,
        inputs: TokenMap,
    ) -> StepResult<()> {
        let flavor = connector.path_flavor();
        let job = Job {
            name: random_name(),
            inputs: inputs.clone(),
            input_directory: self.directory(flavor, self.input_directory.as_ref()),
            output_directory: self.directory(flavor, self.output_directory.as_ref()),
            tmp_directory: self.directory(flavor, self.tmp_directory.as_ref()),
        };

        let hardware = self
            .hardware_requirement
            .as_ref()
            .map(|requirement| requirement.eval(&inputs));
        ctx.guard(
            ctx.context
                .scheduler
                .schedule(&job, &self.target, hardware.as_ref()),
        )
        .await??;

        let locations = ctx.context.scheduler.get_locations(&job.name);
        let paths: Vec<String> = job.directories().iter().map(|d| d.to_string()).collect();
        ctx.guard(connector.mkdirs(&locations, &paths)).await??;

        sf_debug!(sched, job = %job.name, locations = locations.len(), "job scheduled");

        let tag = derived_tag(inputs.values());
        let provenance: Vec<Token> = inputs.into_values().collect();
        self.core
            .emit(ctx, JOB_PORT, Token::job(tag, Arc::new(job)), &provenance)
            .await
    }
}

#[async_trait]
impl Step for ScheduleStep {
    fn core(&self) -> &StepCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StepCore {
        &mut self.core
    }

    async fn drive(&mut self, ctx: &StepCtx) -> StepResult<Status> {
        let Some(connector) = self.core.get_connector(ctx).await? else {
            return Err(StepError::Execution(format!(
                "step {} found its connector port terminated",
                self.core.name()
            )));
        };

        let data_ports = self.core.data_input_ports(&[CONNECTOR_PORT]);
        if data_ports.is_empty() {
            self.schedule_job(ctx, &connector, TokenMap::new()).await?;
        } else {
            let mut groups = TagGroups::default();
            loop {
                let inputs = self.core.gather(ctx, &data_ports).await?;
                if has_termination(inputs.values()) {
                    break;
                }
                groups.merge(inputs);
                for (_, tuple) in groups.take_complete(data_ports.len()) {
                    self.schedule_job(ctx, &connector, tuple).await?;
                }
            }
        }

        self.core.completion_status(ctx)
    }
}

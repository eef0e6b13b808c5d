use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;

use sf_core::{
    CommandOutput, Job, Status, Token, TokenMap, derived_tag, fold_statuses, has_termination,
};

use crate::context::Command;
use crate::error::{StepError, StepResult};
use crate::workflow::{PortId, StepCtx};

use super::{JOB_PORT, Step, StepCore, TagGroups};

// ---------------------------------------------------------------------------
// CommandOutputProcessor
// ---------------------------------------------------------------------------

/// Transforms a finished job's command output into the token for one output
/// port. Returning `None` emits nothing for that port.
#[async_trait]
pub trait CommandOutputProcessor: Send + Sync {
    async fn process(
        &self,
        job: &Job,
        command_output: &CommandOutput,
    ) -> StepResult<Option<Token>>;
}

/// Emits the raw command value under the job's input-derived tag.
pub struct DefaultCommandOutputProcessor;

#[async_trait]
impl CommandOutputProcessor for DefaultCommandOutputProcessor {
    async fn process(
        &self,
        job: &Job,
        command_output: &CommandOutput,
    ) -> StepResult<Option<Token>> {
        Ok(Some(Token::value(
            derived_tag(job.inputs.values()),
            command_output.value.clone(),
        )))
    }
}

// ---------------------------------------------------------------------------
// ExecuteStep
// ---------------------------------------------------------------------------

/// Runs a command on a scheduled job for every tag-complete input tuple.
///
/// Job descriptors arrive on the reserved `__job__` input port. Each tuple
/// spawns one job sub-task; after the data ports terminate, the step awaits
/// every sub-task and folds their statuses into its terminal status.
pub struct ExecuteStep {
    core: StepCore,
    command: Arc<dyn Command>,
    output_processors: BTreeMap<String, Arc<dyn CommandOutputProcessor>>,
}

impl ExecuteStep {
    pub fn new(name: &str, job_port: PortId, command: Arc<dyn Command>) -> Self {
        let mut core = StepCore::new(name);
        core.add_input_port(JOB_PORT, job_port);
        Self {
            core,
            command,
            output_processors: BTreeMap::new(),
        }
    }

    pub fn add_input_port(&mut self, name: &str, port: PortId) {
        self.core.add_input_port(name, port);
    }

    /// Register an output port with the default processor.
    pub fn add_output_port(&mut self, name: &str, port: PortId) {
        self.add_output_port_with(name, port, Arc::new(DefaultCommandOutputProcessor));
    }

    pub fn add_output_port_with(
        &mut self,
        name: &str,
        port: PortId,
        processor: Arc<dyn CommandOutputProcessor>,
    ) {
        self.core.add_output_port(name, port);
        self.output_processors.insert(name.to_string(), processor);
    }

    /// Read data tuples and spawn one job sub-task per complete tag.
    async fn pump(
        &self,
        ctx: &StepCtx,
        data_ports: &BTreeMap<String, PortId>,
        jobs: &mut JoinSet<Status>,
    ) -> StepResult<()> {
        if data_ports.is_empty() {
            self.spawn_job(ctx, jobs, TokenMap::new());
            return Ok(());
        }
        let mut groups = TagGroups::default();
        loop {
            let inputs = self.core.gather(ctx, data_ports).await?;
            if has_termination(inputs.values()) {
                return Ok(());
            }
            groups.merge(inputs);
            for (_, tuple) in groups.take_complete(data_ports.len()) {
                self.core.set_status(Status::Fireable);
                self.spawn_job(ctx, jobs, tuple);
            }
        }
    }

    fn spawn_job(&self, ctx: &StepCtx, jobs: &mut JoinSet<Status>, inputs: TokenMap) {
        let core = self.core.clone();
        let ctx = ctx.clone();
        let command = Arc::clone(&self.command);
        let processors = self.output_processors.clone();
        jobs.spawn(async move { run_job(core, ctx, command, processors, inputs).await });
    }
}

#[async_trait]
impl Step for ExecuteStep {
    fn core(&self) -> &StepCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StepCore {
        &mut self.core
    }

    async fn drive(&mut self, ctx: &StepCtx) -> StepResult<Status> {
        let data_ports = self.core.data_input_ports(&[JOB_PORT]);
        let mut jobs: JoinSet<Status> = JoinSet::new();

        let pumped = self.pump(ctx, &data_ports, &mut jobs).await;

        // Await every spawned job before surfacing a pump error: in-flight
        // jobs must reach their final scheduler notification.
        let mut statuses = Vec::new();
        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok(status) => statuses.push(status),
                Err(e) => {
                    sf_warn!(job, step = %self.core.name(), error = %e, "job task panicked");
                    statuses.push(Status::Failed);
                }
            }
        }
        pumped?;

        Ok(fold_statuses(&statuses))
    }
}

// ---------------------------------------------------------------------------
// Job sub-task
// ---------------------------------------------------------------------------

async fn run_job(
    core: StepCore,
    ctx: StepCtx,
    command: Arc<dyn Command>,
    processors: BTreeMap<String, Arc<dyn CommandOutputProcessor>>,
    inputs: TokenMap,
) -> Status {
    // Acquire the job descriptor; failing that, the job fails.
    let job = match core.get_job(&ctx).await {
        Ok(Some(job)) => Arc::new(job.with_inputs(inputs)),
        Ok(None) => {
            sf_error!(job, step = %core.name(), "received a null job");
            return Status::Failed;
        }
        Err(StepError::Cancelled) => return Status::Cancelled,
        Err(e) => {
            sf_error!(job, step = %core.name(), error = %e, "failed to acquire job");
            return Status::Failed;
        }
    };
    sf_debug!(job, job = %job.name, "job started");

    let mut command_output = CommandOutput::failed();
    if !core.terminated() {
        core.set_status(Status::Running);
    }

    match attempt(&core, &ctx, &command, &job).await {
        Ok(output) => command_output = output,
        Err(StepError::Cancelled) => {
            command_output.status = Status::Cancelled;
            core.terminate(&ctx, Status::Cancelled);
        }
        Err(StepError::FailureHandling(msg)) => {
            sf_error!(job, job = %job.name, error = %msg, "failure handling declined");
            command_output.status = Status::Failed;
            core.terminate(&ctx, Status::Failed);
        }
        Err(err) => {
            // Generic failure: give the failure manager a chance to recover.
            sf_error!(job, job = %job.name, error = %err, "job raised an error");
            let recovery = ctx
                .guard(ctx.context.failure_manager.handle_exception(
                    &job,
                    core.name(),
                    anyhow::Error::new(err),
                ))
                .await;
            match recovery {
                Ok(Ok(output)) => command_output = output,
                Ok(Err(e)) => {
                    sf_error!(job, job = %job.name, error = %e, "failure handling declined");
                    command_output.status = Status::Failed;
                    core.terminate(&ctx, Status::Failed);
                }
                Err(_) => {
                    command_output.status = Status::Cancelled;
                    core.terminate(&ctx, Status::Cancelled);
                }
            }
        }
    }

    // The final status always reaches the scheduler, cancelled or not.
    if let Err(e) = ctx
        .context
        .scheduler
        .notify_status(&job.name, command_output.status)
        .await
    {
        sf_warn!(sched, job = %job.name, error = %e, "status notification failed");
    }

    // Retrieve output tokens, one processor per output port, concurrently.
    if !core.terminated() {
        let mut outputs: JoinSet<StepResult<()>> = JoinSet::new();
        for output_name in core.output_ports().keys() {
            let Some(processor) = processors.get(output_name) else {
                continue;
            };
            let core = core.clone();
            let ctx = ctx.clone();
            let processor = Arc::clone(processor);
            let job = Arc::clone(&job);
            let output = command_output.clone();
            let output_name = output_name.clone();
            outputs.spawn(async move {
                retrieve_output(core, ctx, processor, job, output_name, output).await
            });
        }
        while let Some(joined) = outputs.join_next().await {
            let failed = match joined {
                Ok(Ok(())) => false,
                Ok(Err(e)) => {
                    sf_error!(job, job = %job.name, error = %e, "output processing failed");
                    true
                }
                Err(e) => {
                    sf_warn!(job, job = %job.name, error = %e, "output task panicked");
                    true
                }
            };
            if failed {
                command_output.status = Status::Failed;
            }
        }
    }

    sf_debug!(job, job = %job.name, status = %command_output.status, "job terminated");
    command_output.status
}

/// Notify RUNNING, execute the command, and run the failure manager's
/// recovery path on a FAILED command output.
async fn attempt(
    core: &StepCore,
    ctx: &StepCtx,
    command: &Arc<dyn Command>,
    job: &Arc<Job>,
) -> StepResult<CommandOutput> {
    ctx.guard(ctx.context.scheduler.notify_status(&job.name, Status::Running))
        .await??;
    let mut output = ctx.guard(command.execute(job)).await??;
    if output.status == Status::Failed {
        sf_error!(job, job = %job.name, error = %output.value, "job failed");
        output = ctx
            .guard(
                ctx.context
                    .failure_manager
                    .handle_failure(job, core.name(), output),
            )
            .await?
            .map_err(|e| StepError::FailureHandling(e.to_string()))?;
    }
    Ok(output)
}

async fn retrieve_output(
    core: StepCore,
    ctx: StepCtx,
    processor: Arc<dyn CommandOutputProcessor>,
    job: Arc<Job>,
    output_name: String,
    command_output: CommandOutput,
) -> StepResult<()> {
    if let Some(token) = ctx.guard(processor.process(&job, &command_output)).await?? {
        let inputs: Vec<Token> = job.inputs.values().cloned().collect();
        core.emit(&ctx, &output_name, token, &inputs).await?;
    }
    Ok(())
}

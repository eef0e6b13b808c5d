//! Concurrent scheduling of every step to run, and the per-step failure
//! envelope.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use orion_error::StructError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use sf_core::{Port, Status, fold_statuses};

use crate::context::RunContext;
use crate::error::{RuntimeReason, RuntimeResult, StepError};
use crate::steps::Step;
use crate::workflow::{PortId, Ports, RunReport, StepCtx};

/// Spawn one task per step, await their joint completion, and fold the
/// terminal statuses into the run status.
///
/// A failing step never cancels its peers: downstream steps learn of the
/// failure only through termination tokens.
pub(crate) async fn run(
    name: String,
    context: Arc<RunContext>,
    ports: HashMap<PortId, Arc<Port>>,
    steps: Vec<Box<dyn Step>>,
    cancel: CancellationToken,
) -> RuntimeResult<RunReport> {
    let ports = Arc::new(Ports::new(ports));

    // Every registered step must resolve its ports before anything runs.
    for step in &steps {
        let registrations = step
            .core()
            .input_ports()
            .iter()
            .chain(step.core().output_ports().iter());
        for (port_name, id) in registrations {
            if !ports.contains(*id) {
                return Err(StructError::from(RuntimeReason::Bootstrap).with_detail(format!(
                    "step {} references unknown {id} as {port_name}",
                    step.core().name()
                )));
            }
        }
    }

    sf_info!(sys, workflow = %name, steps = steps.len(), "workflow started");

    let mut tasks: JoinSet<(String, Status)> = JoinSet::new();
    for step in steps {
        let ctx = StepCtx {
            ports: Arc::clone(&ports),
            context: Arc::clone(&context),
            cancel: cancel.child_token(),
        };
        tasks.spawn(run_step(step, ctx));
    }

    let mut statuses: BTreeMap<String, Status> = BTreeMap::new();
    let mut panicked = false;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((step_name, status)) => {
                statuses.insert(step_name, status);
            }
            Err(e) => {
                sf_warn!(sys, error = %e, "step task panicked");
                panicked = true;
            }
        }
    }

    let mut folded: Vec<Status> = statuses.values().copied().collect();
    if panicked {
        folded.push(Status::Failed);
    }
    let status = fold_statuses(&folded);
    sf_info!(sys, workflow = %name, status = %status, "workflow finished");

    Ok(RunReport {
        steps: statuses,
        status,
    })
}

/// The per-step envelope: drive the step, convert its outcome into a
/// terminal status, and terminate exactly once.
async fn run_step(mut step: Box<dyn Step>, ctx: StepCtx) -> (String, Status) {
    let name = step.core().name().to_string();
    sf_debug!(step, step = %name, "step started");

    let requested = match step.drive(&ctx).await {
        Ok(status) => status,
        Err(StepError::Cancelled) => Status::Cancelled,
        Err(err @ (StepError::Definition(_)
        | StepError::Execution(_)
        | StepError::FailureHandling(_)
        | StepError::Workflow(_))) => {
            sf_error!(step, step = %name, error = %err, "step failed");
            Status::Failed
        }
        Err(StepError::Other(err)) => {
            sf_error!(step, step = %name, error = ?err, "step failed");
            Status::Failed
        }
    };

    // First terminate call wins; report the effective terminal status.
    let status = step.core().terminate(&ctx, requested);
    (name, status)
}

/// Cancel the workflow on the first SIGINT or SIGTERM.
pub async fn wait_for_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to listen for SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                sf_info!(sys, signal = "SIGINT", "received signal, cancelling workflow");
            }
            _ = sigterm.recv() => {
                sf_info!(sys, signal = "SIGTERM", "received signal, cancelling workflow");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for Ctrl-C");
        sf_info!(sys, "received shutdown signal, cancelling workflow");
    }
    cancel.cancel();
}

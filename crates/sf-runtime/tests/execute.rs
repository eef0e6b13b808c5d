mod common;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use sf_core::{CommandOutput, Job, Status, Tag, Token};
use sf_runtime::steps::{CommandOutputProcessor, ExecuteStep};
use sf_runtime::{StepResult, Workflow};

fn data_values(tokens: &[Token]) -> Vec<Value> {
    tokens
        .iter()
        .filter_map(|t| match t {
            Token::Value(v) => Some(v.value.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn failed_command_recovers_through_failure_manager() {
    let test = common::TestContext::new();
    let context = test.run_context_with(Arc::new(common::FixedRecovery {
        output: CommandOutput::completed(json!(7)),
    }));
    let mut wf = Workflow::new("recovery", context);

    let jobs = wf.create_port("jobs");
    let data = wf.create_port("data");
    let out = wf.create_port("out");

    let mut exec = ExecuteStep::new(
        "exec",
        jobs,
        Arc::new(common::FixedCommand {
            output: CommandOutput::new(json!("boom"), Status::Failed),
        }),
    );
    exec.add_input_port("x", data);
    exec.add_output_port("out", out);
    wf.add_step(exec);

    wf.port(jobs)
        .unwrap()
        .put(Token::job(Tag::root(), Arc::new(common::job("job-1"))));
    let data_port = wf.port(data).unwrap().clone();
    data_port.put(Token::value("a", json!("in")));
    data_port.put(Token::Termination);

    let out_port = wf.port(out).unwrap().clone();
    let report = wf.run().await.unwrap();

    // The failure manager's recovery output drives the default processor.
    assert_eq!(report.steps["exec"], Status::Completed);
    let tokens = common::drain(&out_port, "probe/in").await;
    assert_eq!(data_values(&tokens), vec![json!(7)]);
    // The emitted token's tag derives from the job's input tuple.
    assert_eq!(tokens[0].tag().unwrap().as_str(), "a");

    let notifications = test.scheduler.notifications.lock().unwrap().clone();
    assert_eq!(
        notifications,
        vec![
            ("job-1".to_string(), Status::Running),
            ("job-1".to_string(), Status::Completed),
        ]
    );
}

#[tokio::test]
async fn declined_recovery_fails_the_step() {
    let test = common::TestContext::new();
    let mut wf = Workflow::new("declined", test.run_context());

    let jobs = wf.create_port("jobs");
    let data = wf.create_port("data");
    let out = wf.create_port("out");

    let mut exec = ExecuteStep::new(
        "exec",
        jobs,
        Arc::new(common::FixedCommand {
            output: CommandOutput::new(json!("boom"), Status::Failed),
        }),
    );
    exec.add_input_port("x", data);
    exec.add_output_port("out", out);
    wf.add_step(exec);

    wf.port(jobs)
        .unwrap()
        .put(Token::job(Tag::root(), Arc::new(common::job("job-1"))));
    let data_port = wf.port(data).unwrap().clone();
    data_port.put(Token::value("a", json!(1)));
    data_port.put(Token::Termination);

    let out_port = wf.port(out).unwrap().clone();
    let report = wf.run().await.unwrap();

    assert_eq!(report.steps["exec"], Status::Failed);
    assert!(out_port.empty());
    assert_eq!(common::termination_count(&out_port), 1);
    assert_eq!(test.scheduler.notified(Status::Failed), 1);
}

#[tokio::test]
async fn no_data_inputs_runs_exactly_one_job() {
    let test = common::TestContext::new();
    let mut wf = Workflow::new("one-shot", test.run_context());

    let jobs = wf.create_port("jobs");
    let out = wf.create_port("out");

    let mut exec = ExecuteStep::new(
        "exec",
        jobs,
        Arc::new(common::FixedCommand {
            output: CommandOutput::completed(json!(42)),
        }),
    );
    exec.add_output_port("out", out);
    wf.add_step(exec);

    wf.port(jobs)
        .unwrap()
        .put(Token::job(Tag::root(), Arc::new(common::job("solo"))));

    let out_port = wf.port(out).unwrap().clone();
    let report = wf.run().await.unwrap();

    assert_eq!(report.steps["exec"], Status::Completed);
    let tokens = common::drain(&out_port, "probe/in").await;
    assert_eq!(data_values(&tokens), vec![json!(42)]);
    // No inputs: the token carries the root tag.
    assert_eq!(tokens[0].tag().unwrap().as_str(), "0");
    assert_eq!(test.scheduler.notified(Status::Running), 1);
    assert_eq!(test.scheduler.notified(Status::Completed), 1);
}

#[tokio::test]
async fn every_job_skipped_folds_to_skipped() {
    let test = common::TestContext::new();
    let mut wf = Workflow::new("all-skipped", test.run_context());

    let jobs = wf.create_port("jobs");
    let data = wf.create_port("data");
    let out = wf.create_port("out");

    let mut exec = ExecuteStep::new(
        "exec",
        jobs,
        Arc::new(common::FixedCommand {
            output: CommandOutput::new(Value::Null, Status::Skipped),
        }),
    );
    exec.add_input_port("x", data);
    exec.add_output_port("out", out);
    wf.add_step(exec);

    let jobs_port = wf.port(jobs).unwrap().clone();
    jobs_port.put(Token::job(Tag::root(), Arc::new(common::job("j0"))));
    jobs_port.put(Token::job(Tag::root(), Arc::new(common::job("j1"))));
    let data_port = wf.port(data).unwrap().clone();
    data_port.put(Token::value("0", json!(1)));
    data_port.put(Token::value("1", json!(2)));
    data_port.put(Token::Termination);

    let report = wf.run().await.unwrap();
    assert_eq!(report.steps["exec"], Status::Skipped);
    assert_eq!(report.status, Status::Skipped);
}

/// Emits nothing, whatever the command produced.
struct Silent;

#[async_trait]
impl CommandOutputProcessor for Silent {
    async fn process(
        &self,
        _job: &Job,
        _command_output: &CommandOutput,
    ) -> StepResult<Option<Token>> {
        Ok(None)
    }
}

#[tokio::test]
async fn processor_returning_none_emits_nothing() {
    let test = common::TestContext::new();
    let mut wf = Workflow::new("silent", test.run_context());

    let jobs = wf.create_port("jobs");
    let out = wf.create_port("out");
    let aux = wf.create_port("aux");

    let mut exec = ExecuteStep::new(
        "exec",
        jobs,
        Arc::new(common::FixedCommand {
            output: CommandOutput::completed(json!(9)),
        }),
    );
    exec.add_output_port("out", out);
    exec.add_output_port_with("aux", aux, Arc::new(Silent));
    wf.add_step(exec);

    wf.port(jobs)
        .unwrap()
        .put(Token::job(Tag::root(), Arc::new(common::job("solo"))));

    let out_port = wf.port(out).unwrap().clone();
    let aux_port = wf.port(aux).unwrap().clone();
    let report = wf.run().await.unwrap();

    assert_eq!(report.steps["exec"], Status::Completed);
    assert_eq!(common::drain(&out_port, "probe/out").await.len(), 1);
    // The silent port carries only its termination marker.
    assert!(aux_port.empty());
    assert_eq!(common::termination_count(&aux_port), 1);
}

#[tokio::test]
async fn null_job_fails_the_step() {
    let test = common::TestContext::new();
    let mut wf = Workflow::new("null-job", test.run_context());

    let jobs = wf.create_port("jobs");
    let data = wf.create_port("data");
    let out = wf.create_port("out");

    let mut exec = ExecuteStep::new(
        "exec",
        jobs,
        Arc::new(common::FixedCommand {
            output: CommandOutput::completed(json!(1)),
        }),
    );
    exec.add_input_port("x", data);
    exec.add_output_port("out", out);
    wf.add_step(exec);

    // The job port terminates without ever carrying a job.
    wf.port(jobs).unwrap().put(Token::Termination);
    let data_port = wf.port(data).unwrap().clone();
    data_port.put(Token::value("a", json!(1)));
    data_port.put(Token::Termination);

    let report = wf.run().await.unwrap();
    assert_eq!(report.steps["exec"], Status::Failed);
}

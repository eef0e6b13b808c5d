mod common;

use async_trait::async_trait;
use serde_json::json;

use sf_core::{Status, Tag, Token, TokenMap};
use sf_runtime::steps::{Condition, ConditionalStep, StepOutputs, Transform, Transformer};
use sf_runtime::{StepResult, Workflow};

// ---------------------------------------------------------------------------
// ConditionalStep
// ---------------------------------------------------------------------------

/// Always true; the true branch writes a single constant token.
struct ConstantTrue;

#[async_trait]
impl Condition for ConstantTrue {
    async fn eval(&self, _inputs: &TokenMap) -> StepResult<bool> {
        Ok(true)
    }

    async fn on_true(&self, outputs: &StepOutputs<'_>, _inputs: &TokenMap) -> StepResult<()> {
        outputs
            .emit("out", Token::value(Tag::root(), json!(42)), &[])
            .await
    }

    async fn on_false(&self, _outputs: &StepOutputs<'_>, _inputs: &TokenMap) -> StepResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn conditional_with_no_inputs_fires_once() {
    let test = common::TestContext::new();
    let mut wf = Workflow::new("conditional", test.run_context());

    let out = wf.create_port("out");
    let mut step = ConditionalStep::new("cond", Box::new(ConstantTrue));
    step.add_output_port("out", out);
    wf.add_step(step);

    let out_port = wf.port(out).unwrap().clone();
    let report = wf.run().await.unwrap();

    assert_eq!(report.steps["cond"], Status::Completed);
    let snapshot = out_port.snapshot();
    assert_eq!(snapshot.len(), 2);
    let Token::Value(value) = &snapshot[0] else {
        panic!("expected a value token");
    };
    assert_eq!(value.value, json!(42));
    assert!(snapshot[1].is_termination());
}

/// Routes even values to `even`, odd values to `odd`.
struct Parity;

#[async_trait]
impl Condition for Parity {
    async fn eval(&self, inputs: &TokenMap) -> StepResult<bool> {
        let Some(Token::Value(token)) = inputs.get("n") else {
            return Ok(false);
        };
        Ok(token.value.as_i64().unwrap_or(0) % 2 == 0)
    }

    async fn on_true(&self, outputs: &StepOutputs<'_>, inputs: &TokenMap) -> StepResult<()> {
        let token = inputs["n"].clone();
        let provenance: Vec<Token> = inputs.values().cloned().collect();
        outputs.emit("even", token, &provenance).await
    }

    async fn on_false(&self, outputs: &StepOutputs<'_>, inputs: &TokenMap) -> StepResult<()> {
        let token = inputs["n"].clone();
        let provenance: Vec<Token> = inputs.values().cloned().collect();
        outputs.emit("odd", token, &provenance).await
    }
}

#[tokio::test]
async fn conditional_routes_per_tuple() {
    let test = common::TestContext::new();
    let mut wf = Workflow::new("parity", test.run_context());

    let source = wf.create_port("n");
    let even = wf.create_port("even");
    let odd = wf.create_port("odd");

    let mut step = ConditionalStep::new("cond", Box::new(Parity));
    step.add_input_port("n", source);
    step.add_output_port("even", even);
    step.add_output_port("odd", odd);
    wf.add_step(step);

    let source_port = wf.port(source).unwrap().clone();
    for (i, n) in [1, 2, 3, 4].iter().enumerate() {
        source_port.put(Token::value(i.to_string(), json!(n)));
    }
    source_port.put(Token::Termination);

    let even_port = wf.port(even).unwrap().clone();
    let odd_port = wf.port(odd).unwrap().clone();
    let report = wf.run().await.unwrap();

    assert_eq!(report.steps["cond"], Status::Completed);
    assert_eq!(common::drain(&even_port, "probe/e").await.len(), 2);
    assert_eq!(common::drain(&odd_port, "probe/o").await.len(), 2);
}

// ---------------------------------------------------------------------------
// Transformer
// ---------------------------------------------------------------------------

/// Doubles the numeric value of input port `n` onto output port `n`.
struct Double;

#[async_trait]
impl Transform for Double {
    async fn transform(&self, inputs: &TokenMap) -> StepResult<TokenMap> {
        let mut outputs = TokenMap::new();
        if let Some(Token::Value(token)) = inputs.get("n") {
            outputs.insert(
                "n".to_string(),
                Token::value(
                    token.tag.clone(),
                    json!(token.value.as_i64().unwrap_or(0) * 2),
                ),
            );
        }
        Ok(outputs)
    }
}

#[tokio::test]
async fn transformer_maps_each_tuple() {
    let test = common::TestContext::new();
    let mut wf = Workflow::new("double", test.run_context());

    let source = wf.create_port("n_in");
    let sink = wf.create_port("n_out");

    let mut step = Transformer::new("double", Box::new(Double));
    step.add_input_port("n", source);
    step.add_output_port("n", sink);
    wf.add_step(step);

    let source_port = wf.port(source).unwrap().clone();
    source_port.put(Token::value("0", json!(21)));
    source_port.put(Token::Termination);

    let sink_port = wf.port(sink).unwrap().clone();
    let report = wf.run().await.unwrap();

    assert_eq!(report.steps["double"], Status::Completed);
    let tokens = common::drain(&sink_port, "probe/n").await;
    assert_eq!(tokens.len(), 1);
    let Token::Value(out) = &tokens[0] else { panic!() };
    assert_eq!(out.value, json!(42));
}

#[tokio::test]
async fn transformer_passes_iteration_termination_through() {
    let test = common::TestContext::new();
    let mut wf = Workflow::new("pass-through", test.run_context());

    let source = wf.create_port("n_in");
    let sink = wf.create_port("n_out");

    let mut step = Transformer::new("double", Box::new(Double));
    step.add_input_port("n", source);
    step.add_output_port("n", sink);
    wf.add_step(step);

    let source_port = wf.port(source).unwrap().clone();
    source_port.put(Token::value("p.0", json!(5)));
    source_port.put(Token::iteration_termination("p.1"));
    source_port.put(Token::Termination);

    let sink_port = wf.port(sink).unwrap().clone();
    let report = wf.run().await.unwrap();

    assert_eq!(report.steps["double"], Status::Completed);
    let tokens = common::drain(&sink_port, "probe/n").await;
    assert_eq!(tokens.len(), 2);
    // The data token was transformed; the loop-control token passed through
    // with tag and kind unchanged.
    let Token::Value(data) = &tokens[0] else { panic!() };
    assert_eq!(data.value, json!(10));
    let Token::IterationTermination(control) = &tokens[1] else {
        panic!("expected iteration termination, got {}", tokens[1].kind());
    };
    assert_eq!(control.tag.as_str(), "p.1");
}

#[tokio::test]
async fn transformer_with_unfed_output_is_skipped() {
    let test = common::TestContext::new();
    let mut wf = Workflow::new("skipped", test.run_context());

    let source = wf.create_port("n_in");
    let sink = wf.create_port("n_out");
    let extra = wf.create_port("extra");

    let mut step = Transformer::new("double", Box::new(Double));
    step.add_input_port("n", source);
    step.add_output_port("n", sink);
    // Double never feeds this port, so the step ends SKIPPED.
    step.add_output_port("extra", extra);
    wf.add_step(step);

    let source_port = wf.port(source).unwrap().clone();
    source_port.put(Token::value("0", json!(1)));
    source_port.put(Token::Termination);

    let report = wf.run().await.unwrap();
    assert_eq!(report.steps["double"], Status::Skipped);
}

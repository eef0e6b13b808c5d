use serde_json::{Value, json};

use crate::status::Status;
use crate::token::TokenMap;

// ---------------------------------------------------------------------------
// Job — a concrete execution unit
// ---------------------------------------------------------------------------

/// A schedulable execution unit: resolved inputs plus the three working
/// directories created on the job's assigned locations.
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    pub inputs: TokenMap,
    pub input_directory: String,
    pub output_directory: String,
    pub tmp_directory: String,
}

impl Job {
    /// The same job with its inputs replaced by a tag-complete tuple.
    pub fn with_inputs(&self, inputs: TokenMap) -> Job {
        Job {
            name: self.name.clone(),
            inputs,
            input_directory: self.input_directory.clone(),
            output_directory: self.output_directory.clone(),
            tmp_directory: self.tmp_directory.clone(),
        }
    }

    /// Serialize for the provenance store.
    pub fn save(&self) -> Value {
        let inputs: serde_json::Map<String, Value> = self
            .inputs
            .iter()
            .map(|(name, token)| (name.clone(), token.save()))
            .collect();
        json!({
            "name": self.name,
            "inputs": inputs,
            "input_directory": self.input_directory,
            "output_directory": self.output_directory,
            "tmp_directory": self.tmp_directory,
        })
    }

    /// The three working directories, in input/output/tmp order.
    pub fn directories(&self) -> [&str; 3] {
        [
            &self.input_directory,
            &self.output_directory,
            &self.tmp_directory,
        ]
    }
}

// ---------------------------------------------------------------------------
// CommandOutput
// ---------------------------------------------------------------------------

/// Result of executing a command on a job.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub value: Value,
    pub status: Status,
}

impl CommandOutput {
    pub fn new(value: Value, status: Status) -> Self {
        Self { value, status }
    }

    pub fn completed(value: Value) -> Self {
        Self::new(value, Status::Completed)
    }

    /// The default output a job starts from: no value, failed.
    pub fn failed() -> Self {
        Self::new(Value::Null, Status::Failed)
    }
}

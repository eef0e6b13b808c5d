#[macro_use]
mod log_macros;

pub mod context;
pub mod driver;
pub mod error;
pub mod steps;
pub mod tracing_init;
pub mod workflow;

pub use context::{
    Command, Connector, Database, DeploymentConfig, DeploymentManager, FailureManager, Hardware,
    HardwareRequirement, Location, MemoryDatabase, PathFlavor, RunContext, Scheduler, Target,
};
pub use driver::wait_for_signal;
pub use error::{RuntimeError, RuntimeReason, RuntimeResult, StepError, StepResult};
pub use workflow::{PortId, RunReport, StepCtx, Workflow};

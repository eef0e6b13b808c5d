pub mod combinator;
pub mod error;
pub mod job;
pub mod port;
pub mod status;
pub mod tag;
pub mod token;

pub use error::{CoreError, CoreReason, CoreResult};
pub use job::{CommandOutput, Job};
pub use port::Port;
pub use status::{Status, fold_statuses};
pub use tag::Tag;
pub use token::{Token, TokenMap, derived_tag, has_iteration_termination, has_termination};

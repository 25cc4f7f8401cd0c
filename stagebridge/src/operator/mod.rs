//! The execution operator and the capabilities a host drives it through.

mod executable;
mod handle;
mod lifecycle;
mod spec;


pub use executable::ExecutionOperator;
pub use lifecycle::{CheckpointReceipt, Checkpointable, ElementConsumer, Lifecycle};
pub use spec::OperatorSpec;

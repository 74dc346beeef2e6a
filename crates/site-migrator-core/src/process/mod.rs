//! External command execution.
//!
//! Every external tool invocation is described by a `CommandSpec`, executed
//! by a `CommandRunner`, and gated by an `Effector` that knows whether the
//! run is real or a dry run.

mod command;
mod effector;
mod runner;

pub use command::{
    container_name, CommandFailure, CommandKind, CommandOutput, CommandResult, CommandSpec,
};
pub use effector::{effector_for, Effect, Effector, NoOpEffector, RealEffector};
pub use runner::{CommandRunner, ProcessRunner};

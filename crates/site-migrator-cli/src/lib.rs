//! Site Migrator CLI - argument model, confirmation prompt and report
//! rendering for the `site-migrate` binary.

pub mod cli;
pub mod output;
pub mod prompt;

pub use cli::{Cli, Command};
pub use prompt::PromptGate;

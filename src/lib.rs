//! TaskRelay: task intake and CLI for the iterative action agent.

pub mod cli;
pub mod config;
pub mod intake;
pub mod scripted;

pub use config::Config;
pub use intake::{IntakeError, SubmitOutcome, TaskIntake};
pub use scripted::ScenarioFile;

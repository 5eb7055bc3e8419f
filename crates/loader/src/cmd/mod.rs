//! Loader subcommands

pub mod queue;
pub mod run;

//! CLI module graph.

pub mod check;
pub mod command;
pub mod run;
pub mod status;

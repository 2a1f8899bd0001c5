//! Runtime glue: configuration, collaborator traits, telemetry, and the
//! trigger-driven runner.

pub mod collaborators;
pub mod config;
pub mod runner;
pub mod telemetry;

//! Infrastructure layer: retry engine, write-target client, configuration.

/// Configuration loading and representation.
pub mod config;

/// Client for the external write target.
pub mod gateway;

pub mod jobs;

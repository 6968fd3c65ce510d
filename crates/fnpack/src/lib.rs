//! Builds self-contained serverless function bundles from a shared Python
//! source tree.

pub mod code_generator;
pub mod config;
pub mod error;
pub mod import_handling;
pub mod issues;
pub mod manifest;
pub mod markers;
pub mod module_registry;
pub mod orchestrator;
pub mod report;
pub mod stdlib_detection;
pub mod sync;
pub mod types;
pub mod util;
pub mod validation;
pub mod visitors;

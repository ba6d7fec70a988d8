//! Configuration loading and validation.

pub mod execution;
pub mod llm;
pub mod logging;
pub mod portfolio;
pub mod settings;
pub mod strategy;

pub use settings::Config;

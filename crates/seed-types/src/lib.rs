//! Shared types, errors, and the deep-merge primitive for the seeding engine.
//!
//! This crate provides the foundational types used across all other seed crates:
//! - `SeedError`: unified error taxonomy
//! - `JobSpecification` / `PipelineDefinition`: declarative job configuration
//! - `PipelineContext`: read-only facts about the pipeline being seeded
//! - `PolicyFragment` / `PolicySet`: externally injected configuration
//! - `Resource` / `SeedResult`: what seeding hands to the persistence layer

pub mod context;
pub mod fragment;
pub mod job;
pub mod merge;
pub mod resource;

pub use context::{PipelineContext, PipelineSource, ProjectRef, UserRef};
pub use fragment::{DastProfileCatalog, FragmentTarget, PolicyFragment, PolicySet};
pub use job::{
    JobSpecification, Need, PipelineDefinition, PolicyClauseSpec, PolicySpec, RuleSpec, When,
    DEFAULT_STAGES,
};
pub use merge::{deep_merge, deep_merge_maps, dig, is_present};
pub use resource::{
    BridgeDescriptor, BridgeTarget, BuildDescriptor, ResolvedAttributes, Resource, SeedOutcome,
    SeedResult,
};

/// Ordered attribute map. Key order follows insertion (`preserve_order`).
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Unified error type for all seed subsystems.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Invalid configuration for job '{job}': {message}")]
    Config { job: String, message: String },

    #[error("Expression parse error at offset {offset} in '{expression}': {message}")]
    ExpressionParse {
        expression: String,
        offset: usize,
        message: String,
    },

    #[error("Expression evaluation failed for '{expression}': {message}")]
    ExpressionEval { expression: String, message: String },

    #[error("Pipeline validation failed: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl SeedError {
    /// Shorthand for a job-scoped configuration error.
    pub fn config(job: impl Into<String>, message: impl Into<String>) -> Self {
        SeedError::Config {
            job: job.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for errors that originate in user-authored configuration
    /// rather than in the environment (files, encoding).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SeedError::Config { .. }
                | SeedError::ExpressionParse { .. }
                | SeedError::Validation(_)
        )
    }
}

/// A convenience alias for `Result<T, SeedError>`.
pub type Result<T> = std::result::Result<T, SeedError>;

//! Seeding engine: decides whether each CI job belongs to a pipeline, resolves
//! its final attributes, and classifies it as a build or a bridge.
//!
//! The flow for one job:
//! 1. [`InclusionPolicy`]: `only` / `except` clauses or `rules`
//! 2. [`attributes`]: declared, rule, and pipeline-derived attributes
//! 3. augmenters: policy fragments, DAST profiles, `needs` checks
//! 4. [`classify()`]: Bridge or Build
//!
//! [`SeedBuild`] ties these together with compute-once caching and
//! [`Seeder`] drives a whole [`seed_types::PipelineDefinition`].

pub mod attributes;
pub mod augment;
pub mod classify;
pub mod injection;
pub mod paths;
pub mod policy;
pub mod refs;
pub mod rules;
pub mod scope;
pub mod seed;
pub mod seeder;
pub mod validation;

pub use augment::{
    AttributeAugmenter, DastProfileAugmenter, ErrorAugmenter, NeedsCheck, PolicyFragmentAugmenter,
};
pub use classify::{bridge_target, classify, is_bridge};
pub use injection::inject_policy_jobs;
pub use policy::{Clause, EvaluationInput, InclusionPolicy, PolicyDecision, Predicate};
pub use refs::RefPattern;
pub use rules::{RuleOutcome, RuleSet};
pub use scope::VariableScope;
pub use seed::{SeedBuild, SeedState};
pub use seeder::{SeedConfig, Seeder};
pub use validation::{validate, validate_or_raise, Diagnostic, LintRule, Severity};

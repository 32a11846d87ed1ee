//! Per-job seeding state.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use seed_types::{
    JobSpecification, PipelineContext, ResolvedAttributes, Resource, SeedOutcome, SeedResult,
};

use crate::attributes::base_attributes;
use crate::augment::{AttributeAugmenter, ErrorAugmenter};
use crate::classify::classify;
use crate::policy::{EvaluationInput, InclusionPolicy, PolicyDecision};
use crate::scope::VariableScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedState {
    /// Inclusion has not been computed yet.
    Unevaluated,
    Included,
    Excluded,
}

/// Seeding of one job within one pipeline.
///
/// Every derived value (inclusion, attributes, resource, errors) is computed
/// at most once and cached for the lifetime of the build. The build is
/// `Send + Sync`, so independent jobs may be evaluated on separate threads.
pub struct SeedBuild<'a> {
    job: &'a JobSpecification,
    context: &'a PipelineContext,
    policy: InclusionPolicy,
    attribute_augmenters: &'a [Box<dyn AttributeAugmenter>],
    error_augmenters: &'a [Box<dyn ErrorAugmenter>],
    exists_limit: usize,
    previous_jobs: Option<BTreeSet<String>>,
    scope: OnceLock<VariableScope>,
    decision: OnceLock<PolicyDecision>,
    attributes: OnceLock<ResolvedAttributes>,
    resource: OnceLock<Resource>,
    errors: OnceLock<Vec<String>>,
}

impl<'a> SeedBuild<'a> {
    pub(crate) fn new(
        job: &'a JobSpecification,
        context: &'a PipelineContext,
        policy: InclusionPolicy,
        attribute_augmenters: &'a [Box<dyn AttributeAugmenter>],
        error_augmenters: &'a [Box<dyn ErrorAugmenter>],
        exists_limit: usize,
    ) -> Self {
        Self {
            job,
            context,
            policy,
            attribute_augmenters,
            error_augmenters,
            exists_limit,
            previous_jobs: None,
            scope: OnceLock::new(),
            decision: OnceLock::new(),
            attributes: OnceLock::new(),
            resource: OnceLock::new(),
            errors: OnceLock::new(),
        }
    }

    /// Names of jobs included in earlier stages, enabling the `needs` check.
    pub fn with_previous_jobs(mut self, previous_jobs: BTreeSet<String>) -> Self {
        self.previous_jobs = Some(previous_jobs);
        self
    }

    pub fn job(&self) -> &JobSpecification {
        self.job
    }

    pub fn name(&self) -> &str {
        &self.job.name
    }

    fn scope(&self) -> &VariableScope {
        self.scope
            .get_or_init(|| VariableScope::for_job(self.job, self.context))
    }

    fn decision(&self) -> &PolicyDecision {
        self.decision.get_or_init(|| {
            let input = EvaluationInput {
                job: &self.job.name,
                context: self.context,
                scope: self.scope(),
                exists_limit: self.exists_limit,
            };
            let decision = self.policy.evaluate(&input, self.job.when);
            tracing::debug!(
                job = %self.job.name,
                included = decision.included,
                rule = ?decision.matched_rule,
                "Inclusion evaluated"
            );
            decision
        })
    }

    pub fn included(&self) -> bool {
        self.decision().included
    }

    pub fn state(&self) -> SeedState {
        match self.decision.get() {
            None => SeedState::Unevaluated,
            Some(d) if d.included => SeedState::Included,
            Some(_) => SeedState::Excluded,
        }
    }

    /// Final attributes: base resolution followed by every attribute
    /// augmenter in order. Augmenter errors are collected, never raised.
    pub fn resolved_attributes(&self) -> &ResolvedAttributes {
        self.attributes.get_or_init(|| {
            let decision = self.decision();
            let matched_rule = match (self.policy.rules(), decision.matched_rule, decision.when) {
                (Some(rules), Some(index), Some(when)) => {
                    rules.rule(index).map(|rule| (rule.spec(), when))
                }
                _ => None,
            };
            let mut attributes = base_attributes(self.job, self.context, matched_rule);
            let mut errors = Vec::new();
            for augmenter in self.attribute_augmenters {
                let found = augmenter.augment(self.job, self.context, &mut attributes);
                if !found.is_empty() {
                    tracing::debug!(
                        job = %self.job.name,
                        augmenter = augmenter.name(),
                        errors = found.len(),
                        "Augmenter reported errors"
                    );
                }
                errors.extend(found);
            }
            ResolvedAttributes { attributes, errors }
        })
    }

    /// The classified resource.
    ///
    /// # Panics
    ///
    /// When the job is not included. Check [`SeedBuild::included`] first.
    pub fn to_resource(&self) -> &Resource {
        assert!(
            self.included(),
            "to_resource() called for excluded job '{}'",
            self.job.name
        );
        self.resource.get_or_init(|| {
            classify(
                &self.job.name,
                &self.job.stage,
                &self.resolved_attributes().attributes,
            )
        })
    }

    /// Ordered error messages.
    ///
    /// A job excluded because its rules failed to evaluate reports those
    /// failures. Any other excluded job reports nothing. An included job
    /// reports error augmenter output followed by attribute augmenter errors.
    pub fn errors(&self) -> &[String] {
        self.errors.get_or_init(|| {
            let decision = self.decision();
            if !decision.errors.is_empty() {
                return decision.errors.clone();
            }
            if !decision.included {
                return Vec::new();
            }
            let resolved = self.resolved_attributes();
            let mut errors = Vec::new();
            for augmenter in self.error_augmenters {
                errors.extend(augmenter.errors(
                    self.job,
                    &resolved.attributes,
                    self.previous_jobs.as_ref(),
                ));
            }
            errors.extend(resolved.errors.iter().cloned());
            errors
        })
    }

    /// Collapse into the value handed to the persistence layer.
    pub fn into_result(self) -> SeedResult {
        let outcome = if self.included() {
            SeedOutcome::Included(self.to_resource().clone())
        } else {
            SeedOutcome::Excluded
        };
        SeedResult {
            name: self.job.name.clone(),
            outcome,
            errors: self.errors().to_vec(),
        }
    }
}

impl std::fmt::Debug for SeedBuild<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedBuild")
            .field("job", &self.job.name)
            .field("state", &self.state())
            .finish()
    }
}

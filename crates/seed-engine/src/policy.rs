//! Inclusion policies: `only` / `except` clauses and `rules`.
//!
//! A job's policy is compiled once from its [`JobSpecification`] and then
//! evaluated against a [`PipelineContext`]. Evaluation is pure.
//!
//! - `only` passes when any clause is satisfied, or when there are no clauses.
//!   Inside a clause every present predicate kind must hold, and a kind holds
//!   when any of its patterns matches.
//! - `except` excludes the job when any clause matches. Inside a clause any
//!   satisfied predicate kind is a match.
//! - `except` is not consulted once `only` has failed.
//! - `rules` replace both; see [`crate::rules`].

use seed_expr::Statement;
use seed_types::{
    JobSpecification, PipelineContext, PolicyClauseSpec, PolicySpec, Result, SeedError, When,
};

use crate::paths::PathGlobs;
use crate::refs::RefPattern;
use crate::rules::{RuleOutcome, RuleSet};
use crate::scope::VariableScope;

/// Everything a predicate may look at.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub job: &'a str,
    pub context: &'a PipelineContext,
    pub scope: &'a VariableScope,
    pub exists_limit: usize,
}

// ---------------------------------------------------------------------------
// Predicates and clauses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Predicate {
    Refs(Vec<RefPattern>),
    /// `kubernetes: active`
    KubernetesActive,
    Variables(Vec<Statement>),
    Changes(PathGlobs),
}

impl Predicate {
    pub fn is_satisfied(&self, input: &EvaluationInput<'_>) -> bool {
        match self {
            Predicate::Refs(patterns) => patterns.iter().any(|p| p.matches(input.context)),
            Predicate::KubernetesActive => input.context.kubernetes_active,
            Predicate::Variables(statements) => statements.iter().any(|statement| {
                match statement.truthful(&input.scope.resolver()) {
                    Ok(value) => value,
                    Err(err) => {
                        tracing::debug!(job = %input.job, error = %err, "Variables expression failed, treating as false");
                        false
                    }
                }
            }),
            Predicate::Changes(globs) => {
                globs.matches_changes(input.context.modified_paths.as_deref())
            }
        }
    }
}

/// One compiled `only` / `except` clause.
#[derive(Debug, Clone, Default)]
pub struct Clause {
    predicates: Vec<Predicate>,
}

impl Clause {
    pub fn compile(job: &str, spec: &PolicyClauseSpec) -> Result<Self> {
        let mut predicates = Vec::new();
        if let Some(refs) = &spec.refs {
            let patterns = refs
                .iter()
                .map(|r| RefPattern::parse(job, r))
                .collect::<Result<Vec<_>>>()?;
            predicates.push(Predicate::Refs(patterns));
        }
        if let Some(kind) = &spec.kubernetes {
            if kind != "active" {
                return Err(SeedError::config(
                    job,
                    format!("kubernetes policy must be 'active', got '{kind}'"),
                ));
            }
            predicates.push(Predicate::KubernetesActive);
        }
        if let Some(variables) = &spec.variables {
            let statements = variables
                .iter()
                .map(|v| Statement::parse(v))
                .collect::<Result<Vec<_>>>()?;
            predicates.push(Predicate::Variables(statements));
        }
        if let Some(changes) = &spec.changes {
            predicates.push(Predicate::Changes(PathGlobs::compile(job, changes)?));
        }
        Ok(Self { predicates })
    }

    fn satisfies_only(&self, input: &EvaluationInput<'_>) -> bool {
        self.predicates.iter().all(|p| p.is_satisfied(input))
    }

    fn matches_except(&self, input: &EvaluationInput<'_>) -> bool {
        self.predicates.iter().any(|p| p.is_satisfied(input))
    }
}

fn compile_clauses(job: &str, spec: Option<&PolicySpec>) -> Result<Vec<Clause>> {
    spec.map(PolicySpec::clauses)
        .unwrap_or_default()
        .iter()
        .map(|clause| Clause::compile(job, clause))
        .collect()
}

// ---------------------------------------------------------------------------
// InclusionPolicy
// ---------------------------------------------------------------------------

/// The compiled inclusion policy of one job.
#[derive(Debug, Clone)]
pub enum InclusionPolicy {
    OnlyExcept { only: Vec<Clause>, except: Vec<Clause> },
    Rules(RuleSet),
}

/// Outcome of evaluating an [`InclusionPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub included: bool,
    /// Index of the matched rule, when the job uses `rules`.
    pub matched_rule: Option<usize>,
    /// Effective `when` decided by a matched rule.
    pub when: Option<When>,
    pub errors: Vec<String>,
}

impl PolicyDecision {
    fn plain(included: bool) -> Self {
        Self {
            included,
            matched_rule: None,
            when: None,
            errors: Vec::new(),
        }
    }
}

impl InclusionPolicy {
    /// Compile the job's `only` / `except` / `rules`. Malformed patterns,
    /// expressions and globs, and mixing `rules` with `only` / `except`, are
    /// configuration errors.
    pub fn compile(job: &JobSpecification) -> Result<Self> {
        if let Some(rules) = &job.rules {
            if job.uses_only_except() {
                return Err(SeedError::config(
                    &job.name,
                    "rules cannot be used together with only or except",
                ));
            }
            return Ok(InclusionPolicy::Rules(RuleSet::compile(&job.name, rules)?));
        }
        Ok(InclusionPolicy::OnlyExcept {
            only: compile_clauses(&job.name, job.only.as_ref())?,
            except: compile_clauses(&job.name, job.except.as_ref())?,
        })
    }

    pub fn uses_rules(&self) -> bool {
        matches!(self, InclusionPolicy::Rules(_))
    }

    pub fn rules(&self) -> Option<&RuleSet> {
        match self {
            InclusionPolicy::Rules(rules) => Some(rules),
            InclusionPolicy::OnlyExcept { .. } => None,
        }
    }

    pub fn evaluate(&self, input: &EvaluationInput<'_>, job_when: When) -> PolicyDecision {
        match self {
            InclusionPolicy::OnlyExcept { only, except } => {
                let only_ok = only.is_empty() || only.iter().any(|c| c.satisfies_only(input));
                if !only_ok {
                    return PolicyDecision::plain(false);
                }
                let excepted = except.iter().any(|c| c.matches_except(input));
                PolicyDecision::plain(!excepted)
            }
            InclusionPolicy::Rules(rules) => match rules.evaluate(input, job_when) {
                RuleOutcome::Matched { index, when } => PolicyDecision {
                    included: when != When::Never,
                    matched_rule: Some(index),
                    when: Some(when),
                    errors: Vec::new(),
                },
                RuleOutcome::NoMatch => PolicyDecision::plain(false),
                RuleOutcome::Failed(message) => PolicyDecision {
                    errors: vec![message],
                    ..PolicyDecision::plain(false)
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(value: serde_json::Value) -> JobSpecification {
        serde_json::from_value(value).unwrap()
    }

    fn included(job: &JobSpecification, context: &PipelineContext) -> bool {
        decide(job, context).included
    }

    fn decide(job: &JobSpecification, context: &PipelineContext) -> PolicyDecision {
        let policy = InclusionPolicy::compile(job).unwrap();
        let scope = VariableScope::for_job(job, context);
        let input = EvaluationInput {
            job: &job.name,
            context,
            scope: &scope,
            exists_limit: 10_000,
        };
        policy.evaluate(&input, job.when)
    }

    fn main_branch() -> PipelineContext {
        PipelineContext::for_ref("group/app", "main")
    }

    #[test]
    fn no_policy_is_included() {
        assert!(included(&job(json!({"name": "a"})), &main_branch()));
    }

    #[test]
    fn only_refs_any_pattern() {
        let j = job(json!({"name": "a", "only": ["tags", "main"]}));
        assert!(included(&j, &main_branch()));
        assert!(!included(&j, &PipelineContext::for_ref("group/app", "feature")));
    }

    #[test]
    fn only_clause_requires_every_kind() {
        let j = job(json!({"name": "a", "only": {"refs": ["main"], "variables": ["$DEPLOY"]}}));
        let mut ctx = main_branch();
        assert!(!included(&j, &ctx));
        ctx.variables.insert("DEPLOY".into(), "1".into());
        assert!(included(&j, &ctx));
    }

    #[test]
    fn only_clause_list_is_any_of() {
        let j = job(json!({"name": "a", "only": [{"refs": ["tags"]}, {"kubernetes": "active"}]}));
        let mut ctx = main_branch();
        assert!(!included(&j, &ctx));
        ctx.kubernetes_active = true;
        assert!(included(&j, &ctx));
    }

    #[test]
    fn except_wins_over_only() {
        let j = job(json!({"name": "a", "only": ["branches"], "except": ["main"]}));
        assert!(!included(&j, &main_branch()));
        assert!(included(&j, &PipelineContext::for_ref("group/app", "feature")));
    }

    #[test]
    fn except_clause_matches_on_any_kind() {
        let j = job(json!({"name": "a", "except": {"refs": ["tags"], "changes": ["docs/**/*"]}}));
        let mut ctx = main_branch();
        ctx.modified_paths = Some(vec!["src/lib.rs".into()]);
        assert!(included(&j, &ctx));
        ctx.modified_paths = Some(vec!["docs/index.md".into()]);
        assert!(!included(&j, &ctx));
    }

    #[test]
    fn changes_unknown_paths_match() {
        let j = job(json!({"name": "a", "only": {"changes": ["src/**/*"]}}));
        assert!(included(&j, &main_branch()));
        let mut ctx = main_branch();
        ctx.modified_paths = Some(vec!["README.md".into()]);
        assert!(!included(&j, &ctx));
    }

    #[test]
    fn variables_runtime_error_counts_as_false() {
        let j = job(json!({"name": "a", "only": {"variables": ["$CI_COMMIT_BRANCH =~ $NOT_A_PATTERN"]}}));
        let mut ctx = main_branch();
        ctx.variables.insert("NOT_A_PATTERN".into(), "main".into());
        let decision = decide(&j, &ctx);
        assert!(!decision.included);
        assert!(decision.errors.is_empty());
    }

    #[test]
    fn rules_never_excludes() {
        let j = job(json!({"name": "a", "rules": [
            {"if": "$CI_COMMIT_BRANCH == 'main'", "when": "never"},
            {"when": "on_success"}
        ]}));
        let decision = decide(&j, &main_branch());
        assert!(!decision.included);
        assert_eq!(decision.matched_rule, Some(0));
        assert!(included(&j, &PipelineContext::for_ref("group/app", "feature")));
    }

    #[test]
    fn rules_without_match_exclude() {
        let j = job(json!({"name": "a", "rules": [{"if": "$CI_COMMIT_TAG"}]}));
        assert!(!included(&j, &main_branch()));
    }

    #[test]
    fn rules_default_to_job_when() {
        let j = job(json!({"name": "a", "when": "manual", "rules": [{"if": "$CI_COMMIT_BRANCH"}]}));
        let decision = decide(&j, &main_branch());
        assert!(decision.included);
        assert_eq!(decision.when, Some(When::Manual));
    }

    #[test]
    fn rules_runtime_error_excludes_and_reports() {
        let j = job(json!({"name": "lint", "rules": [{"if": "$CI_COMMIT_BRANCH =~ $CI_PROJECT_PATH"}]}));
        let decision = decide(&j, &main_branch());
        assert!(!decision.included);
        assert_eq!(decision.errors.len(), 1);
        assert!(decision.errors[0].starts_with("lint: "));
    }

    #[test]
    fn rules_and_only_together_is_config_error() {
        let j = job(json!({"name": "a", "only": ["main"], "rules": [{"when": "always"}]}));
        let err = InclusionPolicy::compile(&j).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn bad_kind_value_is_config_error() {
        let j = job(json!({"name": "a", "only": {"kubernetes": "inactive"}}));
        assert!(InclusionPolicy::compile(&j).is_err());
    }

    #[test]
    fn bad_expression_is_config_error() {
        let j = job(json!({"name": "a", "except": {"variables": ["$A == "]}}));
        assert!(InclusionPolicy::compile(&j).unwrap_err().is_configuration());
    }
}

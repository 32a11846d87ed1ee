//! `rules:` evaluation: the first rule whose clauses all hold decides.

use seed_expr::Statement;
use seed_types::{Result, RuleSpec, When};

use crate::paths::PathGlobs;
use crate::policy::EvaluationInput;

/// One compiled rule. A rule with no clauses always matches.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    spec: RuleSpec,
    if_expr: Option<Statement>,
    changes: Option<PathGlobs>,
    exists: Option<PathGlobs>,
}

impl CompiledRule {
    pub fn compile(job: &str, spec: &RuleSpec) -> Result<Self> {
        let if_expr = spec.if_expr.as_deref().map(Statement::parse).transpose()?;
        let changes = spec
            .changes
            .as_deref()
            .map(|globs| PathGlobs::compile(job, globs))
            .transpose()?;
        let exists = spec
            .exists
            .as_deref()
            .map(|globs| PathGlobs::compile(job, globs))
            .transpose()?;
        Ok(Self {
            spec: spec.clone(),
            if_expr,
            changes,
            exists,
        })
    }

    pub fn spec(&self) -> &RuleSpec {
        &self.spec
    }

    fn matches(&self, input: &EvaluationInput<'_>) -> Result<bool> {
        if let Some(statement) = &self.if_expr {
            if !statement.truthful(&input.scope.resolver())? {
                return Ok(false);
            }
        }
        if let Some(globs) = &self.changes {
            if !globs.matches_changes(input.context.modified_paths.as_deref()) {
                return Ok(false);
            }
        }
        if let Some(globs) = &self.exists {
            if !globs.matches_exists(&input.context.repository_files, input.exists_limit) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Result of walking a job's rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Matched { index: usize, when: When },
    NoMatch,
    /// A runtime expression failure; the message is already job-prefixed.
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn compile(job: &str, specs: &[RuleSpec]) -> Result<Self> {
        let rules = specs
            .iter()
            .map(|spec| CompiledRule::compile(job, spec))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn rule(&self, index: usize) -> Option<&CompiledRule> {
        self.rules.get(index)
    }

    /// Walk rules in order. The matched rule's `when` falls back to
    /// `default_when`.
    pub fn evaluate(&self, input: &EvaluationInput<'_>, default_when: When) -> RuleOutcome {
        for (index, rule) in self.rules.iter().enumerate() {
            match rule.matches(input) {
                Ok(true) => {
                    let when = rule.spec.when.unwrap_or(default_when);
                    tracing::debug!(job = %input.job, rule = index, when = when.as_str(), "Rule matched");
                    return RuleOutcome::Matched { index, when };
                }
                Ok(false) => {}
                Err(err) => return RuleOutcome::Failed(format!("{}: {}", input.job, err)),
            }
        }
        RuleOutcome::NoMatch
    }
}

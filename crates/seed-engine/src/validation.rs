//! Pipeline definition lint rules and diagnostics.
//!
//! Call [`validate`] for advisory diagnostics or [`validate_or_raise`] to fail
//! on any `Error`-severity issue.

use std::collections::HashSet;

use seed_expr::Statement;
use seed_types::{JobSpecification, PipelineDefinition, PolicyClauseSpec, Result, SeedError};

use crate::paths::PathGlobs;
use crate::refs::RefPattern;

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub job: Option<String>,
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, definition: &PipelineDefinition) -> Vec<Diagnostic>;
}

fn error(rule: &dyn LintRule, job: &JobSpecification, message: String, fix: &str) -> Diagnostic {
    Diagnostic {
        rule: rule.name().into(),
        severity: Severity::Error,
        message,
        job: Some(job.name.clone()),
        fix: Some(fix.into()),
    }
}

/// Every `only` / `except` clause of a job.
fn clauses(job: &JobSpecification) -> Vec<PolicyClauseSpec> {
    job.only
        .iter()
        .chain(job.except.iter())
        .flat_map(|spec| spec.clauses())
        .collect()
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct StageExistsRule;
impl LintRule for StageExistsRule {
    fn name(&self) -> &str { "stage_exists" }
    fn apply(&self, definition: &PipelineDefinition) -> Vec<Diagnostic> {
        let stages = definition.stage_order();
        definition
            .jobs
            .iter()
            .filter(|j| !stages.contains(&j.stage))
            .map(|j| {
                error(
                    self,
                    j,
                    format!("Job '{}' uses undeclared stage '{}'", j.name, j.stage),
                    "Add the stage to `stages` or move the job to a declared stage",
                )
            })
            .collect()
    }
}

struct DuplicateJobRule;
impl LintRule for DuplicateJobRule {
    fn name(&self) -> &str { "duplicate_job" }
    fn apply(&self, definition: &PipelineDefinition) -> Vec<Diagnostic> {
        let mut seen = HashSet::new();
        definition
            .jobs
            .iter()
            .filter(|j| !seen.insert(j.name.as_str()))
            .map(|j| {
                error(
                    self,
                    j,
                    format!("Job '{}' is defined more than once", j.name),
                    "Rename or remove the duplicate job",
                )
            })
            .collect()
    }
}

struct RulesExclusiveRule;
impl LintRule for RulesExclusiveRule {
    fn name(&self) -> &str { "rules_exclusive" }
    fn apply(&self, definition: &PipelineDefinition) -> Vec<Diagnostic> {
        definition
            .jobs
            .iter()
            .filter(|j| j.uses_rules() && j.uses_only_except())
            .map(|j| {
                error(
                    self,
                    j,
                    format!("Job '{}' combines rules with only/except", j.name),
                    "Use either rules or only/except",
                )
            })
            .collect()
    }
}

struct ExpressionSyntaxRule;
impl LintRule for ExpressionSyntaxRule {
    fn name(&self) -> &str { "expression_syntax" }
    fn apply(&self, definition: &PipelineDefinition) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for job in &definition.jobs {
            let from_clauses = clauses(job).into_iter().flat_map(|c| c.variables.unwrap_or_default());
            let from_rules = job
                .rules
                .iter()
                .flatten()
                .filter_map(|r| r.if_expr.clone());
            for expression in from_clauses.chain(from_rules) {
                if let Err(err) = Statement::parse(&expression) {
                    diags.push(error(
                        self,
                        job,
                        format!("Job '{}': {err}", job.name),
                        "Fix the expression syntax",
                    ));
                }
            }
        }
        diags
    }
}

struct RefPatternRule;
impl LintRule for RefPatternRule {
    fn name(&self) -> &str { "ref_pattern" }
    fn apply(&self, definition: &PipelineDefinition) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for job in &definition.jobs {
            for pattern in clauses(job).into_iter().flat_map(|c| c.refs.unwrap_or_default()) {
                if let Err(err) = RefPattern::parse(&job.name, &pattern) {
                    diags.push(error(self, job, err.to_string(), "Fix the refs regular expression"));
                }
            }
        }
        diags
    }
}

struct GlobSyntaxRule;
impl LintRule for GlobSyntaxRule {
    fn name(&self) -> &str { "glob_syntax" }
    fn apply(&self, definition: &PipelineDefinition) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for job in &definition.jobs {
            let mut lists: Vec<Vec<String>> =
                clauses(job).into_iter().filter_map(|c| c.changes).collect();
            for rule in job.rules.iter().flatten() {
                lists.extend(rule.changes.clone());
                lists.extend(rule.exists.clone());
            }
            for globs in lists {
                if let Err(err) = PathGlobs::compile(&job.name, &globs) {
                    diags.push(error(self, job, err.to_string(), "Fix the glob pattern"));
                }
            }
        }
        diags
    }
}

struct KindValueRule;
impl LintRule for KindValueRule {
    fn name(&self) -> &str { "kind_value" }
    fn apply(&self, definition: &PipelineDefinition) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for job in &definition.jobs {
            for clause in clauses(job) {
                if let Some(kind) = clause.kubernetes.filter(|k| k != "active") {
                    diags.push(error(
                        self,
                        job,
                        format!("Job '{}' has kubernetes policy '{kind}'", job.name),
                        "The only supported value is `active`",
                    ));
                }
            }
        }
        diags
    }
}

struct NeedsSelfRule;
impl LintRule for NeedsSelfRule {
    fn name(&self) -> &str { "needs_self" }
    fn apply(&self, definition: &PipelineDefinition) -> Vec<Diagnostic> {
        definition
            .jobs
            .iter()
            .filter(|j| j.needs.iter().flatten().any(|n| n.name == j.name))
            .map(|j| {
                error(
                    self,
                    j,
                    format!("Job '{}' needs itself", j.name),
                    "Remove the job from its own needs",
                )
            })
            .collect()
    }
}

struct NeedsUnknownRule;
impl LintRule for NeedsUnknownRule {
    fn name(&self) -> &str { "needs_unknown" }
    fn apply(&self, definition: &PipelineDefinition) -> Vec<Diagnostic> {
        let names: HashSet<&str> = definition.jobs.iter().map(|j| j.name.as_str()).collect();
        let mut diags = Vec::new();
        for job in &definition.jobs {
            for need in job.needs.iter().flatten() {
                if !need.optional && !names.contains(need.name.as_str()) {
                    diags.push(Diagnostic {
                        rule: self.name().into(),
                        severity: Severity::Warning,
                        message: format!(
                            "Job '{}' needs '{}' which is not defined",
                            job.name, need.name
                        ),
                        job: Some(job.name.clone()),
                        fix: Some(format!("Define '{}' or mark the need optional", need.name)),
                    });
                }
            }
        }
        diags
    }
}

struct TriggerScriptRule;
impl LintRule for TriggerScriptRule {
    fn name(&self) -> &str { "trigger_script" }
    fn apply(&self, definition: &PipelineDefinition) -> Vec<Diagnostic> {
        definition
            .jobs
            .iter()
            .filter(|j| j.options.contains_key("trigger") && j.options.contains_key("script"))
            .map(|j| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Warning,
                message: format!("Job '{}' has both trigger and script; script is ignored", j.name),
                job: Some(j.name.clone()),
                fix: Some("Remove `script` from the trigger job".into()),
            })
            .collect()
    }
}

struct EmptyStageRule;
impl LintRule for EmptyStageRule {
    fn name(&self) -> &str { "empty_stage" }
    fn apply(&self, definition: &PipelineDefinition) -> Vec<Diagnostic> {
        let used: HashSet<&str> = definition.jobs.iter().map(|j| j.stage.as_str()).collect();
        definition
            .stages
            .iter()
            .filter(|s| *s != ".pre" && *s != ".post" && !used.contains(s.as_str()))
            .map(|s| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Info,
                message: format!("Stage '{s}' has no jobs"),
                job: None,
                fix: None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all built-in lint rules and return diagnostics.
pub fn validate(definition: &PipelineDefinition) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(StageExistsRule),
        Box::new(DuplicateJobRule),
        Box::new(RulesExclusiveRule),
        Box::new(ExpressionSyntaxRule),
        Box::new(RefPatternRule),
        Box::new(GlobSyntaxRule),
        Box::new(KindValueRule),
        Box::new(NeedsSelfRule),
        Box::new(NeedsUnknownRule),
        Box::new(TriggerScriptRule),
        Box::new(EmptyStageRule),
    ];

    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(definition));
    }
    diagnostics
}

/// Run all lint rules; return `Err` if any `Error`-severity diagnostic found.
pub fn validate_or_raise(definition: &PipelineDefinition) -> Result<Vec<Diagnostic>> {
    let diagnostics = validate(definition);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.message.clone())
        .collect();
    if !errors.is_empty() {
        return Err(SeedError::Validation(errors.join("; ")));
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

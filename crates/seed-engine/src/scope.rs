//! Variables visible to `only:variables`, `except:variables` and `rules:if`.

use std::collections::BTreeMap;

use seed_types::{JobSpecification, PipelineContext};

/// Flattened variable scope for one job.
///
/// Layers, later wins: predefined variables (including `CI_JOB_NAME` and
/// `CI_JOB_STAGE`), job variables, pipeline variables. Pipeline variables
/// come from triggers, schedules and manual runs and override the YAML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableScope {
    vars: BTreeMap<String, String>,
}

impl VariableScope {
    pub fn for_job(job: &JobSpecification, context: &PipelineContext) -> Self {
        let mut vars = context.predefined_variables();
        vars.insert("CI_JOB_NAME".to_string(), job.name.clone());
        vars.insert("CI_JOB_STAGE".to_string(), job.stage.clone());
        vars.extend(job.variables.clone());
        vars.extend(context.variables.clone());
        Self { vars }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    /// Resolver closure in the shape expression evaluation expects.
    pub fn resolver(&self) -> impl Fn(&str) -> Option<String> + '_ {
        move |name| self.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_override_in_order() {
        let mut ctx = PipelineContext::for_ref("group/app", "main");
        ctx.variables.insert("DEPLOY".into(), "pipeline".into());
        ctx.variables.insert("CI_COMMIT_BRANCH".into(), "overridden".into());
        let mut job = JobSpecification::new("rspec", "test");
        job.variables.insert("DEPLOY".into(), "job".into());
        job.variables.insert("LEVEL".into(), "job".into());

        let scope = VariableScope::for_job(&job, &ctx);
        assert_eq!(scope.get("DEPLOY").as_deref(), Some("pipeline"));
        assert_eq!(scope.get("LEVEL").as_deref(), Some("job"));
        assert_eq!(scope.get("CI_COMMIT_BRANCH").as_deref(), Some("overridden"));
        assert_eq!(scope.get("CI_JOB_NAME").as_deref(), Some("rspec"));
        assert_eq!(scope.get("CI_JOB_STAGE").as_deref(), Some("test"));
        assert_eq!(scope.get("MISSING"), None);
    }

    #[test]
    fn resolver_reads_scope() {
        let ctx = PipelineContext::for_ref("group/app", "main");
        let scope = VariableScope::for_job(&JobSpecification::new("a", "build"), &ctx);
        let resolve = scope.resolver();
        assert_eq!(resolve("CI_PROJECT_PATH").as_deref(), Some("group/app"));
    }
}

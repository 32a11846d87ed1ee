//! Pipeline-level seeding: configuration, augmenter registration, and the
//! stage-ordered walk over a pipeline definition.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use seed_types::{
    DastProfileCatalog, JobSpecification, PipelineContext, PipelineDefinition, PolicySet, Result,
    SeedError, SeedResult,
};

use crate::augment::{
    AttributeAugmenter, DastProfileAugmenter, ErrorAugmenter, NeedsCheck, PolicyFragmentAugmenter,
};
use crate::policy::InclusionPolicy;
use crate::seed::SeedBuild;

/// Tunable limits for seeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Maximum entries in a job's `needs`.
    pub max_needs: usize,
    /// Above this many file/glob comparisons `rules:exists` is treated as
    /// satisfied.
    pub exists_comparison_limit: usize,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            max_needs: 50,
            exists_comparison_limit: 10_000,
        }
    }
}

impl SeedConfig {
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config = Self::from_json(&data)?;
        tracing::debug!(path = %path.display(), ?config, "Seed configuration loaded");
        Ok(config)
    }
}

/// Creates [`SeedBuild`]s with a fixed configuration and augmenter chain.
pub struct Seeder {
    config: SeedConfig,
    attribute_augmenters: Vec<Box<dyn AttributeAugmenter>>,
    error_augmenters: Vec<Box<dyn ErrorAugmenter>>,
}

impl Seeder {
    /// A seeder with the `needs` check and no attribute augmenters.
    pub fn new(config: SeedConfig) -> Self {
        Self {
            config,
            attribute_augmenters: Vec::new(),
            error_augmenters: vec![Box::new(NeedsCheck::new(config.max_needs))],
        }
    }

    /// The standard chain: policy fragments, then DAST profile resolution.
    pub fn with_policies(
        config: SeedConfig,
        fragments: PolicySet,
        profiles: DastProfileCatalog,
    ) -> Self {
        let mut seeder = Self::new(config);
        seeder.register_attribute_augmenter(PolicyFragmentAugmenter::new(fragments));
        seeder.register_attribute_augmenter(DastProfileAugmenter::new(profiles));
        seeder
    }

    pub fn register_attribute_augmenter(&mut self, augmenter: impl AttributeAugmenter + 'static) {
        tracing::debug!(augmenter = augmenter.name(), "Registered attribute augmenter");
        self.attribute_augmenters.push(Box::new(augmenter));
    }

    pub fn register_error_augmenter(&mut self, augmenter: impl ErrorAugmenter + 'static) {
        tracing::debug!(augmenter = augmenter.name(), "Registered error augmenter");
        self.error_augmenters.push(Box::new(augmenter));
    }

    pub fn config(&self) -> &SeedConfig {
        &self.config
    }

    pub fn augmenter_names(&self) -> Vec<&str> {
        self.error_augmenters
            .iter()
            .map(|a| a.name())
            .chain(self.attribute_augmenters.iter().map(|a| a.name()))
            .collect()
    }

    /// Compile the job's inclusion policy and return its seed build.
    pub fn seed<'a>(
        &'a self,
        job: &'a JobSpecification,
        context: &'a PipelineContext,
    ) -> Result<SeedBuild<'a>> {
        let policy = InclusionPolicy::compile(job)?;
        Ok(SeedBuild::new(
            job,
            context,
            policy,
            &self.attribute_augmenters,
            &self.error_augmenters,
            self.config.exists_comparison_limit,
        ))
    }

    /// Seed every job in stage order, then declaration order.
    ///
    /// Each job sees the jobs included in earlier stages, so `needs` on a job
    /// that was excluded or lives in the same or a later stage is reported.
    pub fn seed_pipeline(
        &self,
        definition: &PipelineDefinition,
        context: &PipelineContext,
    ) -> Result<Vec<SeedResult>> {
        let stages = definition.stage_order();
        for job in &definition.jobs {
            if !stages.contains(&job.stage) {
                return Err(SeedError::config(
                    &job.name,
                    format!(
                        "chosen stage '{}' does not exist; available stages are {}",
                        job.stage,
                        stages.join(", ")
                    ),
                ));
            }
        }

        let mut previous_jobs = BTreeSet::new();
        let mut results = Vec::with_capacity(definition.jobs.len());
        for stage in &stages {
            let mut included_here = Vec::new();
            for job in definition.jobs.iter().filter(|j| &j.stage == stage) {
                let build = self.seed(job, context)?.with_previous_jobs(previous_jobs.clone());
                let result = build.into_result();
                if result.is_included() {
                    included_here.push(result.name.clone());
                }
                results.push(result);
            }
            previous_jobs.extend(included_here);
        }

        let included = results.iter().filter(|r| r.is_included()).count();
        let with_errors = results.iter().filter(|r| r.has_errors()).count();
        tracing::info!(
            ref_name = %context.ref_name,
            jobs = results.len(),
            included,
            with_errors,
            "Pipeline seeded"
        );
        Ok(results)
    }
}

impl Default for Seeder {
    fn default() -> Self {
        Self::new(SeedConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(value: serde_json::Value) -> PipelineDefinition {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn config_defaults_and_partial_json() {
        let config = SeedConfig::default();
        assert_eq!(config.max_needs, 50);
        assert_eq!(config.exists_comparison_limit, 10_000);
        let config = SeedConfig::from_json(r#"{"max_needs": 5}"#).unwrap();
        assert_eq!(config.max_needs, 5);
        assert_eq!(config.exists_comparison_limit, 10_000);
    }

    #[test]
    fn config_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(&path, r#"{"exists_comparison_limit": 10}"#).unwrap();
        let config = SeedConfig::load(&path).unwrap();
        assert_eq!(config.exists_comparison_limit, 10);
    }

    #[test]
    fn default_augmenter_order() {
        let seeder = Seeder::with_policies(
            SeedConfig::default(),
            PolicySet::default(),
            DastProfileCatalog::default(),
        );
        assert_eq!(
            seeder.augmenter_names(),
            vec!["needs", "policy_fragments", "dast_profiles"]
        );
    }

    #[test]
    fn seed_reports_config_errors() {
        let job: JobSpecification = serde_json::from_value(json!({
            "name": "bad", "only": {"refs": ["/(unclosed/"]}
        }))
        .unwrap();
        let ctx = PipelineContext::for_ref("g/p", "main");
        let err = Seeder::default().seed(&job, &ctx).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn seed_pipeline_orders_by_stage() {
        let def = definition(json!({
            "stages": ["build", "test", "deploy"],
            "jobs": [
                {"name": "deploy", "stage": "deploy", "needs": ["rspec"]},
                {"name": "rspec", "stage": "test", "needs": ["compile"]},
                {"name": "compile", "stage": "build"}
            ]
        }));
        let ctx = PipelineContext::for_ref("g/p", "main");
        let results = Seeder::default().seed_pipeline(&def, &ctx).unwrap();
        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["compile", "rspec", "deploy"]);
        assert!(results.iter().all(|r| r.is_included() && !r.has_errors()));
    }

    #[test]
    fn seed_pipeline_flags_needs_on_excluded_or_later_jobs() {
        let def = definition(json!({
            "stages": ["build", "test"],
            "jobs": [
                {"name": "compile", "stage": "build", "only": ["tags"]},
                {"name": "rspec", "stage": "test", "needs": ["compile"]},
                {"name": "lint", "stage": "build", "needs": ["rspec"]}
            ]
        }));
        let ctx = PipelineContext::for_ref("g/p", "main");
        let results = Seeder::default().seed_pipeline(&def, &ctx).unwrap();
        let by_name = |name: &str| results.iter().find(|r| r.name == name).unwrap();
        assert!(!by_name("compile").is_included());
        assert_eq!(
            by_name("rspec").errors,
            vec!["'rspec' job needs 'compile' job, but 'compile' is not in any previous stage"]
        );
        assert_eq!(
            by_name("lint").errors,
            vec!["'lint' job needs 'rspec' job, but 'rspec' is not in any previous stage"]
        );
    }

    struct RequireTimeout;

    impl ErrorAugmenter for RequireTimeout {
        fn name(&self) -> &str {
            "require_timeout"
        }

        fn errors(
            &self,
            job: &JobSpecification,
            attributes: &seed_types::Attributes,
            _previous_jobs: Option<&BTreeSet<String>>,
        ) -> Vec<String> {
            let has_timeout = attributes
                .get("options")
                .and_then(|options| options.get("timeout"))
                .is_some();
            if has_timeout {
                Vec::new()
            } else {
                vec![format!("{}: timeout is required", job.name)]
            }
        }
    }

    #[test]
    fn registered_error_augmenters_run_in_order() {
        let mut seeder = Seeder::with_policies(
            SeedConfig { max_needs: 1, ..SeedConfig::default() },
            PolicySet::new(vec![
                seed_types::PolicyFragment::for_job("deploy", json!({})).with_error("fragment failed"),
            ]),
            DastProfileCatalog::default(),
        );
        seeder.register_error_augmenter(RequireTimeout);
        assert_eq!(seeder.config().max_needs, 1);
        assert_eq!(
            seeder.augmenter_names(),
            vec!["needs", "require_timeout", "policy_fragments", "dast_profiles"]
        );

        let job: JobSpecification = serde_json::from_value(json!({
            "name": "deploy", "needs": ["build", "test"]
        }))
        .unwrap();
        let ctx = PipelineContext::for_ref("g/p", "main");
        let seed = seeder.seed(&job, &ctx).unwrap();
        assert_eq!(seed.job().name, "deploy");
        assert_eq!(
            seed.errors(),
            &[
                "deploy: one job can only need 1 others, but you have listed 2. See needs keyword documentation for more details".to_string(),
                "deploy: timeout is required".to_string(),
                "fragment failed".to_string(),
            ]
        );

        let mut timed = job.clone();
        timed.options.insert("timeout".into(), json!("1h"));
        timed.needs = None;
        let seed = seeder.seed(&timed, &ctx).unwrap();
        assert_eq!(seed.errors(), &["fragment failed".to_string()]);
    }

    #[test]
    fn seed_pipeline_rejects_unknown_stage() {
        let def = definition(json!({"stages": ["build"], "jobs": [{"name": "a", "stage": "qa"}]}));
        let ctx = PipelineContext::for_ref("g/p", "main");
        let err = Seeder::default().seed_pipeline(&def, &ctx).unwrap_err();
        assert!(err.to_string().contains("qa"));
    }
}

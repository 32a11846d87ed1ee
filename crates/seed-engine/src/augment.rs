//! Augmenters: ordered strategies applied after base attribute resolution.
//!
//! [`AttributeAugmenter`]s mutate the resolved attribute map and report
//! configuration errors as strings. [`ErrorAugmenter`]s only inspect the job
//! and contribute errors. Both run in registration order.

use std::collections::BTreeSet;

use seed_types::{
    deep_merge_maps, dig, Attributes, DastProfileCatalog, JobSpecification, PipelineContext,
    PolicySet,
};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

pub trait AttributeAugmenter: Send + Sync {
    fn name(&self) -> &str;
    /// Mutate `attributes` in place. Returned strings are appended to the
    /// job's error list; they never abort resolution.
    fn augment(
        &self,
        job: &JobSpecification,
        context: &PipelineContext,
        attributes: &mut Attributes,
    ) -> Vec<String>;
}

pub trait ErrorAugmenter: Send + Sync {
    fn name(&self) -> &str;
    /// `previous_jobs` holds the jobs included in earlier stages when the
    /// caller knows them.
    fn errors(
        &self,
        job: &JobSpecification,
        attributes: &Attributes,
        previous_jobs: Option<&BTreeSet<String>>,
    ) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// Policy fragments
// ---------------------------------------------------------------------------

/// Deep-merges stage-targeted and then job-targeted policy fragments over the
/// resolved attributes. Fragment values win.
#[derive(Debug, Clone, Default)]
pub struct PolicyFragmentAugmenter {
    fragments: PolicySet,
}

impl PolicyFragmentAugmenter {
    pub fn new(fragments: PolicySet) -> Self {
        Self { fragments }
    }
}

impl AttributeAugmenter for PolicyFragmentAugmenter {
    fn name(&self) -> &str {
        "policy_fragments"
    }

    fn augment(
        &self,
        job: &JobSpecification,
        _context: &PipelineContext,
        attributes: &mut Attributes,
    ) -> Vec<String> {
        let mut errors = Vec::new();
        for fragment in self.fragments.fragments_for(&job.name, &job.stage) {
            if let Some(error) = &fragment.error {
                tracing::warn!(
                    job = %job.name,
                    policy = fragment.policy.as_deref().unwrap_or("unknown"),
                    error = %error,
                    "Policy fragment carries an error"
                );
                errors.push(error.clone());
            }
            deep_merge_maps(attributes, fragment.payload.clone());
        }
        errors
    }
}

// ---------------------------------------------------------------------------
// DAST profiles
// ---------------------------------------------------------------------------

/// Resolves `options.dast_configuration.{site,scanner}_profile` names into
/// the materialized profiles.
#[derive(Debug, Clone, Default)]
pub struct DastProfileAugmenter {
    catalog: DastProfileCatalog,
}

impl DastProfileAugmenter {
    pub fn new(catalog: DastProfileCatalog) -> Self {
        Self { catalog }
    }
}

fn profile_name<'a>(attributes: &'a Attributes, key: &str) -> Option<&'a str> {
    let options = attributes.get("options")?;
    dig(options, &["dast_configuration", key])?.as_str()
}

impl AttributeAugmenter for DastProfileAugmenter {
    fn name(&self) -> &str {
        "dast_profiles"
    }

    fn augment(
        &self,
        job: &JobSpecification,
        _context: &PipelineContext,
        attributes: &mut Attributes,
    ) -> Vec<String> {
        let mut errors = Vec::new();
        let lookups = [
            ("site_profile", "dast_site_profile", "site", &self.catalog.site_profiles),
            ("scanner_profile", "dast_scanner_profile", "scanner", &self.catalog.scanner_profiles),
        ];
        for (option_key, attribute_key, label, profiles) in lookups {
            let Some(name) = profile_name(attributes, option_key).map(str::to_string) else {
                continue;
            };
            match profiles.get(&name) {
                Some(profile) => {
                    attributes.insert(attribute_key.to_string(), profile.clone());
                }
                None => {
                    tracing::debug!(job = %job.name, profile = %name, "DAST {label} profile missing");
                    errors.push(format!("DAST {label} profile not found: {name}"));
                }
            }
        }
        errors
    }
}

// ---------------------------------------------------------------------------
// Needs
// ---------------------------------------------------------------------------

/// Checks the number of `needs` and, when previous stages are known, that
/// every required need refers to an earlier included job.
#[derive(Debug, Clone, Copy)]
pub struct NeedsCheck {
    max_needs: usize,
}

impl NeedsCheck {
    pub fn new(max_needs: usize) -> Self {
        Self { max_needs }
    }
}

impl ErrorAugmenter for NeedsCheck {
    fn name(&self) -> &str {
        "needs"
    }

    fn errors(
        &self,
        job: &JobSpecification,
        _attributes: &Attributes,
        previous_jobs: Option<&BTreeSet<String>>,
    ) -> Vec<String> {
        let Some(needs) = job.needs.as_deref() else {
            return Vec::new();
        };
        if needs.len() > self.max_needs {
            return vec![format!(
                "{}: one job can only need {} others, but you have listed {}. See needs keyword documentation for more details",
                job.name,
                self.max_needs,
                needs.len()
            )];
        }
        let Some(previous) = previous_jobs else {
            return Vec::new();
        };
        needs
            .iter()
            .filter(|need| !need.optional && !previous.contains(&need.name))
            .map(|need| {
                format!(
                    "'{}' job needs '{}' job, but '{}' is not in any previous stage",
                    job.name, need.name, need.name
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seed_types::PolicyFragment;
    use serde_json::{json, Value};

    fn ctx() -> PipelineContext {
        PipelineContext::for_ref("group/app", "main")
    }

    fn attrs(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn fragments_merge_stage_then_job() {
        let augmenter = PolicyFragmentAugmenter::new(PolicySet::new(vec![
            PolicyFragment::for_job("scan", json!({"options": {"mode": "job", "job_only": 1}})),
            PolicyFragment::for_stage("dast", json!({"options": {"mode": "stage", "stage_only": 2}})),
        ]));
        let job = JobSpecification::new("scan", "dast");
        let mut a = attrs(json!({"options": {"mode": "declared", "script": ["x"]}}));
        let errors = augmenter.augment(&job, &ctx(), &mut a);
        assert!(errors.is_empty());
        assert_eq!(
            a["options"],
            json!({"mode": "job", "script": ["x"], "stage_only": 2, "job_only": 1})
        );
    }

    #[test]
    fn fragment_error_is_reported_and_payload_still_merged() {
        let augmenter = PolicyFragmentAugmenter::new(PolicySet::new(vec![
            PolicyFragment::for_job("scan", json!({"variables_from_policy": true}))
                .with_error("Site profile could not be built"),
        ]));
        let job = JobSpecification::new("scan", "dast");
        let mut a = Attributes::new();
        let errors = augmenter.augment(&job, &ctx(), &mut a);
        assert_eq!(errors, vec!["Site profile could not be built".to_string()]);
        assert_eq!(a["variables_from_policy"], json!(true));
    }

    #[test]
    fn dast_profiles_resolved() {
        let catalog = DastProfileCatalog::from_json(
            r#"{"site_profiles": {"site-a": {"target_url": "https://example.com"}},
                "scanner_profiles": {"scan-b": {"scan_type": "passive"}}}"#,
        )
        .unwrap();
        let augmenter = DastProfileAugmenter::new(catalog);
        let job = JobSpecification::new("dast", "dast");
        let mut a = attrs(json!({"options": {"dast_configuration": {
            "site_profile": "site-a", "scanner_profile": "scan-b"
        }}}));
        assert!(augmenter.augment(&job, &ctx(), &mut a).is_empty());
        assert_eq!(a["dast_site_profile"]["target_url"], json!("https://example.com"));
        assert_eq!(a["dast_scanner_profile"]["scan_type"], json!("passive"));
    }

    #[test]
    fn missing_dast_profiles_are_errors() {
        let augmenter = DastProfileAugmenter::default();
        let job = JobSpecification::new("dast", "dast");
        let mut a = attrs(json!({"options": {"dast_configuration": {
            "site_profile": "gone", "scanner_profile": "also-gone"
        }}}));
        let errors = augmenter.augment(&job, &ctx(), &mut a);
        assert_eq!(
            errors,
            vec![
                "DAST site profile not found: gone".to_string(),
                "DAST scanner profile not found: also-gone".to_string()
            ]
        );
        assert!(!a.contains_key("dast_site_profile"));
    }

    #[test]
    fn jobs_without_dast_configuration_are_untouched() {
        let augmenter = DastProfileAugmenter::default();
        let mut a = attrs(json!({"options": {"script": ["rspec"]}}));
        let before = a.clone();
        assert!(augmenter
            .augment(&JobSpecification::new("rspec", "test"), &ctx(), &mut a)
            .is_empty());
        assert_eq!(a, before);
    }

    #[test]
    fn too_many_needs() {
        let job: JobSpecification =
            serde_json::from_value(json!({"name": "deploy", "needs": ["a", "b", "c"]})).unwrap();
        let errors = NeedsCheck::new(2).errors(&job, &Attributes::new(), None);
        assert_eq!(
            errors,
            vec!["deploy: one job can only need 2 others, but you have listed 3. See needs keyword documentation for more details".to_string()]
        );
    }

    #[test]
    fn needs_must_be_in_previous_stages() {
        let job: JobSpecification = serde_json::from_value(json!({
            "name": "deploy",
            "needs": ["build", "lint", {"job": "docs", "optional": true}]
        }))
        .unwrap();
        let previous: BTreeSet<String> = ["build".to_string()].into_iter().collect();
        let errors = NeedsCheck::new(50).errors(&job, &Attributes::new(), Some(&previous));
        assert_eq!(
            errors,
            vec!["'deploy' job needs 'lint' job, but 'lint' is not in any previous stage".to_string()]
        );
        assert!(NeedsCheck::new(50)
            .errors(&job, &Attributes::new(), None)
            .is_empty());
    }
}

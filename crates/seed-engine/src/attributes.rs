//! Base attribute resolution: declared attributes, rule attributes, then
//! pipeline-derived fields. Augmenters run on top of the result.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use seed_types::{deep_merge_maps, Attributes, JobSpecification, PipelineContext, RuleSpec, When};

fn yaml_variables(variables: &BTreeMap<String, String>) -> Value {
    Value::Array(
        variables
            .iter()
            .map(|(key, value)| json!({"key": key, "value": value, "public": true}))
            .collect(),
    )
}

/// The job's own attributes, in a stable key order.
pub fn declared_attributes(job: &JobSpecification) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("name".into(), json!(job.name));
    attrs.insert("stage".into(), json!(job.stage));
    attrs.insert("when".into(), json!(job.when.as_str()));
    attrs.insert("allow_failure".into(), json!(job.allow_failure));
    attrs.insert("options".into(), Value::Object(job.options.clone()));
    attrs.insert("yaml_variables".into(), yaml_variables(&job.variables));

    let needs = job.needs.as_deref().unwrap_or_default();
    if !needs.is_empty() {
        let needs_attributes: Vec<Value> = needs
            .iter()
            .map(|n| json!({"name": n.name, "artifacts": n.artifacts, "optional": n.optional}))
            .collect();
        attrs.insert("needs_attributes".into(), Value::Array(needs_attributes));
    }
    let scheduling_type = if needs.is_empty() { "stage" } else { "dag" };
    attrs.insert("scheduling_type".into(), json!(scheduling_type));

    for (key, value) in &job.extra {
        attrs.insert(key.clone(), value.clone());
    }
    attrs
}

/// Attributes contributed by the matched rule. `when` is the effective value
/// already decided by the policy.
pub fn rule_attributes(job: &JobSpecification, rule: &RuleSpec, when: When) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("when".into(), json!(when.as_str()));
    if let Some(allow_failure) = rule.allow_failure {
        attrs.insert("allow_failure".into(), json!(allow_failure));
    }
    if let Some(start_in) = &rule.start_in {
        attrs.insert("options".into(), json!({"start_in": start_in}));
    }
    if !rule.variables.is_empty() {
        let mut variables = job.variables.clone();
        variables.extend(rule.variables.clone());
        attrs.insert("yaml_variables".into(), yaml_variables(&variables));
    }
    attrs
}

/// Declared attributes, then rule attributes (when a rule matched), then the
/// pipeline-derived fields, each layer deep-merged over the previous one.
pub fn base_attributes(
    job: &JobSpecification,
    context: &PipelineContext,
    matched_rule: Option<(&RuleSpec, When)>,
) -> Attributes {
    let mut attrs = declared_attributes(job);
    if let Some((rule, when)) = matched_rule {
        deep_merge_maps(&mut attrs, rule_attributes(job, rule, when));
    }
    deep_merge_maps(&mut attrs, context.pipeline_attributes());
    attrs
}

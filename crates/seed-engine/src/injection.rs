//! Merging security-policy jobs into a project's pipeline definition.

use serde_json::Value;

use seed_types::{deep_merge, Attributes, JobSpecification, PipelineDefinition, Result, SeedError};

/// Deep-merge `policy_jobs` into `definition`.
///
/// Each policy job is a raw job map with a `name`. A job with the same name
/// is merged key by key with the policy's values winning; otherwise the job is
/// appended. Stages used by policy jobs but missing from the definition are
/// inserted before `.post`, or appended when `.post` is not declared.
///
/// On error `definition` is left untouched.
pub fn inject_policy_jobs(
    definition: &mut PipelineDefinition,
    policy_jobs: &[Attributes],
) -> Result<()> {
    let mut staged = definition.clone();
    for raw in policy_jobs {
        merge_policy_job(&mut staged, raw)?;
    }
    *definition = staged;
    Ok(())
}

fn merge_policy_job(definition: &mut PipelineDefinition, raw: &Attributes) -> Result<()> {
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| SeedError::Other("policy job without a name".into()))?
        .to_string();

    let merged = match definition.jobs.iter().position(|j| j.name == name) {
        Some(index) => {
            let mut value = serde_json::to_value(&definition.jobs[index])?;
            deep_merge(&mut value, Value::Object(raw.clone()));
            let job: JobSpecification = serde_json::from_value(value)
                .map_err(|e| SeedError::config(&name, e.to_string()))?;
            tracing::info!(job = %name, "Policy job merged over project job");
            definition.jobs[index] = job;
            &definition.jobs[index]
        }
        None => {
            let job: JobSpecification = serde_json::from_value(Value::Object(raw.clone()))
                .map_err(|e| SeedError::config(&name, e.to_string()))?;
            tracing::info!(job = %name, "Policy job appended");
            definition.jobs.push(job);
            &definition.jobs[definition.jobs.len() - 1]
        }
    };
    let stage = merged.stage.clone();
    insert_stage(&mut definition.stages, &stage);
    Ok(())
}

fn insert_stage(stages: &mut Vec<String>, stage: &str) {
    if stage == ".pre" || stage == ".post" || stages.iter().any(|s| s == stage) {
        return;
    }
    match stages.iter().position(|s| s == ".post") {
        Some(post) => stages.insert(post, stage.to_string()),
        None => stages.push(stage.to_string()),
    }
    tracing::debug!(stage, "Inserted policy stage");
}

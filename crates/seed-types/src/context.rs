//! Read-only facts about the pipeline being seeded.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::Result;

/// What caused the pipeline to be created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineSource {
    #[default]
    Push,
    Web,
    Trigger,
    Schedule,
    Api,
    External,
    Pipeline,
    Chat,
    MergeRequestEvent,
    ExternalPullRequestEvent,
    ParentPipeline,
    OndemandDastScan,
    SecurityOrchestrationPolicy,
}

impl PipelineSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineSource::Push => "push",
            PipelineSource::Web => "web",
            PipelineSource::Trigger => "trigger",
            PipelineSource::Schedule => "schedule",
            PipelineSource::Api => "api",
            PipelineSource::External => "external",
            PipelineSource::Pipeline => "pipeline",
            PipelineSource::Chat => "chat",
            PipelineSource::MergeRequestEvent => "merge_request_event",
            PipelineSource::ExternalPullRequestEvent => "external_pull_request_event",
            PipelineSource::ParentPipeline => "parent_pipeline",
            PipelineSource::OndemandDastScan => "ondemand_dast_scan",
            PipelineSource::SecurityOrchestrationPolicy => "security_orchestration_policy",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    #[serde(default)]
    pub id: u64,
    pub full_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: u64,
    pub username: String,
}

/// Pipeline-level inputs to seeding. Never mutated by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineContext {
    #[serde(default)]
    pub pipeline: Option<u64>,
    #[serde(default)]
    pub project: ProjectRef,
    #[serde(default)]
    pub user: Option<UserRef>,
    /// Legacy trigger request id.
    #[serde(default)]
    pub trigger_request: Option<u64>,
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub tag: bool,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub source: PipelineSource,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// `None` when the set of changed files is unknown (tags, schedules, ...).
    #[serde(default)]
    pub modified_paths: Option<Vec<String>>,
    #[serde(default)]
    pub repository_files: Vec<String>,
    #[serde(default)]
    pub kubernetes_active: bool,
}

impl PipelineContext {
    /// A push pipeline for `ref_name` on the given project.
    pub fn for_ref(project_path: impl Into<String>, ref_name: impl Into<String>) -> Self {
        Self {
            project: ProjectRef {
                id: 0,
                full_path: project_path.into(),
            },
            ref_name: ref_name.into(),
            ..Self::default()
        }
    }

    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Read a pipeline context from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let context = Self::from_json(&data)?;
        tracing::debug!(path = %path.display(), ref_name = %context.ref_name, "Pipeline context loaded");
        Ok(context)
    }

    /// A branch pipeline: neither a tag nor a merge request pipeline.
    pub fn is_branch(&self) -> bool {
        !self.tag && self.source != PipelineSource::MergeRequestEvent
    }

    /// Predefined variables visible to expressions, before pipeline and job
    /// variables are layered on top.
    pub fn predefined_variables(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert("CI_COMMIT_REF_NAME".to_string(), self.ref_name.clone());
        if self.tag {
            vars.insert("CI_COMMIT_TAG".to_string(), self.ref_name.clone());
        } else if self.is_branch() {
            vars.insert("CI_COMMIT_BRANCH".to_string(), self.ref_name.clone());
        }
        vars.insert(
            "CI_COMMIT_REF_PROTECTED".to_string(),
            self.protected.to_string(),
        );
        vars.insert(
            "CI_PIPELINE_SOURCE".to_string(),
            self.source.as_str().to_string(),
        );
        vars.insert("CI_PROJECT_PATH".to_string(), self.project.full_path.clone());
        vars
    }

    /// The pipeline-derived attribute fields merged into every job.
    pub fn pipeline_attributes(&self) -> crate::Attributes {
        let mut attrs = crate::Attributes::new();
        attrs.insert("pipeline".into(), json!(self.pipeline));
        attrs.insert(
            "project".into(),
            json!({"id": self.project.id, "full_path": self.project.full_path}),
        );
        attrs.insert(
            "user".into(),
            match &self.user {
                Some(user) => json!({"id": user.id, "username": user.username}),
                None => Value::Null,
            },
        );
        attrs.insert("ref".into(), json!(self.ref_name));
        attrs.insert("tag".into(), json!(self.tag));
        attrs.insert("trigger_request".into(), json!(self.trigger_request));
        attrs.insert("protected".into(), json!(self.protected));
        attrs
    }
}

//! Declarative job configuration as handed over by the configuration parser.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Attributes, Result};

/// Stages used when a pipeline definition does not declare any.
pub const DEFAULT_STAGES: &[&str] = &[".pre", "build", "test", "deploy", ".post"];

fn default_stage() -> String {
    "test".to_string()
}

fn default_stages() -> Vec<String> {
    DEFAULT_STAGES.iter().map(|s| s.to_string()).collect()
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// When
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum When {
    #[default]
    OnSuccess,
    OnFailure,
    Always,
    Manual,
    Delayed,
    Never,
}

impl When {
    pub fn as_str(&self) -> &'static str {
        match self {
            When::OnSuccess => "on_success",
            When::OnFailure => "on_failure",
            When::Always => "always",
            When::Manual => "manual",
            When::Delayed => "delayed",
            When::Never => "never",
        }
    }
}

// ---------------------------------------------------------------------------
// Needs
// ---------------------------------------------------------------------------

/// One entry of a job's `needs:` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "NeedRepr")]
pub struct Need {
    pub name: String,
    pub artifacts: bool,
    pub optional: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NeedRepr {
    Name(String),
    Full {
        #[serde(alias = "job")]
        name: String,
        #[serde(default = "default_true")]
        artifacts: bool,
        #[serde(default)]
        optional: bool,
    },
}

impl From<NeedRepr> for Need {
    fn from(repr: NeedRepr) -> Self {
        match repr {
            NeedRepr::Name(name) => Need {
                name,
                artifacts: true,
                optional: false,
            },
            NeedRepr::Full {
                name,
                artifacts,
                optional,
            } => Need {
                name,
                artifacts,
                optional,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// only / except
// ---------------------------------------------------------------------------

/// One `only:` / `except:` clause. Unknown keys are a configuration error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyClauseSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refs: Option<Vec<String>>,
    /// `kind` predicate; the only supported value is `active`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<String>>,
}

impl PolicyClauseSpec {
    pub fn is_empty(&self) -> bool {
        self.refs.is_none()
            && self.kubernetes.is_none()
            && self.variables.is_none()
            && self.changes.is_none()
    }
}

/// The accepted spellings of an `only:` / `except:` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicySpec {
    /// `only: [main, tags]`: shorthand for a single `refs` clause.
    Refs(Vec<String>),
    Clause(PolicyClauseSpec),
    Clauses(Vec<PolicyClauseSpec>),
}

impl PolicySpec {
    /// Normalize to a list of clauses.
    pub fn clauses(&self) -> Vec<PolicyClauseSpec> {
        match self {
            PolicySpec::Refs(refs) => vec![PolicyClauseSpec {
                refs: Some(refs.clone()),
                ..PolicyClauseSpec::default()
            }],
            PolicySpec::Clause(clause) => vec![clause.clone()],
            PolicySpec::Clauses(clauses) => clauses.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    pub if_expr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<When>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_failure: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_in: Option<String>,
}

// ---------------------------------------------------------------------------
// JobSpecification
// ---------------------------------------------------------------------------

/// A declarative job parsed from pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpecification {
    pub name: String,
    #[serde(default = "default_stage")]
    pub stage: String,
    #[serde(default)]
    pub when: When,
    #[serde(default)]
    pub allow_failure: bool,
    #[serde(default)]
    pub options: Attributes,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs: Option<Vec<Need>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only: Option<PolicySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub except: Option<PolicySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<RuleSpec>>,
    /// Attributes this engine passes through untouched (`environment`,
    /// `resource_group_key`, `tag_list`, ...).
    #[serde(flatten)]
    pub extra: Attributes,
}

impl JobSpecification {
    pub fn new(name: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stage: stage.into(),
            when: When::default(),
            allow_failure: false,
            options: Attributes::new(),
            variables: BTreeMap::new(),
            needs: None,
            only: None,
            except: None,
            rules: None,
            extra: Attributes::new(),
        }
    }

    /// Replace `options` with the given JSON object. Non-object values are ignored.
    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = options {
            self.options = map;
        }
        self
    }

    pub fn uses_rules(&self) -> bool {
        self.rules.is_some()
    }

    pub fn uses_only_except(&self) -> bool {
        self.only.is_some() || self.except.is_some()
    }
}

// ---------------------------------------------------------------------------
// PipelineDefinition
// ---------------------------------------------------------------------------

/// A whole pipeline configuration: ordered stages plus jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    #[serde(default = "default_stages")]
    pub stages: Vec<String>,
    #[serde(default)]
    pub jobs: Vec<JobSpecification>,
}

impl Default for PipelineDefinition {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            jobs: Vec::new(),
        }
    }
}

impl PipelineDefinition {
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Read a pipeline definition from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let definition = Self::from_json(&data)?;
        tracing::debug!(
            path = %path.display(),
            jobs = definition.jobs.len(),
            "Pipeline definition loaded"
        );
        Ok(definition)
    }

    /// Declared stages wrapped in `.pre` / `.post`, without duplicates.
    pub fn stage_order(&self) -> Vec<String> {
        let mut order = vec![".pre".to_string()];
        for stage in &self.stages {
            if stage != ".pre" && stage != ".post" && !order.contains(stage) {
                order.push(stage.clone());
            }
        }
        order.push(".post".to_string());
        order
    }

    pub fn job(&self, name: &str) -> Option<&JobSpecification> {
        self.jobs.iter().find(|j| j.name == name)
    }
}

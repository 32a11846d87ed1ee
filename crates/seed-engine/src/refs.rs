//! `refs` patterns for `only` / `except`.

use seed_expr::Pattern;
use seed_types::{PipelineContext, PipelineSource, Result, SeedError};

/// Special `refs` keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKeyword {
    Branches,
    Tags,
    /// Matches one pipeline source.
    Source(PipelineSource),
}

impl RefKeyword {
    fn parse(word: &str) -> Option<Self> {
        let keyword = match word {
            "branches" => RefKeyword::Branches,
            "tags" => RefKeyword::Tags,
            "api" => RefKeyword::Source(PipelineSource::Api),
            "external" => RefKeyword::Source(PipelineSource::External),
            "pipelines" => RefKeyword::Source(PipelineSource::Pipeline),
            "pushes" => RefKeyword::Source(PipelineSource::Push),
            "schedules" => RefKeyword::Source(PipelineSource::Schedule),
            "triggers" => RefKeyword::Source(PipelineSource::Trigger),
            "web" => RefKeyword::Source(PipelineSource::Web),
            "merge_requests" => RefKeyword::Source(PipelineSource::MergeRequestEvent),
            "chat" => RefKeyword::Source(PipelineSource::Chat),
            "external_pull_requests" => {
                RefKeyword::Source(PipelineSource::ExternalPullRequestEvent)
            }
            _ => return None,
        };
        Some(keyword)
    }

    fn matches(&self, context: &PipelineContext) -> bool {
        match self {
            RefKeyword::Branches => context.is_branch(),
            RefKeyword::Tags => context.tag,
            RefKeyword::Source(source) => context.source == *source,
        }
    }
}

#[derive(Debug, Clone)]
enum RefMatcher {
    Keyword(RefKeyword),
    Regex(Pattern),
    Exact(String),
}

/// One compiled `refs` entry, optionally restricted to a project with
/// `pattern@group/project`.
#[derive(Debug, Clone)]
pub struct RefPattern {
    source: String,
    matcher: RefMatcher,
    project: Option<String>,
}

impl RefPattern {
    pub fn parse(job: &str, source: &str) -> Result<Self> {
        let (pattern, project) = match source.split_once('@') {
            Some((pattern, project)) => (pattern, Some(project.to_string())),
            None => (source, None),
        };
        let matcher = if let Some(keyword) = RefKeyword::parse(pattern) {
            RefMatcher::Keyword(keyword)
        } else if let Some(compiled) = Pattern::from_literal(pattern) {
            let regex = compiled.map_err(|e| {
                SeedError::config(job, format!("invalid refs pattern '{source}': {e}"))
            })?;
            RefMatcher::Regex(regex)
        } else {
            RefMatcher::Exact(pattern.to_string())
        };
        Ok(Self {
            source: source.to_string(),
            matcher,
            project,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, context: &PipelineContext) -> bool {
        if let Some(project) = &self.project {
            if *project != context.project.full_path {
                return false;
            }
        }
        match &self.matcher {
            RefMatcher::Keyword(keyword) => keyword.matches(context),
            RefMatcher::Regex(pattern) => pattern.is_match(&context.ref_name),
            RefMatcher::Exact(name) => *name == context.ref_name,
        }
    }
}

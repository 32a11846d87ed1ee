//! Glob matching for `changes` and `exists`.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use seed_types::{Result, SeedError};

/// A compiled list of glob patterns.
///
/// `*` stops at `/`, `**` crosses directories, and dotfiles match like any
/// other file.
#[derive(Debug, Clone)]
pub struct PathGlobs {
    patterns: Vec<String>,
    set: GlobSet,
}

impl PathGlobs {
    pub fn compile(job: &str, patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = GlobBuilder::new(pattern.trim_start_matches("./"))
                .literal_separator(true)
                .build()
                .map_err(|e| SeedError::config(job, format!("invalid glob '{pattern}': {e}")))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| SeedError::config(job, e.to_string()))?;
        Ok(Self {
            patterns: patterns.to_vec(),
            set,
        })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.set.is_match(path.trim_start_matches("./"))
    }

    /// `changes`: any modified path matches any glob. Unknown modifications
    /// (`None`) always match.
    pub fn matches_changes(&self, modified_paths: Option<&[String]>) -> bool {
        match modified_paths {
            None => true,
            Some(paths) => paths.iter().any(|p| self.is_match(p)),
        }
    }

    /// `exists`: any repository file matches any glob. When the number of
    /// file/glob comparisons would exceed `limit` the check is skipped and
    /// treated as satisfied.
    pub fn matches_exists(&self, files: &[String], limit: usize) -> bool {
        let comparisons = files.len().saturating_mul(self.patterns.len());
        if comparisons > limit {
            tracing::debug!(comparisons, limit, "exists comparison limit exceeded, treating as satisfied");
            return true;
        }
        files.iter().any(|f| self.is_match(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn globs(patterns: &[&str]) -> PathGlobs {
        let owned: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        PathGlobs::compile("job", &owned).unwrap()
    }

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn single_star_does_not_cross_directories() {
        let g = globs(&["*.md"]);
        assert!(g.is_match("README.md"));
        assert!(!g.is_match("docs/guide.md"));
    }

    #[test]
    fn double_star_crosses_directories() {
        let g = globs(&["docs/**/*.md"]);
        assert!(g.is_match("docs/a/b/guide.md"));
        assert!(g.is_match("docs/guide.md"));
        assert!(!g.is_match("src/lib.rs"));
    }

    #[test]
    fn leading_dot_slash_is_ignored() {
        let g = globs(&["./Dockerfile"]);
        assert!(g.is_match("Dockerfile"));
        assert!(g.is_match("./Dockerfile"));
    }

    #[test]
    fn changes_with_unknown_paths_match() {
        let g = globs(&["src/**/*"]);
        assert!(g.matches_changes(None));
        assert!(g.matches_changes(Some(paths(&["src/main.rs"]).as_slice())));
        assert!(!g.matches_changes(Some(paths(&["README.md"]).as_slice())));
        assert!(!g.matches_changes(Some(&[][..])));
    }

    #[test]
    fn exists_respects_comparison_limit() {
        let g = globs(&["Gemfile", "package.json"]);
        let files = paths(&["src/a.rs", "src/b.rs", "src/c.rs"]);
        assert!(!g.matches_exists(&files, 10_000));
        // 3 files x 2 globs = 6 comparisons
        assert!(g.matches_exists(&files, 5));
        assert!(g.matches_exists(&paths(&["Gemfile"]), 10_000));
    }

    #[test]
    fn invalid_glob_is_config_error() {
        let err = PathGlobs::compile("lint", &["src/[".to_string()]).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("lint"));
    }
}

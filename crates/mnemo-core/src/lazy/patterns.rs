use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::{MnemoError, Result};
use crate::paths;

/// Decides whether a logical path is handled by the lazy subsystem.
///
/// Patterns use the gitignore dialect and are compiled once per engine
/// instance, so the same path gets the same answer for the instance's
/// lifetime. Matching never fails and never blocks.
pub struct LazyPatterns {
    matcher: Option<Gitignore>,
}

impl LazyPatterns {
    pub fn compile(patterns: &[String]) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(Self { matcher: None });
        }
        let mut builder = GitignoreBuilder::new("");
        for pattern in patterns {
            builder
                .add_line(None, pattern)
                .map_err(|e| MnemoError::Config(format!("invalid lazy pattern '{pattern}': {e}")))?;
        }
        let matcher = builder
            .build()
            .map_err(|e| MnemoError::Config(format!("lazy pattern matcher build failed: {e}")))?;
        Ok(Self {
            matcher: Some(matcher),
        })
    }

    /// True when `path` (either spelling) matches the pattern set.
    pub fn is_lazy(&self, path: &str) -> bool {
        let Some(matcher) = &self.matcher else {
            return false;
        };
        let rel = paths::relative(path);
        if rel.is_empty() {
            return false;
        }
        matcher.matched_path_or_any_parents(rel, false).is_ignore()
    }

    pub fn is_empty(&self) -> bool {
        self.matcher.is_none()
    }
}

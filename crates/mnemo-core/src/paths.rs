//! Logical-path spelling helpers.
//!
//! Logical paths carry a single leading separator (`/docs/readme.md`).
//! Legacy manifest data may carry either spelling; callers that need to
//! tolerate both use [`alternate`] to derive the other form.

/// Normalize a path to the canonical logical form with a single leading `/`.
pub(crate) fn logical(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

/// The path relative to the data root: no leading separators.
pub(crate) fn relative(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// The other spelling of the same logical path.
pub(crate) fn alternate(path: &str) -> String {
    match path.strip_prefix('/') {
        Some(rest) => rest.to_string(),
        None => format!("/{path}"),
    }
}

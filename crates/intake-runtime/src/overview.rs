//! Repository overview extraction.
//!
//! Local repositories may carry a `.llm.md` file at their root describing the
//! codebase. Its contents become the application's overview.

use std::path::PathBuf;

use tracing::debug;

/// Name of the overview file at a repository root.
pub const OVERVIEW_FILE: &str = ".llm.md";

/// Stored when a local repository has no overview file.
pub const OVERVIEW_MISSING: &str = "The .llm.md overview file does not exist in this repository.";

const FILE_SCHEME: &str = "file://";

/// Local directory named by a `file://` URI, or `None` for any other scheme.
pub fn local_repo_path(repo: &str) -> Option<PathBuf> {
    let path = repo.strip_prefix(FILE_SCHEME)?;
    let path = path.strip_suffix('/').unwrap_or(path);
    Some(PathBuf::from(path))
}

/// Read the overview for `repo`.
///
/// Local repositories yield the file contents verbatim or [`OVERVIEW_MISSING`].
/// Bytes that are not valid UTF-8 are replaced rather than rejected.
/// Remote repositories are not fetched and yield an empty string.
pub async fn extract_overview(repo: &str) -> std::io::Result<String> {
    let Some(root) = local_repo_path(repo) else {
        debug!(repo, "extract_overview: remote repository, skipping");
        return Ok(String::new());
    };

    let path = root.join(OVERVIEW_FILE);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!(path = %path.display(), bytes = bytes.len(), "extract_overview: read overview");
            // Invalid UTF-8 sequences become U+FFFD.
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "extract_overview: no overview file");
            Ok(OVERVIEW_MISSING.to_string())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "overview_tests.rs"]
mod tests;

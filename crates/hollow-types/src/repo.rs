//! Git repository descriptors

use serde::{Deserialize, Serialize};

/// Remote repository a pull or push talks to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Repo {
    #[serde(default)]
    pub remote: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub branch: String,
}

impl Repo {
    /// A repo is usable once it names a remote
    pub fn is_configured(&self) -> bool {
        !self.remote.trim().is_empty()
    }

    /// Branch to use, falling back to `main`
    pub fn branch_or_default(&self) -> &str {
        if self.branch.trim().is_empty() {
            "main"
        } else {
            self.branch.trim()
        }
    }
}

/// Repositories configured for the project: `source` holds the editable
/// content, `deploy` receives the published site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RepoConfig {
    #[serde(default)]
    pub source: Repo,
    #[serde(default)]
    pub deploy: Repo,
}

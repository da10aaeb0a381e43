//! Remote Git hosting backend.
//!
//! Workspace content lives in per-project repositories on a Gitea instance.
//! The [`GitBackend`] trait is the seam the sync engine and handlers talk
//! through; [`gitea::GiteaBackend`] is the production implementation and
//! tests script their own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod gitea;
pub mod tree;

pub use gitea::GiteaBackend;

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git backend request failed: {0}")]
    Request(String),
    #[error("git backend returned {status} for {context}")]
    Status { status: u16, context: String },
}

/// A file as the remote knows it: base64 content plus its blob SHA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub content: String,
    pub sha: String,
}

/// One entry of a recursive tree listing.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// A single file change inside a batch commit.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChangeOp {
    pub path: String,
    pub operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Create a repository from the configured template.
    async fn create_repo_from_template(&self, name: &str, description: &str) -> Result<(), GitError>;

    async fn delete_repo(&self, name: &str) -> Result<(), GitError>;

    /// Create `new_branch` pointing at the head of `from_branch`.
    async fn create_branch(&self, repo: &str, new_branch: &str, from_branch: &str) -> Result<(), GitError>;

    /// Head commit SHA of a branch, or `None` if the branch does not exist.
    async fn branch_head(&self, repo: &str, branch: &str) -> Result<Option<String>, GitError>;

    /// Fetch a file's base64 content and SHA, or `None` if absent on that
    /// branch.
    async fn get_contents(&self, repo: &str, branch: &str, path: &str) -> Result<Option<RemoteFile>, GitError>;

    /// Raw bytes of a file, or `None` if absent.
    async fn get_raw_file(&self, repo: &str, branch: &str, path: &str) -> Result<Option<Vec<u8>>, GitError>;

    /// Recursive tree listing rooted at a commit or tree SHA.
    async fn get_tree(&self, repo: &str, sha: &str) -> Result<Vec<TreeEntry>, GitError>;

    /// Apply a batch of file changes as a single commit on `branch`.
    async fn commit_batch(
        &self,
        repo: &str,
        branch: &str,
        author: &str,
        message: &str,
        changes: &[ChangeOp],
    ) -> Result<(), GitError>;
}

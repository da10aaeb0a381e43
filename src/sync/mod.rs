//! Workspace sync engine.
//!
//! Compares a set of client-side files against a project's working branch
//! and applies the difference as one batch commit. Lookups against the
//! remote run concurrently with a fixed fan-out bound so large workspaces do
//! not open an unbounded number of requests.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use futures::{StreamExt, TryStreamExt, stream};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::git::{ChangeOp, GitBackend, GitError, Operation};

/// Branch user edits land on.
pub const WORKING_BRANCH: &str = "dev";
/// Branch the working branch is cut from when a project is created.
pub const BASE_BRANCH: &str = "prod";

const COMMIT_MESSAGE: &str = "update contents";

/// Concurrent content lookups per sync request.
const LOOKUP_FANOUT: usize = 16;

/// A file as the client last saw it, plus its current local content.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalFile {
    pub path: String,
    pub content: String,
}

/// Repository name for a user's project.
#[must_use]
pub fn repo_name(user_id: &str, project_id: &str) -> String {
    format!("{user_id}-{project_id}")
}

pub struct SyncEngine {
    git: Arc<dyn GitBackend>,
}

impl SyncEngine {
    #[must_use]
    pub fn new(git: Arc<dyn GitBackend>) -> Self {
        Self { git }
    }

    /// Compute the changes needed to make `repo`'s working branch match the
    /// client state: `edits` are files the client holds, `deletes` are paths
    /// the client removed.
    ///
    /// Per-file rules:
    /// - edit of a path absent on the branch becomes a create (no SHA)
    /// - edit whose encoded content differs becomes an update (remote SHA)
    /// - edit whose encoded content matches produces nothing
    /// - delete of a present path becomes a delete (remote SHA)
    /// - delete of an absent path is skipped, as is a delete whose lookup
    ///   fails; an edit lookup failure aborts the whole plan
    pub async fn plan(
        &self,
        repo: &str,
        edits: &[LocalFile],
        deletes: &[String],
    ) -> Result<Vec<ChangeOp>, GitError> {
        let edit_ops: Vec<Option<ChangeOp>> = stream::iter(edits.iter().cloned())
            .map(|file| {
                let git = Arc::clone(&self.git);
                let repo = repo.to_string();
                async move {
                    let encoded = BASE64.encode(file.content.as_bytes());
                    match git.get_contents(&repo, WORKING_BRANCH, &file.path).await? {
                        None => Ok(Some(ChangeOp {
                            path: file.path,
                            operation: Operation::Create,
                            content: Some(encoded),
                            sha: None,
                        })),
                        Some(remote) if remote.content != encoded => Ok(Some(ChangeOp {
                            path: file.path,
                            operation: Operation::Update,
                            content: Some(encoded),
                            sha: Some(remote.sha),
                        })),
                        Some(_) => Ok(None),
                    }
                }
            })
            .buffer_unordered(LOOKUP_FANOUT)
            .try_collect()
            .await?;

        let delete_ops: Vec<Option<ChangeOp>> = stream::iter(deletes.iter().cloned())
            .map(|path| {
                let git = Arc::clone(&self.git);
                let repo = repo.to_string();
                async move {
                    match git.get_contents(&repo, WORKING_BRANCH, &path).await {
                        Ok(Some(remote)) => Some(ChangeOp {
                            path,
                            operation: Operation::Delete,
                            content: None,
                            sha: Some(remote.sha),
                        }),
                        Ok(None) => None,
                        Err(err) => {
                            warn!("Skipping delete of {path}: {err}");
                            None
                        }
                    }
                }
            })
            .buffer_unordered(LOOKUP_FANOUT)
            .collect()
            .await;

        Ok(edit_ops
            .into_iter()
            .chain(delete_ops)
            .flatten()
            .collect())
    }

    /// Plan and, if anything changed, commit the batch as `user_id`. Returns
    /// the applied decisions; an empty list means the branch was already in
    /// sync and no commit was made.
    pub async fn apply(
        &self,
        repo: &str,
        user_id: &str,
        edits: &[LocalFile],
        deletes: &[String],
    ) -> Result<Vec<ChangeOp>, GitError> {
        let changes = self.plan(repo, edits, deletes).await?;
        if changes.is_empty() {
            debug!("Workspace {repo} already in sync");
            return Ok(changes);
        }
        self.git
            .commit_batch(repo, WORKING_BRANCH, user_id, COMMIT_MESSAGE, &changes)
            .await?;
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_names_join_user_and_project() {
        assert_eq!(repo_name("u1", "p1"), "u1-p1");
    }
}

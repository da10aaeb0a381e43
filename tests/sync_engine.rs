//! Sync engine behavior against a scripted git backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

use atelier::git::{ChangeOp, GitBackend, GitError, Operation, RemoteFile, TreeEntry};
use atelier::sync::{LocalFile, SyncEngine, WORKING_BRANCH};

/// In-memory stand-in for the Gitea backend. Files are keyed by path on the
/// working branch; paths listed in `failing` error on lookup.
#[derive(Default)]
struct FakeGit {
    files: Mutex<HashMap<String, RemoteFile>>,
    failing: Mutex<Vec<String>>,
    commits: Mutex<Vec<Commit>>,
}

#[derive(Clone)]
struct Commit {
    branch: String,
    author: String,
    message: String,
    changes: Vec<ChangeOp>,
}

impl FakeGit {
    fn with_file(self, path: &str, content: &str) -> Self {
        let encoded = BASE64.encode(content.as_bytes());
        self.files.lock().unwrap().insert(
            path.to_string(),
            RemoteFile {
                content: encoded,
                sha: format!("sha-{path}"),
            },
        );
        self
    }

    fn failing_on(self, path: &str) -> Self {
        self.failing.lock().unwrap().push(path.to_string());
        self
    }

    fn commits(&self) -> Vec<Commit> {
        self.commits.lock().unwrap().clone()
    }
}

#[async_trait]
impl GitBackend for FakeGit {
    async fn create_repo_from_template(&self, _name: &str, _description: &str) -> Result<(), GitError> {
        Ok(())
    }

    async fn delete_repo(&self, _name: &str) -> Result<(), GitError> {
        Ok(())
    }

    async fn create_branch(&self, _repo: &str, _new_branch: &str, _from_branch: &str) -> Result<(), GitError> {
        Ok(())
    }

    async fn branch_head(&self, _repo: &str, _branch: &str) -> Result<Option<String>, GitError> {
        Ok(Some("head".to_string()))
    }

    async fn get_contents(&self, _repo: &str, _branch: &str, path: &str) -> Result<Option<RemoteFile>, GitError> {
        if self.failing.lock().unwrap().iter().any(|p| p == path) {
            return Err(GitError::Request(format!("lookup of {path} failed")));
        }
        Ok(self.files.lock().unwrap().get(path).cloned())
    }

    async fn get_raw_file(&self, _repo: &str, _branch: &str, path: &str) -> Result<Option<Vec<u8>>, GitError> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(path)
            .map(|file| BASE64.decode(&file.content).unwrap_or_default()))
    }

    async fn get_tree(&self, _repo: &str, _sha: &str) -> Result<Vec<TreeEntry>, GitError> {
        Ok(Vec::new())
    }

    async fn commit_batch(
        &self,
        _repo: &str,
        branch: &str,
        author: &str,
        message: &str,
        changes: &[ChangeOp],
    ) -> Result<(), GitError> {
        self.commits.lock().unwrap().push(Commit {
            branch: branch.to_string(),
            author: author.to_string(),
            message: message.to_string(),
            changes: changes.to_vec(),
        });
        Ok(())
    }
}

fn local(path: &str, content: &str) -> LocalFile {
    LocalFile {
        path: path.to_string(),
        content: content.to_string(),
    }
}

#[tokio::test]
async fn in_sync_workspace_makes_no_commit() {
    let git = Arc::new(FakeGit::default().with_file("src/main.c", "int main() {}"));
    let engine = SyncEngine::new(git.clone());

    let decisions = engine
        .apply("u1-p1", "u1", &[local("src/main.c", "int main() {}")], &[])
        .await
        .unwrap();

    assert!(decisions.is_empty());
    assert!(git.commits().is_empty());
}

#[tokio::test]
async fn absent_path_becomes_create_without_sha() {
    let git = Arc::new(FakeGit::default());
    let engine = SyncEngine::new(git.clone());

    let decisions = engine
        .apply("u1-p1", "u1", &[local("README.md", "hello")], &[])
        .await
        .unwrap();

    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].operation, Operation::Create);
    assert_eq!(decisions[0].path, "README.md");
    assert_eq!(
        decisions[0].content.as_deref(),
        Some(BASE64.encode("hello").as_str())
    );
    assert!(decisions[0].sha.is_none());
    assert_eq!(git.commits().len(), 1);
}

#[tokio::test]
async fn changed_content_becomes_update_with_remote_sha() {
    let git = Arc::new(FakeGit::default().with_file("notes.txt", "old"));
    let engine = SyncEngine::new(git.clone());

    let decisions = engine
        .apply("u1-p1", "u1", &[local("notes.txt", "new")], &[])
        .await
        .unwrap();

    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].operation, Operation::Update);
    assert_eq!(decisions[0].sha.as_deref(), Some("sha-notes.txt"));
}

#[tokio::test]
async fn deletes_need_a_remote_sha_and_absent_paths_are_skipped() {
    let git = Arc::new(FakeGit::default().with_file("keep.txt", "x").with_file("drop.txt", "y"));
    let engine = SyncEngine::new(git.clone());

    let decisions = engine
        .apply(
            "u1-p1",
            "u1",
            &[],
            &["drop.txt".to_string(), "never-existed.txt".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].operation, Operation::Delete);
    assert_eq!(decisions[0].path, "drop.txt");
    assert_eq!(decisions[0].sha.as_deref(), Some("sha-drop.txt"));
    assert!(decisions[0].content.is_none());
}

#[tokio::test]
async fn failing_delete_lookup_is_skipped_but_others_proceed() {
    let git = Arc::new(
        FakeGit::default()
            .with_file("drop.txt", "y")
            .failing_on("flaky.txt"),
    );
    let engine = SyncEngine::new(git.clone());

    let decisions = engine
        .apply(
            "u1-p1",
            "u1",
            &[],
            &["flaky.txt".to_string(), "drop.txt".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].path, "drop.txt");
}

#[tokio::test]
async fn failing_edit_lookup_aborts_without_committing() {
    let git = Arc::new(FakeGit::default().failing_on("src/lib.rs"));
    let engine = SyncEngine::new(git.clone());

    let result = engine
        .apply(
            "u1-p1",
            "u1",
            &[local("src/lib.rs", "x"), local("other.txt", "y")],
            &[],
        )
        .await;

    assert!(result.is_err());
    assert!(git.commits().is_empty());
}

#[tokio::test]
async fn mixed_plan_lands_as_one_commit_on_the_working_branch() {
    let git = Arc::new(
        FakeGit::default()
            .with_file("same.txt", "same")
            .with_file("stale.txt", "old")
            .with_file("gone.txt", "bye"),
    );
    let engine = SyncEngine::new(git.clone());

    let decisions = engine
        .apply(
            "u1-p1",
            "u1",
            &[
                local("same.txt", "same"),
                local("stale.txt", "new"),
                local("fresh.txt", "hi"),
            ],
            &["gone.txt".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(decisions.len(), 3);

    let commits = git.commits();
    assert_eq!(commits.len(), 1);
    let commit = &commits[0];
    assert_eq!(commit.branch, WORKING_BRANCH);
    assert_eq!(commit.author, "u1");
    assert_eq!(commit.message, "update contents");
    assert_eq!(commit.changes.len(), 3);

    let op_for = |path: &str| {
        commit
            .changes
            .iter()
            .find(|change| change.path == path)
            .map(|change| change.operation)
    };
    assert_eq!(op_for("fresh.txt"), Some(Operation::Create));
    assert_eq!(op_for("stale.txt"), Some(Operation::Update));
    assert_eq!(op_for("gone.txt"), Some(Operation::Delete));
    assert_eq!(op_for("same.txt"), None);
}

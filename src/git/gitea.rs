//! Gitea REST client implementing [`GitBackend`].

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{Instrument, info_span};
use url::Url;

use super::{ChangeOp, GitBackend, GitError, RemoteFile, TreeEntry};

pub struct GiteaBackend {
    http: Client,
    base_url: Url,
    owner: String,
    token: SecretString,
    template_owner: String,
    template_name: String,
}

#[derive(Deserialize)]
struct ContentsResponse {
    content: Option<String>,
    sha: String,
}

#[derive(Deserialize)]
struct BranchResponse {
    commit: BranchCommit,
}

#[derive(Deserialize)]
struct BranchCommit {
    id: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
}

impl GiteaBackend {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built or the base URL is
    /// invalid.
    pub fn new(
        base_url: &Url,
        owner: &str,
        token: SecretString,
        template_owner: &str,
        template_name: &str,
    ) -> Result<Self, GitError> {
        let http = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .build()
            .map_err(|err| GitError::Request(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.clone(),
            owner: owner.to_string(),
            token,
            template_owner: template_owner.to_string(),
            template_name: template_name.to_string(),
        })
    }

    fn api(&self, path: &str) -> Result<Url, GitError> {
        self.base_url
            .join(&format!("api/v1/{path}"))
            .map_err(|err| GitError::Request(err.to_string()))
    }

    fn auth(&self) -> String {
        format!("token {}", self.token.expose_secret())
    }

    async fn expect_success(response: Response, context: &str) -> Result<Response, GitError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(GitError::Status {
                status: response.status().as_u16(),
                context: context.to_string(),
            })
        }
    }
}

#[async_trait]
impl GitBackend for GiteaBackend {
    async fn create_repo_from_template(&self, name: &str, description: &str) -> Result<(), GitError> {
        let url = self.api(&format!(
            "repos/{}/{}/generate",
            self.template_owner, self.template_name
        ))?;
        let span = info_span!("git.request", git.operation = "generate", git.repo = name);
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth())
            .json(&json!({
                "owner": self.owner,
                "name": name,
                "description": description,
                "git_content": true,
                "private": true,
            }))
            .send()
            .instrument(span)
            .await
            .map_err(|err| GitError::Request(err.to_string()))?;
        Self::expect_success(response, "generate repository").await?;
        Ok(())
    }

    async fn delete_repo(&self, name: &str) -> Result<(), GitError> {
        let url = self.api(&format!("repos/{}/{name}", self.owner))?;
        let span = info_span!("git.request", git.operation = "delete_repo", git.repo = name);
        let response = self
            .http
            .delete(url)
            .header("Authorization", self.auth())
            .send()
            .instrument(span)
            .await
            .map_err(|err| GitError::Request(err.to_string()))?;
        Self::expect_success(response, "delete repository").await?;
        Ok(())
    }

    async fn create_branch(&self, repo: &str, new_branch: &str, from_branch: &str) -> Result<(), GitError> {
        let url = self.api(&format!("repos/{}/{repo}/branches", self.owner))?;
        let span = info_span!("git.request", git.operation = "create_branch", git.repo = repo);
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth())
            .json(&json!({
                "new_branch_name": new_branch,
                "old_branch_name": from_branch,
            }))
            .send()
            .instrument(span)
            .await
            .map_err(|err| GitError::Request(err.to_string()))?;
        Self::expect_success(response, "create branch").await?;
        Ok(())
    }

    async fn branch_head(&self, repo: &str, branch: &str) -> Result<Option<String>, GitError> {
        let url = self.api(&format!("repos/{}/{repo}/branches/{branch}", self.owner))?;
        let span = info_span!("git.request", git.operation = "branch_head", git.repo = repo);
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth())
            .send()
            .instrument(span)
            .await
            .map_err(|err| GitError::Request(err.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::expect_success(response, "branch head").await?;
        let branch: BranchResponse = response
            .json()
            .await
            .map_err(|err| GitError::Request(err.to_string()))?;
        Ok(Some(branch.commit.id))
    }

    async fn get_contents(&self, repo: &str, branch: &str, path: &str) -> Result<Option<RemoteFile>, GitError> {
        let mut url = self.api(&format!("repos/{}/{repo}/contents/{path}", self.owner))?;
        url.query_pairs_mut().append_pair("ref", branch);
        let span = info_span!(
            "git.request",
            git.operation = "get_contents",
            git.repo = repo,
            git.path = path
        );
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth())
            .send()
            .instrument(span)
            .await
            .map_err(|err| GitError::Request(err.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::expect_success(response, "get contents").await?;
        let contents: ContentsResponse = response
            .json()
            .await
            .map_err(|err| GitError::Request(err.to_string()))?;
        Ok(Some(RemoteFile {
            content: contents.content.unwrap_or_default(),
            sha: contents.sha,
        }))
    }

    async fn get_raw_file(&self, repo: &str, branch: &str, path: &str) -> Result<Option<Vec<u8>>, GitError> {
        let mut url = self.api(&format!("repos/{}/{repo}/raw/{path}", self.owner))?;
        url.query_pairs_mut().append_pair("ref", branch);
        let span = info_span!(
            "git.request",
            git.operation = "get_raw_file",
            git.repo = repo,
            git.path = path
        );
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth())
            .send()
            .instrument(span)
            .await
            .map_err(|err| GitError::Request(err.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::expect_success(response, "get raw file").await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| GitError::Request(err.to_string()))?;
        Ok(Some(bytes.to_vec()))
    }

    async fn get_tree(&self, repo: &str, sha: &str) -> Result<Vec<TreeEntry>, GitError> {
        let mut url = self.api(&format!("repos/{}/{repo}/git/trees/{sha}", self.owner))?;
        url.query_pairs_mut().append_pair("recursive", "true");
        let span = info_span!("git.request", git.operation = "get_tree", git.repo = repo);
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth())
            .send()
            .instrument(span)
            .await
            .map_err(|err| GitError::Request(err.to_string()))?;
        let response = Self::expect_success(response, "get tree").await?;
        let tree: TreeResponse = response
            .json()
            .await
            .map_err(|err| GitError::Request(err.to_string()))?;
        Ok(tree.tree)
    }

    async fn commit_batch(
        &self,
        repo: &str,
        branch: &str,
        author: &str,
        message: &str,
        changes: &[ChangeOp],
    ) -> Result<(), GitError> {
        let url = self.api(&format!("repos/{}/{repo}/contents", self.owner))?;
        let span = info_span!(
            "git.request",
            git.operation = "commit_batch",
            git.repo = repo,
            git.files = changes.len()
        );
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth())
            .json(&json!({
                "author": { "name": author },
                "branch": branch,
                "message": message,
                "files": changes,
            }))
            .send()
            .instrument(span)
            .await
            .map_err(|err| GitError::Request(err.to_string()))?;
        Self::expect_success(response, "commit batch").await?;
        Ok(())
    }
}

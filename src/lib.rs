//! # Atelier (Accounts & Workspace Sync)
//!
//! `atelier` is the backend for user accounts and git-backed workspaces. It
//! handles registration with email verification, password login with optional
//! TOTP step-up, opaque bearer sessions held in Redis, and a sync engine that
//! mirrors client workspace state onto per-workspace Gitea repositories.
//!
//! ## Sessions and tickets
//!
//! Sessions are random opaque tokens; the key-value store is the single
//! source of truth, so expiry and revocation need no database round trip.
//! One-shot tickets back email verification links, password reset links, and
//! the pending TOTP challenge returned at login.
//!
//! ## Workspaces
//!
//! Each workspace maps to a git repository generated from a template. The
//! sync engine compares client files against the working branch and commits
//! the minimal batch of creates, updates, and deletes in one commit.
//!
//! All routes sit behind a trusted frontend gateway that presents a shared
//! service secret on the registration and login endpoints.

pub mod api;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod git;
pub mod ids;
pub mod kv;
pub mod mail;
pub mod store;
pub mod sync;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        // Should be a hex string (full SHA-1 is 40 chars, but could be short)
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}

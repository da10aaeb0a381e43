//! Command-line argument dispatch.
//!
//! Maps parsed CLI arguments to the appropriate action, such as starting the
//! API server with its full configuration.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{auth, git, kv, smtp};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let kv_address = matches
        .get_one::<String>(kv::ARG_KV_ADDRESS)
        .cloned()
        .context("missing required argument: --kv-address")?;
    let kv_password = SecretString::from(
        matches
            .get_one::<String>(kv::ARG_KV_PASSWORD)
            .cloned()
            .unwrap_or_default(),
    );

    let git_url = matches
        .get_one::<String>(git::ARG_GIT_URL)
        .map(|url| Url::parse(url))
        .transpose()
        .context("invalid --git-url")?
        .context("missing required argument: --git-url")?;
    let git_owner = matches
        .get_one::<String>(git::ARG_GIT_OWNER)
        .cloned()
        .context("missing required argument: --git-owner")?;
    let git_token = SecretString::from(
        matches
            .get_one::<String>(git::ARG_GIT_TOKEN)
            .cloned()
            .context("missing required argument: --git-token")?,
    );
    let git_template_owner = matches
        .get_one::<String>(git::ARG_GIT_TEMPLATE_OWNER)
        .cloned()
        .unwrap_or_else(|| git_owner.clone());
    let git_template = matches
        .get_one::<String>(git::ARG_GIT_TEMPLATE)
        .cloned()
        .context("missing required argument: --git-template")?;

    let smtp = matches
        .get_one::<String>(smtp::ARG_SMTP_HOST)
        .cloned()
        .map(|host| crate::cli::actions::server::SmtpArgs {
            host,
            username: matches
                .get_one::<String>(smtp::ARG_SMTP_USERNAME)
                .cloned()
                .unwrap_or_default(),
            password: SecretString::from(
                matches
                    .get_one::<String>(smtp::ARG_SMTP_PASSWORD)
                    .cloned()
                    .unwrap_or_default(),
            ),
            from: matches
                .get_one::<String>(smtp::ARG_SMTP_FROM)
                .cloned()
                .unwrap_or_else(|| "no-reply@localhost".to_string()),
        });

    let service_secret = SecretString::from(
        matches
            .get_one::<String>(auth::ARG_SERVICE_SECRET)
            .cloned()
            .context("missing required argument: --service-secret")?,
    );
    let totp_issuer = matches
        .get_one::<String>(auth::ARG_TOTP_ISSUER)
        .cloned()
        .unwrap_or_else(|| "atelier".to_string());
    let session_ttl = Duration::from_secs(
        matches
            .get_one::<u64>(auth::ARG_SESSION_TTL)
            .copied()
            .unwrap_or(43_200),
    );
    let remember_ttl = Duration::from_secs(
        matches
            .get_one::<u64>(auth::ARG_REMEMBER_TTL)
            .copied()
            .unwrap_or(864_000),
    );
    let rps = matches.get_one::<u32>(auth::ARG_RPS).copied().unwrap_or(50);

    Ok(Action::Server(Args {
        port,
        dsn,
        kv_address,
        kv_password,
        git_url,
        git_owner,
        git_token,
        git_template_owner,
        git_template,
        smtp,
        service_secret,
        totp_issuer,
        session_ttl,
        remember_ttl,
        rps,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_owner_defaults_to_owner() {
        temp_env::with_vars(
            [
                ("ATELIER_DSN", Some("postgres://localhost:5432/atelier")),
                ("ATELIER_GIT_URL", Some("https://git.example.com/")),
                ("ATELIER_GIT_OWNER", Some("workspaces")),
                ("ATELIER_GIT_TOKEN", Some("t0k3n")),
                ("ATELIER_SERVICE_SECRET", Some("s3cr3t")),
                ("ATELIER_GIT_TEMPLATE_OWNER", None::<&str>),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["atelier"]);
                let Ok(Action::Server(args)) = handler(&matches) else {
                    panic!("expected server action");
                };
                assert_eq!(args.git_template_owner, "workspaces");
                assert_eq!(args.git_template, "template");
                assert!(args.smtp.is_none());
                assert_eq!(args.session_ttl, Duration::from_secs(43_200));
            },
        );
    }

    #[test]
    fn rejects_invalid_git_url() {
        temp_env::with_vars(
            [
                ("ATELIER_DSN", Some("postgres://localhost:5432/atelier")),
                ("ATELIER_GIT_URL", Some("not a url")),
                ("ATELIER_GIT_OWNER", Some("workspaces")),
                ("ATELIER_GIT_TOKEN", Some("t0k3n")),
                ("ATELIER_SERVICE_SECRET", Some("s3cr3t")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["atelier"]);
                let result = handler(&matches);
                assert!(result.is_err());
            },
        );
    }
}

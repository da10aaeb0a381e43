pub mod auth;
pub mod git;
pub mod kv;
pub mod logging;
pub mod smtp;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("atelier")
        .about("Accounts and workspace sync")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("ATELIER_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("ATELIER_DSN")
                .required(true),
        );

    let command = kv::with_args(command);
    let command = smtp::with_args(command);
    let command = git::with_args(command);
    let command = auth::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: &[&str] = &[
        "--dsn",
        "postgres://localhost:5432/atelier",
        "--git-url",
        "https://git.example.com/",
        "--git-owner",
        "workspaces",
        "--git-token",
        "t0k3n",
        "--service-secret",
        "s3cr3t",
    ];

    fn args(extra: &[&str]) -> Vec<String> {
        let mut args = vec!["atelier".to_string()];
        args.extend(REQUIRED.iter().map(ToString::to_string));
        args.extend(extra.iter().map(ToString::to_string));
        args
    }

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "atelier");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Accounts and workspace sync".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_defaults() {
        let matches = new().get_matches_from(args(&[]));

        assert_eq!(matches.get_one::<u16>("port").copied(), Some(8080));
        assert_eq!(
            matches.get_one::<String>(kv::ARG_KV_ADDRESS).cloned(),
            Some("127.0.0.1:6379".to_string())
        );
        assert_eq!(
            matches.get_one::<String>(git::ARG_GIT_TEMPLATE).cloned(),
            Some("template".to_string())
        );
        assert_eq!(
            matches.get_one::<u64>(auth::ARG_SESSION_TTL).copied(),
            Some(43_200)
        );
        assert_eq!(
            matches.get_one::<u64>(auth::ARG_REMEMBER_TTL).copied(),
            Some(864_000)
        );
        assert_eq!(matches.get_one::<u32>(auth::ARG_RPS).copied(), Some(50));
    }

    #[test]
    fn test_missing_required_args() {
        let result = new().try_get_matches_from(vec!["atelier", "--port", "8080"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_env_port() {
        temp_env::with_var("ATELIER_PORT", Some("9090"), || {
            let matches = new().get_matches_from(args(&[]));
            assert_eq!(matches.get_one::<u16>("port").copied(), Some(9090));
        });
    }

    #[test]
    fn test_env_dsn() {
        temp_env::with_var(
            "ATELIER_DSN",
            Some("postgres://env:5432/atelier"),
            || {
                let matches = new().get_matches_from(vec![
                    "atelier",
                    "--git-url",
                    "https://git.example.com/",
                    "--git-owner",
                    "workspaces",
                    "--git-token",
                    "t0k3n",
                    "--service-secret",
                    "s3cr3t",
                ]);
                assert_eq!(
                    matches.get_one::<String>("dsn").cloned(),
                    Some("postgres://env:5432/atelier".to_string())
                );
            },
        );
    }

    #[test]
    fn test_smtp_username_requires_host() {
        let result = new().try_get_matches_from(args(&["--smtp-username", "mailer"]));
        assert!(result.is_err());

        let result = new().try_get_matches_from(args(&[
            "--smtp-host",
            "smtp.example.com",
            "--smtp-username",
            "mailer",
        ]));
        assert!(result.is_ok());
    }
}

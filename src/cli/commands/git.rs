use clap::{Arg, Command};

pub const ARG_GIT_URL: &str = "git-url";
pub const ARG_GIT_OWNER: &str = "git-owner";
pub const ARG_GIT_TOKEN: &str = "git-token";
pub const ARG_GIT_TEMPLATE_OWNER: &str = "git-template-owner";
pub const ARG_GIT_TEMPLATE: &str = "git-template";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GIT_URL)
                .long(ARG_GIT_URL)
                .help("Base URL of the Gitea server, e.g. https://git.example.com/")
                .env("ATELIER_GIT_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_GIT_OWNER)
                .long(ARG_GIT_OWNER)
                .help("Organization or user that owns workspace repositories")
                .env("ATELIER_GIT_OWNER")
                .required(true),
        )
        .arg(
            Arg::new(ARG_GIT_TOKEN)
                .long(ARG_GIT_TOKEN)
                .help("API token with repository admin rights")
                .env("ATELIER_GIT_TOKEN")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_GIT_TEMPLATE_OWNER)
                .long(ARG_GIT_TEMPLATE_OWNER)
                .help("Owner of the template repository (defaults to --git-owner)")
                .env("ATELIER_GIT_TEMPLATE_OWNER"),
        )
        .arg(
            Arg::new(ARG_GIT_TEMPLATE)
                .long(ARG_GIT_TEMPLATE)
                .help("Template repository new workspaces are generated from")
                .default_value("template")
                .env("ATELIER_GIT_TEMPLATE"),
        )
}

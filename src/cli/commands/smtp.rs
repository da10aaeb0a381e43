use clap::{Arg, Command};

pub const ARG_SMTP_HOST: &str = "smtp-host";
pub const ARG_SMTP_USERNAME: &str = "smtp-username";
pub const ARG_SMTP_PASSWORD: &str = "smtp-password";
pub const ARG_SMTP_FROM: &str = "smtp-from";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SMTP_HOST)
                .long(ARG_SMTP_HOST)
                .help("SMTP relay host. When omitted, outgoing mail is logged instead of sent")
                .env("ATELIER_SMTP_HOST"),
        )
        .arg(
            Arg::new(ARG_SMTP_USERNAME)
                .long(ARG_SMTP_USERNAME)
                .help("SMTP username")
                .env("ATELIER_SMTP_USERNAME")
                .requires(ARG_SMTP_HOST),
        )
        .arg(
            Arg::new(ARG_SMTP_PASSWORD)
                .long(ARG_SMTP_PASSWORD)
                .help("SMTP password")
                .env("ATELIER_SMTP_PASSWORD")
                .hide_env_values(true)
                .requires(ARG_SMTP_USERNAME),
        )
        .arg(
            Arg::new(ARG_SMTP_FROM)
                .long(ARG_SMTP_FROM)
                .help("From address for verification and reset mail")
                .default_value("no-reply@localhost")
                .env("ATELIER_SMTP_FROM"),
        )
}

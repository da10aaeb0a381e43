use clap::{Arg, Command};

pub const ARG_SERVICE_SECRET: &str = "service-secret";
pub const ARG_TOTP_ISSUER: &str = "totp-issuer";
pub const ARG_SESSION_TTL: &str = "session-ttl-seconds";
pub const ARG_REMEMBER_TTL: &str = "remember-ttl-seconds";
pub const ARG_RPS: &str = "rps";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SERVICE_SECRET)
                .long(ARG_SERVICE_SECRET)
                .help("Shared secret required on registration and login endpoints")
                .env("ATELIER_SERVICE_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOTP_ISSUER)
                .long(ARG_TOTP_ISSUER)
                .help("Issuer name shown in authenticator apps")
                .default_value("atelier")
                .env("ATELIER_TOTP_ISSUER"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL)
                .long(ARG_SESSION_TTL)
                .help("Session lifetime in seconds")
                .default_value("43200")
                .env("ATELIER_SESSION_TTL_SECONDS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_REMEMBER_TTL)
                .long(ARG_REMEMBER_TTL)
                .help("Session lifetime in seconds when the client asks to be remembered")
                .default_value("864000")
                .env("ATELIER_REMEMBER_TTL_SECONDS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_RPS)
                .long(ARG_RPS)
                .help("Requests per second allowed before 429 responses")
                .default_value("50")
                .env("ATELIER_RPS")
                .value_parser(clap::value_parser!(u32)),
        )
}

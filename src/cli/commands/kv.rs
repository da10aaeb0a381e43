use clap::{Arg, Command};

pub const ARG_KV_ADDRESS: &str = "kv-address";
pub const ARG_KV_PASSWORD: &str = "kv-password";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_KV_ADDRESS)
                .long(ARG_KV_ADDRESS)
                .help("Redis host:port for sessions, tickets, and caches")
                .default_value("127.0.0.1:6379")
                .env("ATELIER_KV_ADDRESS"),
        )
        .arg(
            Arg::new(ARG_KV_PASSWORD)
                .long(ARG_KV_PASSWORD)
                .help("Redis password (empty for no auth)")
                .default_value("")
                .env("ATELIER_KV_PASSWORD")
                .hide_env_values(true),
        )
}

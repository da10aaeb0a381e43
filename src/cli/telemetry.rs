use anyhow::Result;
use tracing::Level;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};

/// Initialize logging. The verbosity level from repeated `-v` flags becomes
/// the default directive; `RUST_LOG` still overrides per-target.
///
/// # Errors
///
/// Returns an error if subscriber initialization fails
pub fn init(verbosity_level: Option<Level>) -> Result<()> {
    let verbosity_level = verbosity_level.unwrap_or(Level::ERROR);

    let fmt_layer = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false)
        .pretty();

    let filter = EnvFilter::builder()
        .with_default_directive(verbosity_level.into())
        .from_env_lossy()
        .add_directive("hyper=error".parse()?)
        .add_directive("tokio=error".parse()?)
        .add_directive("sqlx=warn".parse()?);

    let subscriber = Registry::default().with(fmt_layer).with(filter);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

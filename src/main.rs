//! trowel: archaeological survey data loading and merging tools.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trowel::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Default to warn-level logging unless verbose is requested; the
    // commands do their own user-facing output on stdout.
    let default_filter = if cli::is_verbose() {
        "trowel=debug"
    } else {
        "trowel=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    cli::run().await
}

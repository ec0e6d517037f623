//! `mailbridge` - drives Apple Mail through AppleScript.
//!
//! Reads one JSON request per line on stdin and writes one JSON response
//! per line on stdout. Logs go to stderr.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod dispatch;
mod settings;

use mailbridge_core::Mailer;
use mailbridge_script::OsascriptBridge;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dispatch::Dispatcher;
use settings::Settings;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // stdout carries responses
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mailbridge=info,mailbridge_core=info,mailbridge_script=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = Settings::load().await?;
    let config = settings.bridge_config();
    info!(
        application = %config.application,
        launch = config.launch,
        timeout = ?config.timeout,
        "Starting mailbridge"
    );

    let dispatcher = Dispatcher::new(
        Mailer::new(OsascriptBridge::new(config)),
        settings.default_limit(),
    );

    dispatcher
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
}

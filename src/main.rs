//! filmlog: operator CLI for the studio site's work log, inquiry inbox and
//! author session.

mod app;
mod cli;
mod commands;

use anyhow::Context;
use clap::Parser;
use tracing::Instrument;

use app::App;
use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => filmlog_settings::load_settings_from_path(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => filmlog_settings::load_settings().context("loading settings")?,
    };
    let data_dir = filmlog_settings::data_dir();
    let _telemetry = filmlog_telemetry::init_telemetry(app::telemetry_config(&settings, &data_dir));
    if filmlog_settings::init_settings(settings).is_err() {
        tracing::debug!("settings already initialized");
    }

    let app = App::new(filmlog_settings::get_settings(), data_dir);
    // `principal` is recorded once a session is restored.
    let span = tracing::info_span!(
        "command",
        command = cli.command.name(),
        principal = tracing::field::Empty,
    );
    commands::run(&app, cli.command).instrument(span).await
}

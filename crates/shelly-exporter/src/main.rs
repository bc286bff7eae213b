mod cli;
mod config;
mod error;
mod server;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, LogFormat};
use crate::error::ExporterError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose, cli.global.log_format);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, format: LogFormat) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout is reserved for command output
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> Result<(), ExporterError> {
    let (config, path) = config::load(&cli.global)?;
    let settings = config.resolve(&path)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::CheckConfig => {
            print!("{}", config.render()?);
            Ok(())
        }
        Command::Run => {
            tracing::info!(
                config = %path.display(),
                devices = settings.devices.len(),
                interval_secs = settings.update_interval.as_secs(),
                "starting exporter"
            );
            server::run(settings).await
        }
    }
}

//! dlnacast - cast local files and URLs to DLNA media renderers
//!
//! # Usage
//!
//! ```bash
//! dlnacast devices
//! dlnacast cast ~/Videos/movie.mp4 --device "Living Room TV"
//! dlnacast status --json
//! ```

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dlnacast::cli::{Cli, Command, ExitCode, Output};
use dlnacast::commands::{self, CastEnv};
use dlnacast::config::Config;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so JSON on stdout stays parseable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let exit_code = run_cli(cli).await;
    exit_code.into()
}

/// Run CLI command and return exit code
async fn run_cli(cli: Cli) -> ExitCode {
    let output = Output::new(&cli);

    let config = match &cli.config {
        Some(path) => match Config::load_from(path) {
            Ok(config) => config,
            Err(e) => return output.error(format!("{:#}", e), ExitCode::InvalidArgs),
        },
        None => Config::load(),
    };
    let env = CastEnv::new(config, cli.device.clone(), cli.port);

    match cli.command {
        Command::Devices(cmd) => commands::devices_cmd(cmd, &env, &output).await,

        Command::Serve(cmd) => commands::serve_cmd(cmd, &env, &output).await,

        Command::Cast(cmd) => commands::cast_cmd(cmd, &env, &output).await,

        Command::Status(cmd) => commands::status_cmd(cmd, &env, &output).await,

        Command::Play(cmd) => commands::play_cmd(cmd, &env, &output).await,

        Command::Pause(cmd) => commands::pause_cmd(cmd, &env, &output).await,

        Command::Stop(cmd) => commands::stop_cmd(cmd, &env, &output).await,

        Command::Seek(cmd) => commands::seek_cmd(cmd, &env, &output).await,

        Command::Volume(cmd) => commands::volume_cmd(cmd, &env, &output).await,
    }
}

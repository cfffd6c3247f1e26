//! CLI Command Handlers
//!
//! Implements all CLI commands on top of the casting subsystem.
//! Each handler takes CLI args, the shared [`CastEnv`] and Output, returns ExitCode.
//!
//! Commands other than `cast` and `serve` act on the session persisted by a
//! previous invocation: they rehydrate it from the session record and the
//! registry, then issue their one command.

use std::sync::Arc;
use std::time::Duration;

use crate::app::{App, AppOptions};
use crate::cast::store::{FileSessionStore, SessionStore};
use crate::cast::{CastError, CastEvent};
use crate::cli::{
    CastCmd, CastResponse, DeviceEntry, DevicesCmd, ExitCode, Output, PauseCmd, PlayCmd,
    PlaybackStatus, SeekCmd, SeekPosition, ServeCmd, ServeResponse, StatusCmd, StatusOk, StopCmd,
    VolumeCmd, VolumeLevel,
};
use crate::config::Config;
use crate::models::{CastSession, ContentSource, SessionRecord, TransportState};
use crate::sim::SimulatedNetwork;
use crate::stream::NetworkLock;

// =============================================================================
// Environment
// =============================================================================

/// What every handler shares: config, device selection, the network lock
pub struct CastEnv {
    pub config: Config,
    pub device: Option<String>,
    pub port: Option<u16>,
    pub lock: NetworkLock,
}

impl CastEnv {
    pub fn new(config: Config, device: Option<String>, port: Option<u16>) -> Self {
        Self {
            config,
            device,
            port,
            lock: NetworkLock::new("dlnacast"),
        }
    }

    /// Device selector: `--device`, then the configured default
    pub fn device_selector(&self) -> Option<&str> {
        self.device
            .as_deref()
            .or(self.config.default_device.as_deref())
    }

    pub fn options(&self) -> AppOptions {
        let mut options = AppOptions::from(&self.config);
        if let Some(port) = self.port {
            options.port = port;
        }
        options
    }

    fn persisted_record(&self) -> Option<SessionRecord> {
        let path = self.config.session_file()?;
        match FileSessionStore::new(path).load() {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read session record");
                None
            }
        }
    }

    /// Start the subsystem against the bundled simulated network
    ///
    /// Control-only commands bind an ephemeral port so they never collide
    /// with a `cast` or `serve` process holding the configured one.
    pub async fn start_app(&self, output: &Output, serving: bool) -> Result<App, ExitCode> {
        let network = SimulatedNetwork::new();
        // The simulated renderer carries on where the recorded session left it
        if let Some(record) = self.persisted_record() {
            if record.paused {
                network.assume_paused(&record.device_id, &record.title);
            } else {
                network.assume_playing(&record.device_id, &record.title);
            }
        }

        let mut options = self.options();
        if !serving {
            options.port = 0;
        }
        App::start(Arc::new(network), &self.lock, options)
            .await
            .map_err(|e| output.error(e.to_string(), ExitCode::NetworkError))
    }
}

/// Rehydrate the persisted session, or fail with the matching exit code
async fn restore_session(env: &CastEnv, app: &App, output: &Output) -> Result<CastSession, ExitCode> {
    let Some(record) = env.persisted_record() else {
        return Err(output.error("No active cast session", ExitCode::NoSession));
    };

    output.info(format!("Looking for {}...", record.device_name));
    if let Err(e) = app.find_device(Some(&record.device_id)).await {
        return Err(output.error(format!("Discovery failed: {}", e), ExitCode::NetworkError));
    }

    match app.controller().restore().await {
        Ok(Some(session)) => Ok(session),
        Ok(None) => Err(output.error("No active cast session", ExitCode::NoSession)),
        Err(e) => Err(output.cast_error(&e)),
    }
}

fn print_status(session: &CastSession, output: &Output) -> ExitCode {
    if output.json {
        if let Err(e) = output.print(PlaybackStatus::from(session)) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
    } else {
        println!("{}", session);
        if !session.title.is_empty() {
            println!("  {}", session.title);
        }
        if let Some(error) = &session.last_error {
            println!("  Last error: {}", error);
        }
    }
    ExitCode::Success
}

fn print_ok(output: &Output, message: impl std::fmt::Display) -> ExitCode {
    if output.json {
        if let Err(e) = output.print(StatusOk::default()) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
    } else if !output.quiet {
        println!("{}", message);
    }
    ExitCode::Success
}

// =============================================================================
// Devices Command
// =============================================================================

pub async fn devices_cmd(cmd: DevicesCmd, env: &CastEnv, output: &Output) -> ExitCode {
    let mut options = env.options();
    options.port = 0;
    if let Some(timeout) = cmd.timeout {
        options.search_timeout = Duration::from_secs(timeout);
    }

    let network = Arc::new(SimulatedNetwork::new());
    let app = match App::start(network, &env.lock, options).await {
        Ok(app) => app,
        Err(e) => return output.error(e.to_string(), ExitCode::NetworkError),
    };

    output.info("Searching for renderers...");
    let devices = match app.discover().await {
        Ok(devices) => devices,
        Err(e) => {
            app.shutdown().await;
            return output.error(format!("Discovery failed: {}", e), ExitCode::NetworkError);
        }
    };
    app.shutdown().await;

    if output.json {
        let entries: Vec<DeviceEntry> = devices.iter().map(DeviceEntry::from).collect();
        if let Err(e) = output.print(entries) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
    } else if devices.is_empty() {
        println!("No renderers found");
    } else {
        for device in &devices {
            println!("{}  [{}]", device, device.id);
        }
    }
    ExitCode::Success
}

// =============================================================================
// Serve Command
// =============================================================================

pub async fn serve_cmd(cmd: ServeCmd, env: &CastEnv, output: &Output) -> ExitCode {
    if !cmd.file.is_file() {
        return output.error(
            format!("File not found: {}", cmd.file.display()),
            ExitCode::ContentNotFound,
        );
    }

    let app = match env.start_app(output, true).await {
        Ok(app) => app,
        Err(code) => return code,
    };
    app.server().active().set(ContentSource::Local(cmd.file.clone()));

    let response = ServeResponse {
        status: "serving",
        url: app.media_url(),
        file: cmd.file.display().to_string(),
    };
    if output.json {
        if let Err(e) = output.print(&response) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
    } else {
        println!("Serving {} at {}", response.file, response.url);
    }
    output.info("Press Ctrl+C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Could not listen for Ctrl+C");
    }
    app.shutdown().await;
    ExitCode::Success
}

// =============================================================================
// Cast Command
// =============================================================================

pub async fn cast_cmd(cmd: CastCmd, env: &CastEnv, output: &Output) -> ExitCode {
    let source = ContentSource::parse(&cmd.source);
    let app = match env.start_app(output, true).await {
        Ok(app) => app,
        Err(code) => return code,
    };

    output.info("Searching for renderers...");
    let device = match app.find_device(env.device_selector()).await {
        Ok(Some(device)) => device,
        Ok(None) => {
            app.shutdown().await;
            let msg = match env.device_selector() {
                Some(selector) => format!("Device not found: {}", selector),
                None => "No renderers found".to_string(),
            };
            return output.error(msg, ExitCode::DeviceNotFound);
        }
        Err(e) => {
            app.shutdown().await;
            return output.error(format!("Discovery failed: {}", e), ExitCode::NetworkError);
        }
    };

    output.info(format!("Casting {} to {}...", source.title(), device.name));
    let controller = app.controller().clone();
    let session = match controller.start_cast(&device, source.clone()).await {
        Ok(session) => session,
        Err(e) => {
            if matches!(e, CastError::CommandFailed { .. }) {
                let _ = controller.stop().await;
            }
            app.shutdown().await;
            return output.cast_error(&e);
        }
    };

    let stream_url = match &source {
        ContentSource::Remote(url) => url.clone(),
        ContentSource::Local(_) => app.media_url(),
    };
    let response = CastResponse {
        status: "casting",
        device: session.device.name.clone(),
        title: session.title.clone(),
        stream_url,
    };
    if output.json {
        if let Err(e) = output.print(&response) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
    } else {
        println!("▶ Casting {} to {}", response.title, response.device);
    }

    if cmd.detach {
        // Serving stops with this process; only remote content keeps playing
        app.shutdown().await;
        return ExitCode::Success;
    }

    output.info("Press Ctrl+C to stop");
    follow_session(&app, output).await;

    if let Err(e) = controller.stop().await {
        tracing::warn!(error = %e, "Stop failed");
    }
    app.shutdown().await;
    output.info("⏹ Stopped");
    ExitCode::Success
}

/// Print session updates until Ctrl+C or the session ends
async fn follow_session(app: &App, output: &Output) {
    let mut watch = app.controller().watch();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = watch.next_event() => match event {
                Some(CastEvent::PositionUpdated { .. }) => {
                    if !output.json && !output.quiet {
                        if let Some(session) = app.controller().session() {
                            eprint!("\r{}   ", session);
                        }
                    }
                }
                Some(CastEvent::StateChanged(TransportState::Stopped)) | None => break,
                Some(CastEvent::Notice(msg)) => output.info(format!("\n{}", msg)),
                Some(_) => {}
            }
        }
    }
    if !output.json && !output.quiet {
        eprintln!();
    }
}

// =============================================================================
// Playback Control Commands
// =============================================================================

pub async fn status_cmd(_cmd: StatusCmd, env: &CastEnv, output: &Output) -> ExitCode {
    let app = match env.start_app(output, false).await {
        Ok(app) => app,
        Err(code) => return code,
    };

    let code = match restore_session(env, &app, output).await {
        Ok(_) => {
            app.controller().poll_position().await;
            app.controller().refresh_volume().await;
            match app.controller().session() {
                Some(session) => print_status(&session, output),
                None => ExitCode::NoSession,
            }
        }
        Err(ExitCode::NoSession) => {
            // Nothing cast is a status, not a failure
            if output.json {
                let _ = output.print(PlaybackStatus::default());
            } else {
                println!("Idle");
            }
            ExitCode::Success
        }
        Err(code) => code,
    };
    app.shutdown().await;
    code
}

pub async fn play_cmd(_cmd: PlayCmd, env: &CastEnv, output: &Output) -> ExitCode {
    let app = match env.start_app(output, false).await {
        Ok(app) => app,
        Err(code) => return code,
    };

    let code = match restore_session(env, &app, output).await {
        Ok(session) if session.transport_state == TransportState::Playing => {
            print_ok(output, "▶ Already playing")
        }
        Ok(_) => match app.controller().resume().await {
            Ok(()) => print_ok(output, "▶ Playing"),
            Err(e) => output.cast_error(&e),
        },
        Err(code) => code,
    };
    app.shutdown().await;
    code
}

pub async fn pause_cmd(_cmd: PauseCmd, env: &CastEnv, output: &Output) -> ExitCode {
    let app = match env.start_app(output, false).await {
        Ok(app) => app,
        Err(code) => return code,
    };

    let code = match restore_session(env, &app, output).await {
        Ok(_) => match app.controller().pause().await {
            Ok(()) => print_ok(output, "⏸ Paused"),
            Err(e) => output.cast_error(&e),
        },
        Err(code) => code,
    };
    app.shutdown().await;
    code
}

pub async fn stop_cmd(_cmd: StopCmd, env: &CastEnv, output: &Output) -> ExitCode {
    let app = match env.start_app(output, false).await {
        Ok(app) => app,
        Err(code) => return code,
    };

    let code = match restore_session(env, &app, output).await {
        Ok(_) => match app.controller().stop().await {
            Ok(()) => print_ok(output, "⏹ Stopped"),
            Err(e) => output.cast_error(&e),
        },
        Err(code) => code,
    };
    app.shutdown().await;
    code
}

pub async fn seek_cmd(cmd: SeekCmd, env: &CastEnv, output: &Output) -> ExitCode {
    let position = cmd.parse_position();
    if let SeekPosition::Invalid(raw) = &position {
        return output.error(format!("Invalid position: {}", raw), ExitCode::InvalidArgs);
    }

    let app = match env.start_app(output, false).await {
        Ok(app) => app,
        Err(code) => return code,
    };

    let code = match restore_session(env, &app, output).await {
        Ok(_) => {
            let controller = app.controller();
            // Relative seeks need a fresh position
            controller.poll_position().await;
            let result = match (&position, position.delta()) {
                (SeekPosition::Absolute(secs), _) => controller.seek(*secs).await,
                (_, Some(delta)) => controller.seek_by(delta).await,
                _ => Ok(()),
            };
            match result {
                Ok(()) => {
                    let at = controller
                        .session()
                        .map(|s| s.format_position())
                        .unwrap_or_default();
                    print_ok(output, format!("Seeked to {}", at))
                }
                Err(e) => output.cast_error(&e),
            }
        }
        Err(code) => code,
    };
    app.shutdown().await;
    code
}

pub async fn volume_cmd(cmd: VolumeCmd, env: &CastEnv, output: &Output) -> ExitCode {
    let level = cmd.parse_level();
    if let VolumeLevel::Invalid(raw) = &level {
        return output.error(format!("Invalid volume: {}", raw), ExitCode::InvalidArgs);
    }

    let app = match env.start_app(output, false).await {
        Ok(app) => app,
        Err(code) => return code,
    };

    let code = match restore_session(env, &app, output).await {
        Ok(_) => {
            let controller = app.controller();
            let result = match level {
                VolumeLevel::Absolute(volume) => controller.set_volume(i32::from(volume)).await,
                VolumeLevel::Relative(delta) => controller.adjust_volume(i32::from(delta)).await,
                VolumeLevel::Invalid(_) => Ok(()),
            };
            match result {
                Ok(()) => {
                    let volume = controller
                        .session()
                        .and_then(|s| s.volume_percent)
                        .map(|v| format!("{}%", v))
                        .unwrap_or_else(|| "unknown".to_string());
                    print_ok(output, format!("Volume {}", volume))
                }
                Err(e) => output.cast_error(&e),
            }
        }
        Err(code) => code,
    };
    app.shutdown().await;
    code
}

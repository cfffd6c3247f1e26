//! CLI Command Tests
//!
//! Argument parsing, JSON output format, exit codes, and the control
//! commands running against the bundled simulated network.

// =============================================================================
// CLI Argument Parsing Tests
// =============================================================================

mod cli_parsing {
    use clap::Parser;
    use dlnacast::cli::{Cli, Command, SeekCmd, SeekPosition, VolumeCmd, VolumeLevel};

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["dlnacast"]).is_err());
    }

    #[test]
    fn test_devices_command() {
        let cli = Cli::parse_from(["dlnacast", "devices", "--timeout", "3"]);
        match cli.command {
            Command::Devices(cmd) => assert_eq!(cmd.timeout, Some(3)),
            _ => panic!("Expected Devices command"),
        }
    }

    #[test]
    fn test_cast_command_with_url() {
        let cli = Cli::parse_from([
            "dlnacast",
            "cast",
            "https://example.com/song.mp3",
            "--detach",
        ]);
        match cli.command {
            Command::Cast(cmd) => {
                assert_eq!(cmd.source, "https://example.com/song.mp3");
                assert!(cmd.detach);
            }
            _ => panic!("Expected Cast command"),
        }
    }

    #[test]
    fn test_cast_requires_source() {
        assert!(Cli::try_parse_from(["dlnacast", "cast"]).is_err());
    }

    #[test]
    fn test_serve_command() {
        let cli = Cli::parse_from(["dlnacast", "serve", "/srv/movie.mkv"]);
        match cli.command {
            Command::Serve(cmd) => {
                assert_eq!(cmd.file, std::path::PathBuf::from("/srv/movie.mkv"))
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_playback_commands() {
        let cli = Cli::parse_from(["dlnacast", "play"]);
        assert!(matches!(cli.command, Command::Play(_)));

        let cli = Cli::parse_from(["dlnacast", "pause"]);
        assert!(matches!(cli.command, Command::Pause(_)));

        let cli = Cli::parse_from(["dlnacast", "stop"]);
        assert!(matches!(cli.command, Command::Stop(_)));

        let cli = Cli::parse_from(["dlnacast", "status"]);
        assert!(matches!(cli.command, Command::Status(_)));
    }

    #[test]
    fn test_seek_position_parsing_timestamp() {
        let cmd = SeekCmd {
            position: "1:02:03".to_string(),
        };
        assert_eq!(cmd.parse_position(), SeekPosition::Absolute(3723));

        let cmd = SeekCmd {
            position: "02:03".to_string(),
        };
        assert_eq!(cmd.parse_position(), SeekPosition::Absolute(123));
    }

    #[test]
    fn test_seek_position_parsing_relative() {
        let cli = Cli::parse_from(["dlnacast", "seek", "-15"]);
        match cli.command {
            Command::Seek(cmd) => {
                let position = cmd.parse_position();
                assert_eq!(position, SeekPosition::Backward(15));
                assert_eq!(position.delta(), Some(-15));
            }
            _ => panic!("Expected Seek command"),
        }

        let cmd = SeekCmd {
            position: "+45".to_string(),
        };
        assert_eq!(cmd.parse_position().delta(), Some(45));
        assert_eq!(SeekPosition::Absolute(10).delta(), None);
    }

    #[test]
    fn test_seek_position_parsing_invalid() {
        let cmd = SeekCmd {
            position: "1:xx".to_string(),
        };
        assert!(matches!(cmd.parse_position(), SeekPosition::Invalid(_)));
    }

    #[test]
    fn test_volume_parsing() {
        let cmd = VolumeCmd {
            level: "75".to_string(),
        };
        assert_eq!(cmd.parse_level(), VolumeLevel::Absolute(75));

        let cmd = VolumeCmd {
            level: "300".to_string(),
        };
        assert!(matches!(cmd.parse_level(), VolumeLevel::Invalid(_)));

        let cli = Cli::parse_from(["dlnacast", "volume", "-10"]);
        match cli.command {
            Command::Volume(cmd) => assert_eq!(cmd.parse_level(), VolumeLevel::Relative(-10)),
            _ => panic!("Expected Volume command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "dlnacast",
            "pause",
            "--device",
            "Kitchen Speaker",
            "--config",
            "/etc/dlnacast.toml",
            "-v",
        ]);
        assert_eq!(cli.device.as_deref(), Some("Kitchen Speaker"));
        assert_eq!(
            cli.config,
            Some(std::path::PathBuf::from("/etc/dlnacast.toml"))
        );
        assert_eq!(cli.log_filter(), "dlnacast=debug");
    }

    #[test]
    fn test_command_aliases() {
        let cli = Cli::parse_from(["dlnacast", "dev"]);
        assert!(matches!(cli.command, Command::Devices(_)));

        let cli = Cli::parse_from(["dlnacast", "vol", "50"]);
        assert!(matches!(cli.command, Command::Volume(_)));
    }
}

// =============================================================================
// Exit Code Tests
// =============================================================================

mod exit_codes {
    use dlnacast::cast::control::Command;
    use dlnacast::cast::CastError;
    use dlnacast::cli::ExitCode;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::Error), 1);
        assert_eq!(i32::from(ExitCode::InvalidArgs), 2);
        assert_eq!(i32::from(ExitCode::NetworkError), 3);
        assert_eq!(i32::from(ExitCode::DeviceNotFound), 4);
        assert_eq!(i32::from(ExitCode::ContentNotFound), 5);
        assert_eq!(i32::from(ExitCode::CastFailed), 6);
        assert_eq!(i32::from(ExitCode::NoSession), 7);
    }

    #[test]
    fn test_cast_errors_map_to_exit_codes() {
        let cases = vec![
            (CastError::NotFound("x.mp4".into()), ExitCode::ContentNotFound),
            (CastError::UnsupportedDevice("NAS".into()), ExitCode::DeviceNotFound),
            (CastError::DeviceLost("TV".into()), ExitCode::DeviceNotFound),
            (CastError::NetworkUnavailable, ExitCode::NetworkError),
            (
                CastError::CommandFailed {
                    command: Command::Play,
                    reason: "701".into(),
                },
                ExitCode::CastFailed,
            ),
            (CastError::NoSession, ExitCode::NoSession),
            (CastError::Busy, ExitCode::Error),
        ];

        for (err, expected) in cases {
            assert_eq!(ExitCode::from(&err), expected, "{}", err);
        }
    }
}

// =============================================================================
// JSON Output Format Tests
// =============================================================================

mod json_output {
    use dlnacast::cli::{DeviceEntry, ExitCode, JsonOutput, PlaybackStatus, StatusOk};
    use dlnacast::models::{Capability, RendererDevice, TransportState};

    #[test]
    fn test_json_output_success() {
        let output = JsonOutput::success(StatusOk::default());
        let json = serde_json::to_string(&output).unwrap();

        assert_eq!(json, r#"{"data":{"status":"ok"}}"#);
    }

    #[test]
    fn test_json_output_error() {
        let output = JsonOutput::<()>::error_msg("No active cast session", ExitCode::NoSession);
        let json = serde_json::to_string(&output).unwrap();

        assert!(json.contains("\"error\":\"No active cast session\""));
        assert!(json.contains("\"exit_code\":7"));
        assert!(!json.contains("\"data\""));
    }

    #[test]
    fn test_playback_status_idle() {
        let json = serde_json::to_string(&PlaybackStatus::default()).unwrap();
        assert_eq!(json, r#"{"state":"idle"}"#);
    }

    #[test]
    fn test_playback_status_error_carries_reason() {
        let status = PlaybackStatus {
            state: TransportState::Error,
            error: Some("714 Illegal MIME-type".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["state"], "error");
        assert_eq!(json["error"], "714 Illegal MIME-type");
    }

    #[test]
    fn test_device_entry() {
        let device = RendererDevice::new("uuid:tv", "TV")
            .with_capability(Capability::AvTransport)
            .with_address("192.168.1.50".parse().unwrap());
        let json = serde_json::to_value(DeviceEntry::from(&device)).unwrap();

        assert_eq!(json["id"], "uuid:tv");
        assert_eq!(json["address"], "192.168.1.50");
        assert_eq!(json["capabilities"].as_array().unwrap().len(), 1);
        assert!(json.get("model").is_none());
    }
}

// =============================================================================
// Output Helper Tests
// =============================================================================

mod output_helpers {
    use clap::Parser;
    use dlnacast::cli::{Cli, ExitCode, Output};

    #[test]
    fn test_output_json_mode() {
        let cli = Cli::parse_from(["dlnacast", "--json", "status"]);
        let output = Output::new(&cli);
        assert!(output.json);
    }

    #[test]
    fn test_output_quiet_mode() {
        let cli = Cli::parse_from(["dlnacast", "--quiet", "status"]);
        let output = Output::new(&cli);
        assert!(output.quiet);
    }

    #[test]
    fn test_error_returns_its_code() {
        let output = Output {
            json: false,
            quiet: true,
        };
        assert_eq!(output.error("boom", ExitCode::CastFailed), ExitCode::CastFailed);
    }
}

// =============================================================================
// Control Command Tests
// =============================================================================

mod control_commands {
    use std::path::PathBuf;

    use dlnacast::cast::store::{FileSessionStore, SessionStore};
    use dlnacast::cli::{
        ExitCode, Output, PauseCmd, PlayCmd, SeekCmd, StatusCmd, StopCmd, VolumeCmd,
    };
    use dlnacast::commands::{
        pause_cmd, play_cmd, seek_cmd, status_cmd, stop_cmd, volume_cmd, CastEnv,
    };
    use dlnacast::config::Config;
    use dlnacast::models::SessionRecord;

    fn env_with(session_file: PathBuf) -> CastEnv {
        let config = Config {
            session_file: Some(session_file),
            search_timeout_secs: Some(1),
            ..Default::default()
        };
        CastEnv::new(config, None, None)
    }

    fn quiet() -> Output {
        Output {
            json: false,
            quiet: true,
        }
    }

    fn record(device_id: &str, device_name: &str) -> SessionRecord {
        SessionRecord {
            device_id: device_id.into(),
            title: "movie.mp4".into(),
            device_name: device_name.into(),
            paused: false,
        }
    }

    #[tokio::test]
    async fn test_status_without_session_is_idle() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_with(dir.path().join("session.json"));

        assert_eq!(status_cmd(StatusCmd {}, &env, &quiet()).await, ExitCode::Success);
        assert!(!env.lock.is_held());
    }

    #[tokio::test]
    async fn test_pause_without_session() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_with(dir.path().join("session.json"));

        assert_eq!(pause_cmd(PauseCmd {}, &env, &quiet()).await, ExitCode::NoSession);
    }

    #[tokio::test]
    async fn test_invalid_seek_is_rejected_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_with(dir.path().join("session.json"));
        let cmd = SeekCmd {
            position: "later".into(),
        };

        assert_eq!(seek_cmd(cmd, &env, &quiet()).await, ExitCode::InvalidArgs);
        assert_eq!(env.lock.release_count(), 0);
    }

    #[tokio::test]
    async fn test_control_commands_pick_up_persisted_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileSessionStore::new(&path);
        store
            .save(&record("uuid:sim-living-room", "Living Room TV"))
            .unwrap();
        let env = env_with(path.clone());

        assert_eq!(pause_cmd(PauseCmd {}, &env, &quiet()).await, ExitCode::Success);
        let cmd = VolumeCmd {
            level: "+5".into(),
        };
        assert_eq!(volume_cmd(cmd, &env, &quiet()).await, ExitCode::Success);
        assert!(path.exists());

        assert_eq!(stop_cmd(StopCmd {}, &env, &quiet()).await, ExitCode::Success);
        assert!(!path.exists());
        assert_eq!(store.load().unwrap(), None);
    }

    #[tokio::test]
    async fn test_play_after_pause_in_another_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileSessionStore::new(&path);
        store
            .save(&record("uuid:sim-living-room", "Living Room TV"))
            .unwrap();
        let env = env_with(path.clone());

        assert_eq!(pause_cmd(PauseCmd {}, &env, &quiet()).await, ExitCode::Success);
        assert!(store.load().unwrap().unwrap().paused);

        assert_eq!(play_cmd(PlayCmd {}, &env, &quiet()).await, ExitCode::Success);
        assert!(!store.load().unwrap().unwrap().paused);
    }

    #[tokio::test]
    async fn test_persisted_device_gone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        FileSessionStore::new(&path)
            .save(&record("uuid:unplugged", "Bedroom TV"))
            .unwrap();
        let env = env_with(path.clone());

        assert_eq!(
            pause_cmd(PauseCmd {}, &env, &quiet()).await,
            ExitCode::DeviceNotFound
        );
        // The stale record is dropped
        assert!(!path.exists());
    }
}

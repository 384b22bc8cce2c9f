//! `mbot`: command-line client for the MBot Bridge server.
//!
//! Reads sensor channels, sends motion commands, and follows subscriptions
//! from a terminal.  Every subcommand opens its own connections and exits
//! when done.
//!
//! # Usage
//!
//! ```text
//! mbot [OPTIONS] <COMMAND>
//!
//! Commands:
//!   hostname        Print the robot's hostname
//!   channels        List the channels the server carries
//!   odometry        Print the wheel-odometry pose
//!   slam-pose       Print the SLAM pose
//!   lidar           Print the latest lidar scan
//!   map             Summarize the current SLAM map
//!   read            Print the raw data on any channel
//!   drive           Send one velocity command
//!   stop            Stop the robot
//!   reset-odometry  Reset odometry to the origin
//!   reset-slam      Restart SLAM
//!   subscribe       Print every message pushed on a channel
//!
//! Options:
//!   --host <HOST>                 Bridge server host [env: MBOT_HOST]
//!   --port <PORT>                 Bridge server port [env: MBOT_PORT]
//!   --config <PATH>               TOML configuration file [env: MBOT_CONFIG]
//!   --request-timeout <MILLIS>    Request timeout in milliseconds
//! ```
//!
//! Settings are layered: built-in defaults, then the config file, then
//! command-line flags and environment variables.
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mbot_client::application::SubscriptionHandler;
use mbot_client::infrastructure::load_config;
use mbot_client::{connect, ClientConfig, ClientError, MBot};
use mbot_core::messages::{OccupancyGrid, SlamReset, DEFAULT_MAP_FILE, SLAM_MODE_KEEP};
use mbot_core::Envelope;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Command-line client for the MBot Bridge server.
#[derive(Debug, Parser)]
#[command(name = "mbot", about = "Command-line client for the MBot Bridge server", version)]
struct Cli {
    /// Hostname or IP address of the bridge server.
    #[arg(long, global = true, env = "MBOT_HOST")]
    host: Option<String>,

    /// WebSocket port of the bridge server.
    #[arg(long, global = true, env = "MBOT_PORT")]
    port: Option<u16>,

    /// TOML configuration file.  A missing file means defaults.
    #[arg(long, global = true, env = "MBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Request timeout in milliseconds.
    #[arg(long, global = true)]
    request_timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand, PartialEq)]
enum Command {
    /// Print the robot's hostname.
    Hostname,
    /// List the channels the server carries.
    Channels,
    /// Print the wheel-odometry pose.
    Odometry,
    /// Print the SLAM pose.
    SlamPose,
    /// Print the latest lidar scan.
    Lidar,
    /// Summarize the current SLAM map.
    Map,
    /// Print the raw data on any channel (logical or wire name).
    Read { channel: String },
    /// Send one velocity command.
    Drive {
        /// Forward velocity in m/s.
        #[arg(allow_negative_numbers = true)]
        vx: f32,
        /// Sideways velocity in m/s.
        #[arg(allow_negative_numbers = true)]
        vy: f32,
        /// Angular velocity in rad/s.
        #[arg(allow_negative_numbers = true)]
        wz: f32,
    },
    /// Stop the robot and clear its path.
    Stop,
    /// Reset odometry to the origin.
    ResetOdometry,
    /// Restart SLAM.
    ResetSlam {
        /// SLAM mode; 99 keeps the current mode.
        #[arg(long, default_value_t = SLAM_MODE_KEEP)]
        mode: i32,
        /// Keep the current pose across the reset.
        #[arg(long)]
        retain_pose: bool,
        /// Map file the robot loads or saves.
        #[arg(long, default_value = DEFAULT_MAP_FILE)]
        map_file: String,
    },
    /// Print every message pushed on a channel until Ctrl+C.
    Subscribe {
        channel: String,
        /// Stop after this many messages.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        count: Option<u64>,
    },
}

impl Cli {
    /// Builds the client configuration: file first, then flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed.
    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("cannot load config from {}", path.display()))?,
            None => ClientConfig::default(),
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(millis) = self.request_timeout {
            config.request_timeout = Duration::from_millis(millis);
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.client_config()?;
    info!("using bridge server at {}", config.uri());

    let robot = connect(config);
    let result = run(&robot, cli.command).await;
    robot.shutdown().await;
    result
}

async fn run(robot: &MBot, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Hostname => println!("{}", robot.read_hostname().await?),
        Command::Channels => {
            for listing in robot.read_channels().await? {
                println!("{}", listing.name());
            }
        }
        Command::Odometry => print_json(&robot.read_odometry().await?)?,
        Command::SlamPose => print_json(&robot.read_slam_pose().await?)?,
        Command::Lidar => print_json(&robot.read_lidar().await?)?,
        Command::Map => println!("{}", summarize_map(&robot.read_map().await?)),
        Command::Read { channel } => print_json(&robot.read_data(&channel).await?)?,
        Command::Drive { vx, vy, wz } => robot.drive(vx, vy, wz).await?,
        Command::Stop => robot.stop().await?,
        Command::ResetOdometry => robot.reset_odometry().await?,
        Command::ResetSlam {
            mode,
            retain_pose,
            map_file,
        } => {
            let reset = SlamReset {
                slam_mode: mode,
                retain_pose,
                slam_map_location: map_file,
            };
            robot.reset_slam(&reset).await?;
        }
        Command::Subscribe { channel, count } => follow(robot, &channel, count).await?,
    }
    Ok(())
}

// ── Subscribe ─────────────────────────────────────────────────────────────────

/// Forwards pushes and errors from the session actor to the main task.
struct ForwardingHandler {
    tx: mpsc::UnboundedSender<Result<Envelope, ClientError>>,
}

impl SubscriptionHandler for ForwardingHandler {
    fn on_message(&mut self, envelope: Envelope) {
        let _ = self.tx.send(Ok(envelope));
    }

    fn on_error(&mut self, error: ClientError) {
        let _ = self.tx.send(Err(error));
    }
}

/// Prints pushes on `channel` until `count` is reached, the subscription
/// ends, or Ctrl+C.
async fn follow(robot: &MBot, channel: &str, count: Option<u64>) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    robot
        .subscribe(channel, ForwardingHandler { tx })
        .await
        .with_context(|| format!("cannot subscribe to {channel}"))?;
    info!("subscribed to {channel}");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut seen = 0u64;

    loop {
        tokio::select! {
            item = rx.recv() => match item {
                Some(Ok(envelope)) => {
                    print_json(&envelope.data)?;
                    seen += 1;
                    if count.is_some_and(|limit| seen >= limit) {
                        break;
                    }
                }
                Some(Err(e)) => warn!("{channel}: {e}"),
                None => {
                    info!("{channel}: subscription ended by the server");
                    return Ok(());
                }
            },
            _ = &mut ctrl_c => {
                info!("received Ctrl+C");
                break;
            }
        }
    }

    robot
        .unsubscribe(channel)
        .await
        .with_context(|| format!("cannot unsubscribe from {channel}"))
}

// ── Output ────────────────────────────────────────────────────────────────────

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn summarize_map(grid: &OccupancyGrid) -> String {
    let occupied = grid.cells.iter().filter(|&&c| c > 0).count();
    let free = grid.cells.iter().filter(|&&c| c < 0).count();
    format!(
        "{}x{} cells at {} m/cell, origin ({}, {}); {occupied} occupied, {free} free, {} unknown",
        grid.width,
        grid.height,
        grid.meters_per_cell,
        grid.origin[0],
        grid.origin[1],
        grid.cells.len() - occupied - free
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_hostname() {
        let cli = Cli::parse_from(["mbot", "hostname"]);
        assert_eq!(cli.command, Command::Hostname);
    }

    #[test]
    fn test_cli_drive_accepts_negative_velocities() {
        // Arrange / Act
        let cli = Cli::parse_from(["mbot", "drive", "0.2", "-0.1", "-1.5"]);

        // Assert
        assert_eq!(
            cli.command,
            Command::Drive {
                vx: 0.2,
                vy: -0.1,
                wz: -1.5
            }
        );
    }

    #[test]
    fn test_cli_reset_slam_defaults() {
        let cli = Cli::parse_from(["mbot", "reset-slam"]);
        assert_eq!(
            cli.command,
            Command::ResetSlam {
                mode: 99,
                retain_pose: false,
                map_file: "current.map".to_string()
            }
        );
    }

    #[test]
    fn test_cli_reset_slam_overrides() {
        let cli = Cli::parse_from([
            "mbot",
            "reset-slam",
            "--mode",
            "1",
            "--retain-pose",
            "--map-file",
            "lab.map",
        ]);
        assert_eq!(
            cli.command,
            Command::ResetSlam {
                mode: 1,
                retain_pose: true,
                map_file: "lab.map".to_string()
            }
        );
    }

    #[test]
    fn test_cli_subscribe_with_count() {
        let cli = Cli::parse_from(["mbot", "subscribe", "ODOMETRY", "--count", "3"]);
        assert_eq!(
            cli.command,
            Command::Subscribe {
                channel: "ODOMETRY".to_string(),
                count: Some(3)
            }
        );
    }

    #[test]
    fn test_cli_subscribe_rejects_zero_count() {
        let result = Cli::try_parse_from(["mbot", "subscribe", "LIDAR", "--count", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["mbot"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["mbot", "odometry", "--host", "mbot-03", "--port", "6000"]);
        assert_eq!(cli.host.as_deref(), Some("mbot-03"));
        assert_eq!(cli.port, Some(6000));
    }

    #[test]
    fn test_client_config_overlays_flags_on_defaults() {
        // Arrange
        let cli = Cli {
            host: Some("10.0.0.7".to_string()),
            port: None,
            config: None,
            request_timeout: Some(250),
            command: Command::Hostname,
        };

        // Act
        let config = cli.client_config().unwrap();

        // Assert
        assert_eq!(config.host, "10.0.0.7");
        assert_eq!(config.port, 5005);
        assert_eq!(config.request_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_client_config_flags_override_file() {
        // Arrange
        let path = std::env::temp_dir().join(format!("mbot-cli-{}.toml", std::process::id()));
        std::fs::write(&path, "[bridge]\nhost = \"from-file\"\nport = 7007\n").unwrap();
        let cli = Cli {
            host: None,
            port: Some(8008),
            config: Some(path.clone()),
            request_timeout: None,
            command: Command::Stop,
        };

        // Act
        let result = cli.client_config();
        let _ = std::fs::remove_file(&path);

        // Assert
        let config = result.unwrap();
        assert_eq!(config.host, "from-file");
        assert_eq!(config.port, 8008);
    }

    #[test]
    fn test_client_config_malformed_file_is_error() {
        let path = std::env::temp_dir().join(format!("mbot-cli-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[bridge\n").unwrap();
        let cli = Cli {
            host: None,
            port: None,
            config: Some(path.clone()),
            request_timeout: None,
            command: Command::Stop,
        };

        let result = cli.client_config();
        let _ = std::fs::remove_file(&path);

        assert!(result.is_err());
    }

    #[test]
    fn test_forwarding_handler_passes_messages_and_errors() {
        // Arrange
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handler = ForwardingHandler { tx };

        // Act
        handler.on_message(Envelope::request("LIDAR"));
        handler.on_error(ClientError::SessionClosed);

        // Assert
        assert!(matches!(rx.try_recv(), Ok(Ok(_))));
        assert!(matches!(rx.try_recv(), Ok(Err(ClientError::SessionClosed))));
    }

    #[test]
    fn test_summarize_map_counts_cells() {
        let grid = OccupancyGrid {
            width: 2,
            height: 2,
            meters_per_cell: 0.05,
            origin: [-1.0, -1.0],
            num_cells: 4,
            cells: vec![-1, 0, 100, 0],
        };
        assert_eq!(
            summarize_map(&grid),
            "2x2 cells at 0.05 m/cell, origin (-1, -1); 1 occupied, 1 free, 2 unknown"
        );
    }
}

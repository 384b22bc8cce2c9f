//! Convenience facade over a [`Session`].
//!
//! [`MBot`] speaks in logical channels and typed payloads: it resolves wire
//! names through the channel registry, serializes commands, and decodes
//! replies into `mbot_core` message types.
//!
//! ```no_run
//! use mbot_client::{connect, domain::ClientConfig};
//!
//! # async fn example() -> Result<(), mbot_client::ClientError> {
//! let robot = connect(ClientConfig::new("mbot-01.local", 5005));
//! let pose = robot.read_odometry().await?;
//! robot.drive(0.2, 0.0, 0.0).await?;
//! robot.stop().await?;
//! # Ok(())
//! # }
//! ```

use mbot_core::channels::{resolve_wire_name, Channel, CHANNELS, HOSTNAME};
use mbot_core::messages::{
    decode_occupancy_grid, from_data, ChannelListing, LidarScan, OccupancyGrid, Path2D,
    PayloadError, Pose2D, SlamReset, Twist2D,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::application::error::ClientError;
use crate::application::session::{Session, SubscriptionHandler};
use crate::domain::SubscriptionState;

/// High-level handle to one robot.
#[derive(Clone)]
pub struct MBot {
    session: Session,
}

impl MBot {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// The underlying session, for raw envelope access.
    pub fn session(&self) -> &Session {
        &self.session
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    /// Reads the raw `data` of the latest message on `channel`.
    ///
    /// `channel` may be a logical name (`ODOMETRY`) or a wire name
    /// (`MBOT_ODOMETRY`).  A response without data reads as `Value::Null`.
    pub async fn read_data(&self, channel: &str) -> Result<Value, ClientError> {
        let wire = resolve_wire_name(channel);
        let envelope = self.session.request(wire).await?;
        Ok(envelope.data.unwrap_or(Value::Null))
    }

    /// Reads the robot's hostname.
    pub async fn read_hostname(&self) -> Result<String, ClientError> {
        self.read_as(HOSTNAME).await
    }

    /// Lists the channels the server currently carries.
    pub async fn read_channels(&self) -> Result<Vec<ChannelListing>, ClientError> {
        self.read_as(CHANNELS).await
    }

    /// Reads the wheel-odometry pose.
    pub async fn read_odometry(&self) -> Result<Pose2D, ClientError> {
        self.read_as(Channel::Odometry.wire_name()).await
    }

    /// Reads the SLAM pose estimate.
    pub async fn read_slam_pose(&self) -> Result<Pose2D, ClientError> {
        self.read_as(Channel::SlamPose.wire_name()).await
    }

    /// Reads the latest lidar scan.
    pub async fn read_lidar(&self) -> Result<LidarScan, ClientError> {
        self.read_as(Channel::Lidar.wire_name()).await
    }

    /// Reads the current SLAM map with its cells decoded.
    pub async fn read_map(&self) -> Result<OccupancyGrid, ClientError> {
        let channel = Channel::SlamMap.wire_name();
        let data = self.read_data(channel).await?;
        decode_occupancy_grid(&data).map_err(|e| ClientError::payload(channel, e))
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    /// Sends a velocity command: `vx`, `vy` in m/s, `wz` in rad/s.
    pub async fn drive(&self, vx: f32, vy: f32, wz: f32) -> Result<(), ClientError> {
        self.publish(Channel::MotorVelCmd, &Twist2D::new(vx, vy, wz))
            .await
    }

    /// Halts the robot: a zero velocity command, then an empty path so the
    /// motion controller drops its current goal.
    pub async fn stop(&self) -> Result<(), ClientError> {
        info!("stopping robot");
        self.publish(Channel::MotorVelCmd, &Twist2D::zero()).await?;
        self.publish(Channel::ControllerPath, &Path2D::empty()).await
    }

    /// Resets odometry to the origin.
    pub async fn reset_odometry(&self) -> Result<(), ClientError> {
        self.publish(Channel::ResetOdometry, &Pose2D::default())
            .await
    }

    /// Sends a path to the motion controller.
    ///
    /// Paths of zero or one pose carry no motion and are not sent.
    pub async fn drive_path(&self, path: &[Pose2D]) -> Result<(), ClientError> {
        if path.len() <= 1 {
            debug!("ignoring path with {} pose(s)", path.len());
            return Ok(());
        }
        self.publish(Channel::ControllerPath, &Path2D::new(path.to_vec()))
            .await
    }

    /// Restarts SLAM.  [`SlamReset::default`] keeps the current mode, drops
    /// the pose, and uses `current.map`.
    pub async fn reset_slam(&self, reset: &SlamReset) -> Result<(), ClientError> {
        info!(
            "resetting SLAM (mode {}, retain pose {}, map {})",
            reset.slam_mode, reset.retain_pose, reset.slam_map_location
        );
        self.publish(Channel::MbotSystemReset, reset).await
    }

    // ── Subscriptions ─────────────────────────────────────────────────────────

    /// Subscribes `handler` to `channel` (logical or wire name).
    pub async fn subscribe<H>(&self, channel: &str, handler: H) -> Result<(), ClientError>
    where
        H: SubscriptionHandler,
    {
        self.session
            .subscribe(resolve_wire_name(channel), handler)
            .await
    }

    /// Ends the subscription on `channel` (logical or wire name).
    pub async fn unsubscribe(&self, channel: &str) -> Result<(), ClientError> {
        self.session.unsubscribe(resolve_wire_name(channel)).await
    }

    pub async fn subscriptions(&self) -> Result<Vec<(String, SubscriptionState)>, ClientError> {
        self.session.subscriptions().await
    }

    /// Closes every subscription and stops the session.
    pub async fn shutdown(&self) {
        self.session.shutdown().await
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    async fn read_as<T: DeserializeOwned>(&self, channel: &str) -> Result<T, ClientError> {
        let data = self.read_data(channel).await?;
        from_data(data).map_err(|e| ClientError::payload(channel, e))
    }

    async fn publish<T: Serialize>(&self, channel: Channel, payload: &T) -> Result<(), ClientError> {
        let wire = channel.wire_name();
        let data = serde_json::to_value(payload)
            .map_err(|e| ClientError::payload(wire, PayloadError::Json(e)))?;
        self.session.publish(wire, channel.dtype(), data).await
    }
}

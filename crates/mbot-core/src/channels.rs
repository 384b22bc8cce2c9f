//! Static channel registry.
//!
//! Maps the logical channel names used by applications (`ODOMETRY`,
//! `SLAM_MAP`, ...) to the wire channel names and LCM payload type tags the
//! bridge server understands.  The table is compiled in and never mutated.
//!
//! | Logical             | Wire                  | dtype               |
//! |---------------------|-----------------------|---------------------|
//! | `ODOMETRY`          | `MBOT_ODOMETRY`       | `pose2D_t`          |
//! | `RESET_ODOMETRY`    | `MBOT_ODOMETRY_RESET` | `pose2D_t`          |
//! | `CONTROLLER_PATH`   | `CONTROLLER_PATH`     | `path2D_t`          |
//! | `MOTOR_VEL_CMD`     | `MBOT_VEL_CMD`        | `twist2D_t`         |
//! | `LIDAR`             | `LIDAR`               | `lidar_t`           |
//! | `SLAM_MAP`          | `SLAM_MAP`            | `occupancy_grid_t`  |
//! | `SLAM_POSE`         | `SLAM_POSE`           | `pose2D_t`          |
//! | `MBOT_SYSTEM_RESET` | `MBOT_SYSTEM_RESET`   | `mbot_slam_reset_t` |
//!
//! Two further read-only channels, [`HOSTNAME`] and [`CHANNELS`], are
//! answered by the server itself and have no registry entry.

use std::fmt;
use std::str::FromStr;

/// LCM multicast address the bridge server listens on.
pub const LCM_ADDRESS: &str = "udpm://239.255.76.67:7667?ttl=1";

/// Read-only channel answering with the robot's hostname (a string).
pub const HOSTNAME: &str = "HOSTNAME";

/// Read-only channel answering with the list of active channels.
pub const CHANNELS: &str = "CHANNELS";

/// Immutable registry entry: where a logical channel lives on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelDescriptor {
    /// Channel name as sent in the envelope's `channel` field.
    pub wire_name: &'static str,
    /// Payload type tag sent in the envelope's `dtype` field.
    pub dtype: &'static str,
}

/// A logical channel known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Odometry,
    ResetOdometry,
    ControllerPath,
    MotorVelCmd,
    Lidar,
    SlamMap,
    SlamPose,
    MbotSystemReset,
}

impl Channel {
    /// Every registered channel.
    pub const ALL: [Channel; 8] = [
        Channel::Odometry,
        Channel::ResetOdometry,
        Channel::ControllerPath,
        Channel::MotorVelCmd,
        Channel::Lidar,
        Channel::SlamMap,
        Channel::SlamPose,
        Channel::MbotSystemReset,
    ];

    /// Returns the registry entry for this channel.
    pub const fn descriptor(self) -> ChannelDescriptor {
        let (wire_name, dtype) = match self {
            Channel::Odometry => ("MBOT_ODOMETRY", "pose2D_t"),
            Channel::ResetOdometry => ("MBOT_ODOMETRY_RESET", "pose2D_t"),
            Channel::ControllerPath => ("CONTROLLER_PATH", "path2D_t"),
            Channel::MotorVelCmd => ("MBOT_VEL_CMD", "twist2D_t"),
            Channel::Lidar => ("LIDAR", "lidar_t"),
            Channel::SlamMap => ("SLAM_MAP", "occupancy_grid_t"),
            Channel::SlamPose => ("SLAM_POSE", "pose2D_t"),
            Channel::MbotSystemReset => ("MBOT_SYSTEM_RESET", "mbot_slam_reset_t"),
        };
        ChannelDescriptor { wire_name, dtype }
    }

    /// The logical name, e.g. `"MOTOR_VEL_CMD"`.
    pub const fn logical_name(self) -> &'static str {
        match self {
            Channel::Odometry => "ODOMETRY",
            Channel::ResetOdometry => "RESET_ODOMETRY",
            Channel::ControllerPath => "CONTROLLER_PATH",
            Channel::MotorVelCmd => "MOTOR_VEL_CMD",
            Channel::Lidar => "LIDAR",
            Channel::SlamMap => "SLAM_MAP",
            Channel::SlamPose => "SLAM_POSE",
            Channel::MbotSystemReset => "MBOT_SYSTEM_RESET",
        }
    }

    pub const fn wire_name(self) -> &'static str {
        self.descriptor().wire_name
    }

    pub const fn dtype(self) -> &'static str {
        self.descriptor().dtype
    }

    /// Looks up a channel by its logical name (`"ODOMETRY"`).
    pub fn from_logical_name(name: &str) -> Option<Channel> {
        Channel::ALL.into_iter().find(|ch| ch.logical_name() == name)
    }

    /// Looks up a channel by its wire name (`"MBOT_ODOMETRY"`).
    pub fn from_wire_name(name: &str) -> Option<Channel> {
        Channel::ALL.into_iter().find(|ch| ch.wire_name() == name)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.logical_name())
    }
}

/// Error returned when a name matches no registered channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel: {0:?}")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    /// Accepts either the logical name or the wire name, case-sensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::from_logical_name(s)
            .or_else(|| Channel::from_wire_name(s))
            .ok_or_else(|| UnknownChannel(s.to_string()))
    }
}

/// Resolves a user-supplied channel name to the name sent on the wire.
///
/// Logical names are translated through the registry; anything else
/// (wire names, [`HOSTNAME`], [`CHANNELS`], unregistered channels) passes
/// through unchanged.
pub fn resolve_wire_name(name: &str) -> &str {
    Channel::from_logical_name(name).map_or(name, |ch| ch.wire_name())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! # mbot-core
//!
//! Shared protocol library for the MBot Bridge client: the JSON envelope
//! codec, the static channel registry, and the typed payloads the bridge
//! server exchanges.
//!
//! This crate does no I/O and has no async runtime dependency.  Everything
//! that touches a socket lives in `mbot-client`.
//!
//! - **`protocol`** – The [`Envelope`] unit of exchange and its text codec.
//!   Decoding is total: malformed frames become [`Decoded::Invalid`].
//!
//! - **`channels`** – Logical channel names (`ODOMETRY`, `SLAM_MAP`, ...)
//!   mapped to their wire names and LCM type tags.
//!
//! - **`messages`** – `pose2D_t`, `twist2D_t`, `path2D_t`, `lidar_t`,
//!   `occupancy_grid_t` and friends as serde types.

pub mod channels;
pub mod messages;
pub mod protocol;

pub use channels::{resolve_wire_name, Channel, ChannelDescriptor, UnknownChannel};
pub use messages::{
    decode_occupancy_grid, ChannelHeader, ChannelListing, LidarScan, OccupancyGrid, Path2D,
    PayloadError, Pose2D, SlamReset, Twist2D,
};
pub use protocol::codec::{decode, encode};
pub use protocol::messages::{Decoded, Envelope, MessageKind};

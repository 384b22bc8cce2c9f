//! Typed payloads carried in the `data` field of an envelope.
//!
//! The bridge server converts LCM messages to JSON objects whose fields match
//! the LCM type definitions.  Only the handful of types the client helpers
//! need are modelled here; anything else stays a raw [`serde_json::Value`].
//!
//! Occupancy grids are special: the server keeps the cell array as raw bytes
//! and ships it base64-encoded, so [`decode_occupancy_grid`] does a second
//! decoding pass instead of a plain serde conversion.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Default map file used by [`SlamReset::default`].
pub const DEFAULT_MAP_FILE: &str = "current.map";

/// SLAM mode value that keeps the mode the robot is already in.
pub const SLAM_MODE_KEEP: i32 = 99;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failure to turn an envelope's `data` into a typed payload.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// The JSON value does not have the expected shape.
    #[error("payload does not match the expected type: {0}")]
    Json(#[from] serde_json::Error),

    /// The occupancy grid's `cells` field is not valid base64.
    #[error("map cells are not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Converts a JSON payload into `T`.
pub fn from_data<T: DeserializeOwned>(data: Value) -> Result<T, PayloadError> {
    Ok(serde_json::from_value(data)?)
}

// ── Poses and motion ──────────────────────────────────────────────────────────

/// `pose2D_t`: a planar pose.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2D {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utime: Option<i64>,
    pub x: f32,
    pub y: f32,
    pub theta: f32,
}

impl Pose2D {
    pub fn new(x: f32, y: f32, theta: f32) -> Self {
        Self {
            utime: None,
            x,
            y,
            theta,
        }
    }
}

/// `twist2D_t`: a planar velocity command.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist2D {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utime: Option<i64>,
    pub vx: f32,
    pub vy: f32,
    pub wz: f32,
}

impl Twist2D {
    pub fn new(vx: f32, vy: f32, wz: f32) -> Self {
        Self {
            utime: None,
            vx,
            vy,
            wz,
        }
    }

    /// The all-zero command that halts the wheels.
    pub fn zero() -> Self {
        Self::default()
    }
}

/// `path2D_t`: a sequence of waypoints for the motion controller.
///
/// `path_length` always equals `path.len()` when built through
/// [`Path2D::new`]; the server relies on it to size the LCM array.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Path2D {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utime: Option<i64>,
    pub path_length: usize,
    pub path: Vec<Pose2D>,
}

impl Path2D {
    pub fn new(path: Vec<Pose2D>) -> Self {
        Self {
            utime: None,
            path_length: path.len(),
            path,
        }
    }

    /// An empty path, which tells the controller to drop its current goal.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

// ── Sensors ───────────────────────────────────────────────────────────────────

/// `lidar_t`: one full scan.  `ranges[i]` was measured at angle `thetas[i]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LidarScan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utime: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_ranges: Option<usize>,
    pub ranges: Vec<f32>,
    pub thetas: Vec<f32>,
}

// ── SLAM control ──────────────────────────────────────────────────────────────

/// `mbot_slam_reset_t`: restart SLAM in a given mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlamReset {
    pub slam_mode: i32,
    pub retain_pose: bool,
    pub slam_map_location: String,
}

impl Default for SlamReset {
    fn default() -> Self {
        Self {
            slam_mode: SLAM_MODE_KEEP,
            retain_pose: false,
            slam_map_location: DEFAULT_MAP_FILE.to_string(),
        }
    }
}

// ── Channel listing ───────────────────────────────────────────────────────────

/// Header describing one active channel on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHeader {
    pub channel: String,
    #[serde(default)]
    pub dtype: String,
    #[serde(default)]
    pub queue_size: usize,
}

/// One item of the `CHANNELS` reply.
///
/// Older servers send bare channel names; current ones send a header object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelListing {
    Name(String),
    Header(ChannelHeader),
}

impl ChannelListing {
    /// The channel name regardless of which form the server used.
    pub fn name(&self) -> &str {
        match self {
            ChannelListing::Name(name) => name,
            ChannelListing::Header(header) => &header.channel,
        }
    }
}

// ── Occupancy grid ────────────────────────────────────────────────────────────

/// `occupancy_grid_t` with the cell array already decoded.
///
/// Cells are log-odds in `[-128, 127]`, stored row-major.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OccupancyGrid {
    pub width: usize,
    pub height: usize,
    pub meters_per_cell: f32,
    /// `[origin_x, origin_y]` in meters.
    pub origin: [f32; 2],
    pub num_cells: usize,
    pub cells: Vec<i8>,
}

impl OccupancyGrid {
    /// Returns the cell at column `x`, row `y`, or `None` when out of bounds.
    pub fn cell(&self, x: usize, y: usize) -> Option<i8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get(y * self.width + x).copied()
    }
}

/// Wire form of the grid as the server sends it.
#[derive(Debug, Deserialize)]
struct RawOccupancyGrid {
    width: usize,
    height: usize,
    meters_per_cell: f32,
    origin_x: f32,
    origin_y: f32,
    num_cells: usize,
    cells: String,
}

/// Decodes a `SLAM_MAP` payload.
///
/// Each base64-decoded byte is reinterpreted as a signed cell value, so
/// `0xFF` becomes `-1` and `0x80` becomes `-128`.
///
/// # Errors
///
/// Returns [`PayloadError::Json`] if a field is missing or ill-typed and
/// [`PayloadError::Base64`] if `cells` is not valid base64.
pub fn decode_occupancy_grid(data: &Value) -> Result<OccupancyGrid, PayloadError> {
    let raw = RawOccupancyGrid::deserialize(data)?;
    let bytes = BASE64.decode(raw.cells.as_bytes())?;

    Ok(OccupancyGrid {
        width: raw.width,
        height: raw.height,
        meters_per_cell: raw.meters_per_cell,
        origin: [raw.origin_x, raw.origin_y],
        num_cells: raw.num_cells,
        cells: bytes.into_iter().map(|b| b as i8).collect(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pose_decodes_without_utime() {
        let pose: Pose2D = from_data(json!({"x": 1.5, "y": -2.0, "theta": 0.25})).unwrap();
        assert_eq!(pose, Pose2D::new(1.5, -2.0, 0.25));
    }

    #[test]
    fn test_pose_keeps_utime_when_present() {
        let pose: Pose2D =
            from_data(json!({"utime": 1700000000, "x": 0.0, "y": 0.0, "theta": 0.0})).unwrap();
        assert_eq!(pose.utime, Some(1_700_000_000));
    }

    #[test]
    fn test_pose_missing_field_is_json_error() {
        let err = from_data::<Pose2D>(json!({"x": 1.0, "y": 2.0})).unwrap_err();
        assert!(matches!(err, PayloadError::Json(_)));
    }

    #[test]
    fn test_twist_serializes_without_utime() {
        let value = serde_json::to_value(Twist2D::new(0.5, 0.0, -1.0)).unwrap();
        assert_eq!(value, json!({"vx": 0.5, "vy": 0.0, "wz": -1.0}));
    }

    #[test]
    fn test_path_new_sets_length() {
        // Arrange
        let poses = vec![Pose2D::new(0.0, 0.0, 0.0), Pose2D::new(1.0, 0.0, 0.0)];

        // Act
        let path = Path2D::new(poses);

        // Assert
        assert_eq!(path.path_length, 2);
        let value = serde_json::to_value(&path).unwrap();
        assert_eq!(value["path_length"], 2);
        assert_eq!(value["path"][1]["x"], 1.0);
    }

    #[test]
    fn test_empty_path_wire_form() {
        let value = serde_json::to_value(Path2D::empty()).unwrap();
        assert_eq!(value, json!({"path_length": 0, "path": []}));
    }

    #[test]
    fn test_lidar_scan_decodes_ranges_and_thetas() {
        let scan: LidarScan = from_data(json!({
            "utime": 5,
            "num_ranges": 2,
            "ranges": [0.5, 1.0],
            "thetas": [0.0, 1.5],
            "intensities": [1, 1],
        }))
        .unwrap();
        assert_eq!(scan.num_ranges, Some(2));
        assert_eq!(scan.ranges, vec![0.5, 1.0]);
        assert_eq!(scan.thetas.len(), 2);
    }

    #[test]
    fn test_slam_reset_defaults() {
        let value = serde_json::to_value(SlamReset::default()).unwrap();
        assert_eq!(
            value,
            json!({"slam_mode": 99, "retain_pose": false, "slam_map_location": "current.map"})
        );
    }

    #[test]
    fn test_channel_listing_accepts_names_and_headers() {
        // Arrange
        let data = json!([
            "MBOT_ODOMETRY",
            {"channel": "LIDAR", "dtype": "lidar_t", "queue_size": 1}
        ]);

        // Act
        let listing: Vec<ChannelListing> = from_data(data).unwrap();

        // Assert
        assert_eq!(listing[0], ChannelListing::Name("MBOT_ODOMETRY".to_string()));
        assert_eq!(listing[1].name(), "LIDAR");
        match &listing[1] {
            ChannelListing::Header(header) => assert_eq!(header.dtype, "lidar_t"),
            other => panic!("expected a header, got {other:?}"),
        }
    }

    // ── occupancy grid ────────────────────────────────────────────────────────

    fn grid_json(cells: &str) -> Value {
        json!({
            "utime": 0,
            "origin_x": -1.0,
            "origin_y": -2.0,
            "meters_per_cell": 0.05,
            "width": 2,
            "height": 1,
            "num_cells": 2,
            "cells": cells,
        })
    }

    #[test]
    fn test_decode_occupancy_grid_reinterprets_bytes_as_signed() {
        // Arrange: 0x00 0xFF
        let data = grid_json("AP8=");

        // Act
        let grid = decode_occupancy_grid(&data).unwrap();

        // Assert
        assert_eq!(grid.cells, vec![0, -1]);
        assert_eq!(grid.origin, [-1.0, -2.0]);
        assert_eq!(grid.width, 2);
        assert_eq!(grid.height, 1);
        assert_eq!(grid.num_cells, 2);
    }

    #[test]
    fn test_decode_occupancy_grid_extremes() {
        // 0x7F 0x80
        let grid = decode_occupancy_grid(&grid_json("f4A=")).unwrap();
        assert_eq!(grid.cells, vec![127, -128]);
    }

    #[test]
    fn test_occupancy_grid_cell_is_row_major() {
        let grid = OccupancyGrid {
            width: 3,
            height: 2,
            cells: vec![0, 1, 2, 3, 4, 5],
            num_cells: 6,
            ..Default::default()
        };
        assert_eq!(grid.cell(0, 0), Some(0));
        assert_eq!(grid.cell(2, 0), Some(2));
        assert_eq!(grid.cell(1, 1), Some(4));
        assert_eq!(grid.cell(3, 0), None);
        assert_eq!(grid.cell(0, 2), None);
    }

    #[test]
    fn test_decode_occupancy_grid_bad_base64() {
        let err = decode_occupancy_grid(&grid_json("not base64!")).unwrap_err();
        assert!(matches!(err, PayloadError::Base64(_)));
    }

    #[test]
    fn test_decode_occupancy_grid_missing_field() {
        let err = decode_occupancy_grid(&json!({"cells": "AA=="})).unwrap_err();
        assert!(matches!(err, PayloadError::Json(_)));
    }
}

//! Recording and replaying raw tick inputs.
//!
//! A capture stores exactly what the engine reported: map info once, then
//! units and resources per tick. Feeding it back through [`CaptureBridge`]
//! reproduces the snapshots, and therefore the planned commands, bit for bit.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bridge::{EngineBridge, RawMapInfo, RawResources, RawUnit};
use crate::error::{BoundaryError, CaptureError};

/// Capture file format version.
pub const CAPTURE_VERSION: u32 = 1;

/// Raw inputs of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedFrame {
    /// Units as fetched.
    pub units: Vec<RawUnit>,
    /// Resources as fetched.
    pub resources: RawResources,
}

/// A recorded session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickCapture {
    /// Format version.
    pub version: u32,
    /// Map info, once known.
    pub map: Option<RawMapInfo>,
    /// Frames in fetch order.
    pub frames: Vec<CapturedFrame>,
}

impl Default for TickCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl TickCapture {
    /// Start an empty capture.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            version: CAPTURE_VERSION,
            map: None,
            frames: Vec::new(),
        }
    }

    /// Record the map description.
    pub fn record_map(&mut self, map: RawMapInfo) {
        self.map = Some(map);
    }

    /// Record one tick's inputs.
    pub fn record_frame(&mut self, units: Vec<RawUnit>, resources: RawResources) {
        self.frames.push(CapturedFrame { units, resources });
    }

    /// Number of recorded ticks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// No ticks recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Encode with bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CaptureError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode and check the version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CaptureError> {
        let capture: Self = bincode::deserialize(bytes)?;
        if capture.version != CAPTURE_VERSION {
            return Err(CaptureError::VersionMismatch {
                expected: CAPTURE_VERSION,
                actual: capture.version,
            });
        }
        Ok(capture)
    }

    /// Save to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CaptureError> {
        std::fs::write(path.as_ref(), self.to_bytes()?)?;
        Ok(())
    }

    /// Load from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }
}

/// Serves a capture back through the inbound boundary.
///
/// Each frame is served as one `fetch_raw_units` followed by one
/// `fetch_resource_state`; the second call moves on to the next frame.
#[derive(Debug, Clone)]
pub struct CaptureBridge {
    capture: TickCapture,
    cursor: usize,
}

impl CaptureBridge {
    /// Replay `capture` from its first frame.
    #[must_use]
    pub const fn new(capture: TickCapture) -> Self {
        Self { capture, cursor: 0 }
    }

    /// Frames not yet served.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capture.frames.len().saturating_sub(self.cursor)
    }

    fn frame(&self) -> Result<&CapturedFrame, BoundaryError> {
        self.capture.frames.get(self.cursor).ok_or_else(|| {
            BoundaryError::Unavailable(format!(
                "capture exhausted after {} frames",
                self.capture.frames.len()
            ))
        })
    }
}

impl EngineBridge for CaptureBridge {
    fn fetch_raw_units(&mut self) -> Result<Vec<RawUnit>, BoundaryError> {
        Ok(self.frame()?.units.clone())
    }

    fn fetch_resource_state(&mut self) -> Result<RawResources, BoundaryError> {
        let resources = self.frame()?.resources;
        self.cursor += 1;
        Ok(resources)
    }

    fn fetch_map_info(&mut self) -> Result<RawMapInfo, BoundaryError> {
        self.capture
            .map
            .ok_or_else(|| BoundaryError::Unavailable("capture has no map info".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: i32) -> RawUnit {
        RawUnit {
            id,
            def_id: 103,
            x: 10.0,
            y: 0.0,
            z: 20.0,
            health: 50.0,
            max_health: 100.0,
            team_id: 0,
            state_code: 0,
            velocity: [0.0; 3],
            being_built: false,
        }
    }

    fn capture() -> TickCapture {
        let mut capture = TickCapture::new();
        capture.record_map(RawMapInfo {
            width: 512.0,
            height: 512.0,
            min_elevation: 0.0,
            max_elevation: 100.0,
        });
        for tick in 0..3 {
            capture.record_frame(
                vec![unit(1), unit(2)],
                RawResources {
                    metal: 100.0,
                    metal_storage: 1000.0,
                    tick,
                    ..RawResources::default()
                },
            );
        }
        capture
    }

    #[test]
    fn test_bytes_round_trip() {
        let original = capture();
        let decoded = TickCapture::from_bytes(&original.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let mut old = capture();
        old.version = 0;
        let err = TickCapture::from_bytes(&old.to_bytes().unwrap()).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::VersionMismatch {
                expected: CAPTURE_VERSION,
                actual: 0
            }
        ));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.capture");
        capture().save(&path).unwrap();
        assert_eq!(TickCapture::load(&path).unwrap().len(), 3);
    }

    #[test]
    fn test_bridge_serves_frames_in_order() {
        let mut bridge = CaptureBridge::new(capture());
        assert_eq!(bridge.fetch_map_info().unwrap().width, 512.0);
        for tick in 0..3 {
            assert_eq!(bridge.fetch_raw_units().unwrap().len(), 2);
            assert_eq!(bridge.fetch_resource_state().unwrap().tick, tick);
        }
        assert_eq!(bridge.remaining(), 0);
        assert!(matches!(
            bridge.fetch_raw_units(),
            Err(BoundaryError::Unavailable(_))
        ));
    }
}

//! Vision input
//!
//! The camera driver is a collaborator behind [`VisionSource`]; this module
//! owns everything between its raw frame and the selected target.

mod observation;

pub use observation::{
    Affiliation, Detection, Identity, IdentityFilter, MountGeometry, ObservationModel,
    TargetObservation,
};

use crate::Result;

/// A camera pipeline that reports detections for the latest frame
///
/// Reads are non-blocking snapshots of the most recent frame.
pub trait VisionSource: Send + Sync {
    /// Detections in the latest frame, possibly empty
    fn detections(&self) -> Result<Vec<Detection>>;

    /// Whether the pipeline currently reports a valid target
    fn has_target(&self) -> bool {
        self.detections().map_or(false, |d| !d.is_empty())
    }
}

/// Read a frame, treating driver failure as an empty frame
///
/// An empty frame is the "no target" case the engagements already handle,
/// so the next tick is the retry. The frame is read once per call.
pub(crate) fn read_frame(source: &dyn VisionSource) -> Vec<Detection> {
    match source.detections() {
        Ok(detections) => detections,
        Err(e) => {
            tracing::warn!("vision frame unavailable: {}", e);
            Vec::new()
        }
    }
}

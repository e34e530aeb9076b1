// Single-slot handoff between the stream task and the control loop

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use super::assembler::Frame;

/// Latest-wins frame slot.
///
/// `publish` overwrites whatever has not been consumed yet and never blocks.
/// `take` returns the current frame and empties the slot in one atomic swap,
/// so each frame is read at most once.
pub struct LatestFrameMailbox {
    slot: ArcSwapOption<Frame>,
}

impl Default for LatestFrameMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl LatestFrameMailbox {
    pub fn new() -> Self {
        Self {
            slot: ArcSwapOption::empty(),
        }
    }

    /// Store `frame`. Returns true if an unconsumed frame was overwritten.
    pub fn publish(&self, frame: Frame) -> bool {
        self.slot.swap(Some(Arc::new(frame))).is_some()
    }

    /// Take the current frame, leaving the slot empty
    pub fn take(&self) -> Option<Arc<Frame>> {
        self.slot.swap(None)
    }

    pub fn is_empty(&self) -> bool {
        self.slot.load().is_none()
    }
}

//! Frame identifier type.

use std::fmt;

/// Index of a frame in the buffer pool.
///
/// Frames never move, so a `FrameId` stays valid for the lifetime of the
/// pool and doubles as the slot index in the replacer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub usize);

impl FrameId {
    #[inline]
    pub fn new(id: usize) -> Self {
        FrameId(id)
    }

    /// The frame's position in the frame array.
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({})", self.0)
    }
}

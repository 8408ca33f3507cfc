/// Deferred release of GPU objects still referenced by in-flight frames

use crate::error::{Error, Result};

/// Items retired while recording a frame slot, kept alive until that slot is reused
///
/// The frame loop calls `release_frame(k)` right after waiting on slot `k`'s
/// fence, so every submission that could still reference the items has
/// completed by the time they drop.
pub struct DeferredDeletionQueue<T> {
    slots: Vec<Vec<T>>,
}

impl<T> DeferredDeletionQueue<T> {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            slots: (0..frames_in_flight).map(|_| Vec::new()).collect(),
        }
    }

    /// Queue `item` for release when `frame_index` is reused
    pub fn push(&mut self, frame_index: usize, item: T) -> Result<()> {
        let frames = self.slots.len();
        let slot = self.slots.get_mut(frame_index).ok_or_else(|| {
            Error::InvalidResource(format!("frame index {} out of range ({} frames in flight)", frame_index, frames))
        })?;
        slot.push(item);
        Ok(())
    }

    /// Drop everything queued for `frame_index`; returns how many items were released
    pub fn release_frame(&mut self, frame_index: usize) -> usize {
        self.slots
            .get_mut(frame_index)
            .map(|slot| slot.drain(..).count())
            .unwrap_or(0)
    }

    /// Drop everything; only valid once the device is idle
    pub fn release_all(&mut self) -> usize {
        self.slots.iter_mut().map(|slot| slot.drain(..).count()).sum()
    }

    pub fn pending_for(&self, frame_index: usize) -> usize {
        self.slots.get(frame_index).map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Vec::is_empty)
    }
}

#[cfg(test)]
#[path = "deferred_deletion_tests.rs"]
mod tests;

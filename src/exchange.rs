//! Frame Exchange Buffer: latest-wins hand-off between camera and render threads
//!
//! The producer filters each camera frame into a private staging frame, then
//! takes the slot lock only long enough to copy the result in and mark it
//! dirty. The consumer takes the same lock, and if the slot is dirty keeps
//! it for the duration of the texture upload.
//!
//! There is exactly one slot. Publishing over an unconsumed frame replaces
//! it; the consumer always sees the newest frame and never a backlog.
//!
//! Lock order is `producer` then `slot`. The consumer only ever takes `slot`.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::error::PreviewError;
use crate::filter::{CannyFilter, EdgeFilter};
use crate::frame::{FilteredFrame, RawFrame};

/// Counters describing traffic through the exchange
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames filtered and stored in the slot
    pub published: u64,
    /// Frames handed to the consumer
    pub taken: u64,
    /// Frames overwritten before the consumer saw them
    pub dropped: u64,
    /// Inputs refused as null or malformed
    pub rejected: u64,
    /// Dimensions of the frame currently in the slot (0 before the first publish)
    pub width: u32,
    pub height: u32,
}

/// Producer-only state; never touched by the consumer
struct ProducerStage {
    filter: Box<dyn EdgeFilter>,
    staging: FilteredFrame,
}

struct Slot {
    frame: FilteredFrame,
    dirty: bool,
    published: u64,
    taken: u64,
    dropped: u64,
}

/// A freshly published frame, borrowed from the slot
///
/// The slot stays locked while this is alive, so the producer cannot
/// overwrite the pixels mid-upload. Drop it as soon as the upload is done.
pub struct PendingFrame<'a> {
    guard: MappedMutexGuard<'a, FilteredFrame>,
}

impl Deref for PendingFrame<'_> {
    type Target = FilteredFrame;

    fn deref(&self) -> &FilteredFrame {
        &self.guard
    }
}

/// Single-slot, latest-wins exchange of filtered frames
pub struct FrameExchange {
    producer: Mutex<ProducerStage>,
    slot: Mutex<Slot>,
    rejected: AtomicU64,
    closed: AtomicBool,
}

impl Default for FrameExchange {
    fn default() -> Self {
        Self::new(Box::new(CannyFilter::new()))
    }
}

impl std::fmt::Debug for FrameExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameExchange")
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl FrameExchange {
    /// Create an exchange that runs `filter` on every published frame
    pub fn new(filter: Box<dyn EdgeFilter>) -> Self {
        Self {
            producer: Mutex::new(ProducerStage {
                filter,
                staging: FilteredFrame::default(),
            }),
            slot: Mutex::new(Slot {
                frame: FilteredFrame::default(),
                dirty: false,
                published: 0,
                taken: 0,
                dropped: 0,
            }),
            rejected: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Filter `raw` and make it the pending frame (producer thread)
    ///
    /// Returns false if the exchange has been closed.
    pub fn publish(&self, raw: &RawFrame<'_>) -> bool {
        if self.is_closed() {
            tracing::debug!("publish after close ignored");
            return false;
        }

        let (width, height) = (raw.width(), raw.height());

        let mut producer = self.producer.lock();
        let ProducerStage { filter, staging } = &mut *producer;
        if staging.reshape(width, height) {
            tracing::debug!(width, height, "staging frame allocated");
        }
        filter.apply(raw, staging);

        let mut slot = self.slot.lock();
        if slot.frame.reshape(width, height) {
            tracing::debug!(width, height, "slot frame allocated");
        }
        slot.frame.pixels_mut().copy_from_slice(staging.pixels());

        if slot.dirty {
            slot.dropped += 1;
            tracing::trace!("pending frame overwritten before draw");
        }
        slot.dirty = true;
        slot.published += 1;
        true
    }

    /// Validate a plane and publish it; malformed input is logged and counted
    pub fn publish_plane(&self, data: &[u8], width: u32, height: u32, row_stride: usize) -> bool {
        match RawFrame::new(data, width, height, row_stride) {
            Ok(raw) => self.publish(&raw),
            Err(err) => {
                self.reject(&err);
                false
            }
        }
    }

    /// Record an input refused before it reached the exchange
    pub(crate) fn reject(&self, err: &PreviewError) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(%err, "frame rejected");
    }

    /// Take the pending frame if one was published since the last take
    /// (consumer thread)
    ///
    /// Never waits for the producer beyond acquiring the lock, and never
    /// copies: the returned guard borrows the slot directly.
    pub fn try_take_pending(&self) -> Option<PendingFrame<'_>> {
        let mut slot = self.slot.lock();
        if !slot.dirty {
            return None;
        }
        slot.dirty = false;
        slot.taken += 1;

        Some(PendingFrame {
            guard: MutexGuard::map(slot, |slot| &mut slot.frame),
        })
    }

    /// Whether a publish is waiting for the consumer
    pub fn has_pending(&self) -> bool {
        self.slot.lock().dirty
    }

    /// Copy of the latest filtered frame, pending or not
    pub fn snapshot(&self) -> Option<image::GrayImage> {
        let slot = self.slot.lock();
        if slot.frame.is_empty() {
            return None;
        }
        image::GrayImage::from_raw(
            slot.frame.width(),
            slot.frame.height(),
            slot.frame.pixels().to_vec(),
        )
    }

    pub fn stats(&self) -> FrameStats {
        let slot = self.slot.lock();
        FrameStats {
            published: slot.published,
            taken: slot.taken,
            dropped: slot.dropped,
            rejected: self.rejected.load(Ordering::Relaxed),
            width: slot.frame.width(),
            height: slot.frame.height(),
        }
    }

    /// Stop accepting frames; later publishes are logged no-ops
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

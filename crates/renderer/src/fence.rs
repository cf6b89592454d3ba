//! Frame fence tracking.
//!
//! One shared fence with a monotonically increasing value gates reuse of every
//! frame slot. After a slot's work is submitted, the next reservation value is
//! signaled on the queue and recorded as that slot's watermark. The slot is
//! free again once the fence's completed value reaches the watermark.
//!
//! ```text
//!  reservation:   1      2      3      4      5
//!  slot:          0      1      2      0      1
//!                 |             |      |
//!                 +-- slot 0 reusable once completed >= 1
//!                               +-- slot 2 watermark 3
//!                                      +-- slot 0 watermark moves to 4
//! ```

use tracing::debug;

use vista_rhi::Backend;

use crate::error::RendererResult;

/// Per-slot watermarks on the shared fence.
#[derive(Debug)]
pub struct FrameFences {
    watermarks: Vec<u64>,
    next_value: u64,
    waits: u64,
    full_waits: u64,
}

impl FrameFences {
    /// Watermarks start at zero, so every slot is free before its first use.
    pub fn new(frame_count: usize) -> Self {
        Self {
            watermarks: vec![0; frame_count],
            next_value: 1,
            waits: 0,
            full_waits: 0,
        }
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.watermarks.len()
    }

    /// Fence value the slot's last submission signals.
    #[inline]
    pub fn watermark(&self, slot: usize) -> u64 {
        self.watermarks[slot]
    }

    /// Value the next signal will use.
    #[inline]
    pub fn next_value(&self) -> u64 {
        self.next_value
    }

    /// Blocking waits performed by [`wait_for_slot`](Self::wait_for_slot).
    #[inline]
    pub fn wait_count(&self) -> u64 {
        self.waits
    }

    /// Calls to [`wait_for_all`](Self::wait_for_all).
    #[inline]
    pub fn full_wait_count(&self) -> u64 {
        self.full_waits
    }

    /// True when the GPU has finished the slot's last submission.
    pub fn is_slot_free<B: Backend>(&self, backend: &B, slot: usize) -> bool {
        backend.completed_fence_value() >= self.watermarks[slot]
    }

    /// Block until the slot's last submission has completed.
    ///
    /// Returns without touching the fence when it already has.
    pub fn wait_for_slot<B: Backend>(&mut self, backend: &B, slot: usize) -> RendererResult<()> {
        let watermark = self.watermarks[slot];
        if backend.completed_fence_value() >= watermark {
            return Ok(());
        }

        debug!("Waiting for frame slot {} (fence {})", slot, watermark);
        backend.wait_fence(watermark)?;
        self.waits += 1;
        Ok(())
    }

    /// Signal the next reservation behind the slot's submission and make it
    /// the slot's watermark.
    pub fn signal_after_submit<B: Backend>(
        &mut self,
        backend: &mut B,
        slot: usize,
    ) -> RendererResult<()> {
        let value = self.next_value;
        backend.signal_fence(value)?;
        self.watermarks[slot] = value;
        self.next_value += 1;
        Ok(())
    }

    /// Drain the GPU: signal one past the highest watermark, wait for it, and
    /// move every slot's watermark there.
    pub fn wait_for_all<B: Backend>(&mut self, backend: &mut B) -> RendererResult<()> {
        let highest = self.watermarks.iter().copied().max().unwrap_or(0);
        let value = highest.max(self.next_value - 1) + 1;

        backend.signal_fence(value)?;
        backend.wait_fence(value)?;

        self.watermarks.fill(value);
        self.next_value = value + 1;
        self.full_waits += 1;
        debug!("GPU drained at fence value {}", value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vista_rhi::headless::{HeadlessBackend, HeadlessConfig, HeadlessEvent};

    fn backend() -> HeadlessBackend {
        HeadlessBackend::new(HeadlessConfig {
            gpu_latency: Duration::ZERO,
            ..Default::default()
        })
    }

    #[test]
    fn test_fresh_slots_are_free() {
        let backend = backend();
        let mut fences = FrameFences::new(3);
        for slot in 0..3 {
            assert!(fences.is_slot_free(&backend, slot));
            fences.wait_for_slot(&backend, slot).unwrap();
        }
        assert_eq!(fences.wait_count(), 0);
    }

    #[test]
    fn test_signals_advance_watermarks() {
        let mut backend = backend();
        let mut fences = FrameFences::new(2);
        fences.signal_after_submit(&mut backend, 0).unwrap();
        fences.signal_after_submit(&mut backend, 1).unwrap();
        fences.signal_after_submit(&mut backend, 0).unwrap();

        assert_eq!(fences.watermark(0), 3);
        assert_eq!(fences.watermark(1), 2);
        assert_eq!(fences.next_value(), 4);
    }

    #[test]
    fn test_wait_for_all_moves_every_watermark() {
        let mut backend = backend();
        let probe = backend.probe();
        let mut fences = FrameFences::new(3);
        fences.signal_after_submit(&mut backend, 0).unwrap();
        fences.signal_after_submit(&mut backend, 1).unwrap();

        fences.wait_for_all(&mut backend).unwrap();

        for slot in 0..3 {
            assert_eq!(fences.watermark(slot), 3);
        }
        assert_eq!(fences.next_value(), 4);
        assert_eq!(fences.full_wait_count(), 1);
        assert!(backend.completed_fence_value() >= 3);
        assert_eq!(
            probe.count(|e| matches!(e, HeadlessEvent::Wait { value: 3, .. })),
            1
        );
    }

    #[test]
    fn test_wait_for_all_on_idle_tracker() {
        let mut backend = backend();
        let mut fences = FrameFences::new(2);
        fences.wait_for_all(&mut backend).unwrap();
        assert_eq!(fences.watermark(0), 1);
        assert_eq!(fences.next_value(), 2);
    }
}

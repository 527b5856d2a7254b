//! Tap-vs-hold gesture state machine for enrollment capture.
//!
//! A quick tap captures a single sample. Holding past the hold delay
//! starts a burst: one sample immediately, then one per cadence tick until
//! release. Once a burst has produced samples, every further press goes
//! straight back into recording and appends to the same batch until the
//! caller finalizes it.
//!
//! The controller is pure: it consumes [`CaptureEvent`]s and answers with
//! [`CaptureEffect`]s. A driver owns the timers and the frame source.

use crate::frame::Frame;
use std::time::Duration;

/// Press duration after which a press becomes a burst.
pub const HOLD_DELAY: Duration = Duration::from_millis(500);
/// Interval between burst samples.
pub const BURST_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTiming {
    pub hold_delay: Duration,
    pub burst_interval: Duration,
}

impl Default for CaptureTiming {
    fn default() -> Self {
        Self {
            hold_delay: HOLD_DELAY,
            burst_interval: BURST_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    /// Pressed, hold timer armed, not yet decided.
    PendingHold,
    Recording,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    Press,
    Release,
    HoldElapsed,
    CadenceTick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEffect {
    ArmHoldTimer(Duration),
    CancelHoldTimer,
    StartCadence(Duration),
    StopCadence,
    /// Capture one frame and hand it back as a standalone sample.
    CaptureSingle,
    /// Capture one frame into the pending batch via [`BatchCaptureController::push_sample`].
    CaptureIntoBatch,
}

#[derive(Debug)]
pub struct BatchCaptureController {
    state: CaptureState,
    timing: CaptureTiming,
    batch: Vec<Frame>,
}

impl BatchCaptureController {
    pub fn new(timing: CaptureTiming) -> Self {
        Self {
            state: CaptureState::Idle,
            timing,
            batch: Vec::new(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn timing(&self) -> CaptureTiming {
        self.timing
    }

    /// Samples accumulated since the last finalize.
    pub fn batch_len(&self) -> usize {
        self.batch.len()
    }

    pub fn has_batch(&self) -> bool {
        !self.batch.is_empty()
    }

    /// Advance the machine. Events that do not apply to the current state
    /// (a stale timer, a release without press) produce no effects.
    pub fn handle(&mut self, event: CaptureEvent) -> Vec<CaptureEffect> {
        use CaptureEffect::*;
        use CaptureEvent::*;

        let (next, effects) = match (self.state, event) {
            (CaptureState::Idle, Press) if self.has_batch() => (
                CaptureState::Recording,
                vec![CaptureIntoBatch, StartCadence(self.timing.burst_interval)],
            ),
            (CaptureState::Idle, Press) => (
                CaptureState::PendingHold,
                vec![ArmHoldTimer(self.timing.hold_delay)],
            ),
            (CaptureState::PendingHold, Release) => {
                (CaptureState::Idle, vec![CancelHoldTimer, CaptureSingle])
            }
            (CaptureState::PendingHold, HoldElapsed) => (
                CaptureState::Recording,
                vec![CaptureIntoBatch, StartCadence(self.timing.burst_interval)],
            ),
            (CaptureState::Recording, CadenceTick) => (CaptureState::Recording, vec![CaptureIntoBatch]),
            (CaptureState::Recording, Release) => (CaptureState::Idle, vec![StopCadence]),
            (state, event) => {
                tracing::trace!(?state, ?event, "capture event ignored");
                (state, Vec::new())
            }
        };

        if next != self.state {
            tracing::debug!(from = ?self.state, to = ?next, ?event, "capture state changed");
        }
        self.state = next;
        effects
    }

    /// Append a frame captured for a [`CaptureEffect::CaptureIntoBatch`].
    pub fn push_sample(&mut self, frame: Frame) {
        self.batch.push(frame);
    }

    /// Hand over the accumulated batch and reopen the single-tap path.
    ///
    /// Finalizing mid-recording keeps recording into a fresh batch.
    pub fn finalize(&mut self) -> Vec<Frame> {
        tracing::debug!(samples = self.batch.len(), "batch finalized");
        std::mem::take(&mut self.batch)
    }
}

impl Default for BatchCaptureController {
    fn default() -> Self {
        Self::new(CaptureTiming::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::CaptureEffect::*;
    use super::CaptureEvent::*;
    use image::{Rgba, RgbaImage};

    fn frame() -> Frame {
        Frame::new(RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255])))
    }

    /// Apply effects the way a driver with a working source would.
    fn apply(controller: &mut BatchCaptureController, effects: &[CaptureEffect]) -> usize {
        let mut singles = 0;
        for effect in effects {
            match effect {
                CaptureSingle => singles += 1,
                CaptureIntoBatch => controller.push_sample(frame()),
                _ => {}
            }
        }
        singles
    }

    #[test]
    fn test_tap_captures_single() {
        let mut c = BatchCaptureController::default();
        assert_eq!(c.handle(Press), vec![ArmHoldTimer(HOLD_DELAY)]);
        assert_eq!(c.state(), CaptureState::PendingHold);

        let effects = c.handle(Release);
        assert_eq!(effects, vec![CancelHoldTimer, CaptureSingle]);
        assert_eq!(apply(&mut c, &effects), 1);
        assert_eq!(c.state(), CaptureState::Idle);
        assert!(!c.has_batch());
    }

    #[test]
    fn test_hold_records_burst() {
        let mut c = BatchCaptureController::default();
        c.handle(Press);
        let effects = c.handle(HoldElapsed);
        assert_eq!(effects, vec![CaptureIntoBatch, StartCadence(BURST_INTERVAL)]);
        apply(&mut c, &effects);
        assert_eq!(c.state(), CaptureState::Recording);

        for _ in 0..3 {
            let effects = c.handle(CadenceTick);
            apply(&mut c, &effects);
        }
        assert_eq!(c.handle(Release), vec![StopCadence]);
        assert_eq!(c.state(), CaptureState::Idle);
        assert_eq!(c.batch_len(), 4);
    }

    #[test]
    fn test_press_after_batch_records_immediately() {
        let mut c = BatchCaptureController::default();
        c.handle(Press);
        let effects = c.handle(HoldElapsed);
        apply(&mut c, &effects);
        c.handle(Release);

        // A quick tap now appends instead of capturing a single.
        let effects = c.handle(Press);
        assert_eq!(effects, vec![CaptureIntoBatch, StartCadence(BURST_INTERVAL)]);
        assert_eq!(apply(&mut c, &effects), 0);
        assert_eq!(c.state(), CaptureState::Recording);
        c.handle(Release);
        assert_eq!(c.batch_len(), 2);
    }

    #[test]
    fn test_finalize_reopens_single_tap() {
        let mut c = BatchCaptureController::default();
        c.handle(Press);
        let effects = c.handle(HoldElapsed);
        apply(&mut c, &effects);
        c.handle(Release);

        assert_eq!(c.finalize().len(), 1);
        assert!(!c.has_batch());
        assert_eq!(c.handle(Press), vec![ArmHoldTimer(HOLD_DELAY)]);
    }

    #[test]
    fn test_failed_burst_capture_keeps_tap_path() {
        let mut c = BatchCaptureController::default();
        c.handle(Press);
        c.handle(HoldElapsed);
        c.handle(CadenceTick);
        c.handle(Release);
        // No frame was ever pushed, so there is no batch to append to.
        assert_eq!(c.handle(Press), vec![ArmHoldTimer(HOLD_DELAY)]);
    }

    #[test]
    fn test_stale_events_ignored() {
        let mut c = BatchCaptureController::default();
        assert!(c.handle(Release).is_empty());
        assert!(c.handle(HoldElapsed).is_empty());
        assert!(c.handle(CadenceTick).is_empty());
        assert_eq!(c.state(), CaptureState::Idle);

        c.handle(Press);
        assert!(c.handle(Press).is_empty());
        assert!(c.handle(CadenceTick).is_empty());
        assert_eq!(c.state(), CaptureState::PendingHold);
    }

    #[test]
    fn test_custom_timing_propagates() {
        let timing = CaptureTiming {
            hold_delay: Duration::from_millis(50),
            burst_interval: Duration::from_millis(20),
        };
        let mut c = BatchCaptureController::new(timing);
        assert_eq!(c.handle(Press), vec![ArmHoldTimer(Duration::from_millis(50))]);
        assert_eq!(
            c.handle(HoldElapsed),
            vec![CaptureIntoBatch, StartCadence(Duration::from_millis(20))]
        );
    }
}

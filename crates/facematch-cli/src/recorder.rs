//! Async driver for the tap-vs-hold capture controller.
//!
//! Turns press/release gestures and tokio timers into controller events,
//! and performs the captures the controller asks for.

use facematch_core::{
    BatchCaptureController, CaptureEffect, CaptureEvent, CaptureTiming, Frame, FrameSource,
};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// User input fed to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Press,
    Release,
    /// Close the current batch so it can be enrolled.
    Finalize,
}

/// Everything captured during one driver run.
#[derive(Debug, Default)]
pub struct CaptureOutcome {
    pub singles: Vec<Frame>,
    pub batches: Vec<Vec<Frame>>,
    /// Captures that produced no frame.
    pub skipped: usize,
}

pub struct CaptureDriver<S> {
    controller: BatchCaptureController,
    source: S,
}

impl<S: FrameSource> CaptureDriver<S> {
    pub fn new(source: S, timing: CaptureTiming) -> Self {
        Self {
            controller: BatchCaptureController::new(timing),
            source,
        }
    }

    /// Run until the gesture channel closes. A batch still open at that
    /// point is finalized into the outcome.
    pub async fn run(mut self, mut gestures: mpsc::Receiver<Gesture>) -> CaptureOutcome {
        let mut outcome = CaptureOutcome::default();
        let mut hold_deadline: Option<Instant> = None;
        let mut cadence: Option<Interval> = None;

        loop {
            let event = tokio::select! {
                biased;

                gesture = gestures.recv() => match gesture {
                    Some(Gesture::Press) => CaptureEvent::Press,
                    Some(Gesture::Release) => CaptureEvent::Release,
                    Some(Gesture::Finalize) => {
                        self.finalize_into(&mut outcome);
                        continue;
                    }
                    None => break,
                },
                _ = time::sleep_until(hold_deadline.unwrap_or_else(Instant::now)), if hold_deadline.is_some() => {
                    hold_deadline = None;
                    CaptureEvent::HoldElapsed
                }
                _ = next_tick(&mut cadence), if cadence.is_some() => CaptureEvent::CadenceTick,
            };

            for effect in self.controller.handle(event) {
                match effect {
                    CaptureEffect::ArmHoldTimer(delay) => hold_deadline = Some(Instant::now() + delay),
                    CaptureEffect::CancelHoldTimer => hold_deadline = None,
                    CaptureEffect::StartCadence(period) => {
                        let mut interval = time::interval_at(Instant::now() + period, period);
                        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        cadence = Some(interval);
                    }
                    CaptureEffect::StopCadence => cadence = None,
                    CaptureEffect::CaptureSingle => match self.source.capture() {
                        Ok(frame) => outcome.singles.push(frame),
                        Err(err) => {
                            tracing::warn!(error = %err, "single capture failed");
                            outcome.skipped += 1;
                        }
                    },
                    CaptureEffect::CaptureIntoBatch => match self.source.capture() {
                        Ok(frame) => self.controller.push_sample(frame),
                        Err(err) => {
                            tracing::debug!(error = %err, "no frame this tick; recording continues");
                            outcome.skipped += 1;
                        }
                    },
                }
            }
        }

        self.finalize_into(&mut outcome);
        tracing::info!(
            singles = outcome.singles.len(),
            batches = outcome.batches.len(),
            skipped = outcome.skipped,
            "capture finished"
        );
        outcome
    }

    fn finalize_into(&mut self, outcome: &mut CaptureOutcome) {
        let batch = self.controller.finalize();
        if !batch.is_empty() {
            outcome.batches.push(batch);
        }
    }
}

async fn next_tick(cadence: &mut Option<Interval>) {
    match cadence {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facematch_core::SourceError;
    use image::{Rgba, RgbaImage};
    use std::time::Duration;

    /// Produces frames with increasing brightness; optionally fails on some calls.
    struct CountingSource {
        calls: u8,
        fail_on: Vec<u8>,
    }

    impl CountingSource {
        fn new() -> Self {
            Self { calls: 0, fail_on: Vec::new() }
        }
    }

    impl FrameSource for CountingSource {
        fn capture(&mut self) -> Result<Frame, SourceError> {
            self.calls += 1;
            if self.fail_on.contains(&self.calls) {
                return Err(SourceError::NoFrame("camera hiccup".into()));
            }
            let v = self.calls;
            Ok(Frame::new(RgbaImage::from_pixel(2, 2, Rgba([v, v, v, 255]))))
        }
    }

    async fn press_for(tx: &mpsc::Sender<Gesture>, held: Duration) {
        tx.send(Gesture::Press).await.unwrap();
        time::sleep(held).await;
        tx.send(Gesture::Release).await.unwrap();
        // Let the driver observe the release before the next gesture.
        time::sleep(Duration::from_millis(1)).await;
    }

    fn spawn(source: CountingSource) -> (mpsc::Sender<Gesture>, tokio::task::JoinHandle<CaptureOutcome>) {
        let (tx, rx) = mpsc::channel(8);
        let driver = CaptureDriver::new(source, CaptureTiming::default());
        (tx, tokio::spawn(driver.run(rx)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_tap_yields_single() {
        let (tx, task) = spawn(CountingSource::new());
        press_for(&tx, Duration::from_millis(300)).await;
        drop(tx);

        let outcome = task.await.unwrap();
        assert_eq!(outcome.singles.len(), 1);
        assert!(outcome.batches.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_yields_immediate_plus_interval_samples() {
        let (tx, task) = spawn(CountingSource::new());
        // 500ms hold delay, then ticks at 700 and 900 before release at 950.
        press_for(&tx, Duration::from_millis(950)).await;
        drop(tx);

        let outcome = task.await.unwrap();
        assert!(outcome.singles.is_empty());
        assert_eq!(outcome.batches.len(), 1);
        assert_eq!(outcome.batches[0].len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_taps_after_batch_append() {
        let (tx, task) = spawn(CountingSource::new());
        press_for(&tx, Duration::from_millis(650)).await; // 1 sample
        press_for(&tx, Duration::from_millis(100)).await; // immediate sample
        press_for(&tx, Duration::from_millis(450)).await; // immediate + ticks at 200, 400
        drop(tx);

        let outcome = task.await.unwrap();
        assert!(outcome.singles.is_empty());
        assert_eq!(outcome.batches.len(), 1);
        assert_eq!(outcome.batches[0].len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalize_splits_batches() {
        let (tx, task) = spawn(CountingSource::new());
        press_for(&tx, Duration::from_millis(550)).await;
        tx.send(Gesture::Finalize).await.unwrap();
        press_for(&tx, Duration::from_millis(100)).await;
        press_for(&tx, Duration::from_millis(750)).await;
        drop(tx);

        let outcome = task.await.unwrap();
        assert_eq!(outcome.singles.len(), 1);
        assert_eq!(outcome.batches.len(), 2);
        assert_eq!(outcome.batches[0].len(), 1);
        assert_eq!(outcome.batches[1].len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_frame_tick_is_skipped() {
        let source = CountingSource {
            calls: 0,
            fail_on: vec![2],
        };
        let (tx, task) = spawn(source);
        // Immediate at 500 ok, tick at 700 fails, tick at 900 ok.
        press_for(&tx, Duration::from_millis(950)).await;
        drop(tx);

        let outcome = task.await.unwrap();
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.batches[0].len(), 2);
    }
}

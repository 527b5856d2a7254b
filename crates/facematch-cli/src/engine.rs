use facematch_core::{decide, Decision, Enrollment, Frame, MatchError, SimilarityScorer};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from async callers to the engine thread.
enum EngineRequest {
    Scan {
        probe: Frame,
        gallery: Vec<Enrollment>,
        reply: oneshot::Sender<Result<Decision, MatchError>>,
    },
    Compare {
        a: Frame,
        b: Frame,
        reply: oneshot::Sender<f32>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    scan_delay: Duration,
}

impl EngineHandle {
    /// Score `probe` against a gallery snapshot and decide.
    ///
    /// The result is returned no sooner than the configured scan delay; the
    /// delay runs alongside scoring, not before it. Dropping the returned
    /// future does not stop the engine, which finishes the scan and
    /// discards the reply.
    pub async fn scan(&self, probe: Frame, gallery: Vec<Enrollment>) -> Result<Decision, EngineError> {
        let scoring = async {
            let (reply_tx, reply_rx) = oneshot::channel();
            self.tx
                .send(EngineRequest::Scan {
                    probe,
                    gallery,
                    reply: reply_tx,
                })
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
            let decision = reply_rx.await.map_err(|_| EngineError::ChannelClosed)??;
            Ok::<_, EngineError>(decision)
        };

        let (result, ()) = tokio::join!(scoring, tokio::time::sleep(self.scan_delay));
        result
    }

    /// Score two frames directly.
    pub async fn compare(&self, a: Frame, b: Frame) -> Result<f32, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Compare { a, b, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Requests are served one at a time, and each scan visits its gallery
/// snapshot sequentially in insertion order.
pub fn spawn_engine(
    scorer: Arc<dyn SimilarityScorer>,
    threshold: f32,
    scan_delay: Duration,
) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facematch-engine".into())
        .spawn(move || {
            tracing::info!(scorer = scorer.name(), threshold, "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Scan {
                        probe,
                        gallery,
                        reply,
                    } => {
                        let result = decide(scorer.as_ref(), &probe, &gallery, threshold);
                        if reply.send(result).is_err() {
                            tracing::debug!("scan caller went away; result discarded");
                        }
                    }
                    EngineRequest::Compare { a, b, reply } => {
                        let _ = reply.send(scorer.score(&a, &b));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx, scan_delay })
}

#[cfg(test)]
mod tests {
    use super::*;
    use facematch_core::{Gallery, PixelDeviationScorer};
    use image::{Rgba, RgbaImage};

    const DELAY: Duration = Duration::from_millis(2000);

    fn solid(value: u8) -> Frame {
        Frame::new(RgbaImage::from_pixel(32, 32, Rgba([value, value, value, 255])))
    }

    fn engine() -> EngineHandle {
        spawn_engine(Arc::new(PixelDeviationScorer::default()), 65.0, DELAY).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_matches_and_waits_for_delay() {
        let engine = engine();
        let mut gallery = Gallery::new();
        gallery.enroll("alice", solid(220)).unwrap();
        gallery.enroll("bob", solid(90)).unwrap();

        let start = tokio::time::Instant::now();
        let decision = engine.scan(solid(220), gallery.snapshot()).await.unwrap();
        assert!(start.elapsed() >= DELAY);

        let result = decision.matched().unwrap();
        assert_eq!(result.label, "alice");
        assert_eq!(result.score, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_no_match() {
        let engine = engine();
        let mut gallery = Gallery::new();
        gallery.enroll("alice", solid(255)).unwrap();

        let decision = engine.scan(solid(0), gallery.snapshot()).await.unwrap();
        assert_eq!(decision, Decision::NoMatch);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_empty_gallery_rejected() {
        let engine = engine();
        let result = engine.scan(solid(0), Vec::new()).await;
        assert!(matches!(result, Err(EngineError::Match(MatchError::EmptyGallery))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_isolated_from_later_mutation() {
        let engine = engine();
        let mut gallery = Gallery::new();
        gallery.enroll("alice", solid(220)).unwrap();

        let snapshot = gallery.snapshot();
        gallery.remove_by_label("alice");
        gallery.enroll("mallory", solid(220)).unwrap();

        let decision = engine.scan(solid(220), snapshot).await.unwrap();
        assert_eq!(decision.matched().map(|r| r.label.as_str()), Some("alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_scan_does_not_break_engine() {
        let engine = engine();
        let mut gallery = Gallery::new();
        gallery.enroll("alice", solid(220)).unwrap();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            engine.scan(solid(220), gallery.snapshot()),
        )
        .await;
        assert!(abandoned.is_err());

        let decision = engine.scan(solid(220), gallery.snapshot()).await.unwrap();
        assert!(decision.is_match());
    }

    #[tokio::test]
    async fn test_compare_is_symmetric() {
        let engine = engine();
        let ab = engine.compare(solid(100), solid(110)).await.unwrap();
        let ba = engine.compare(solid(110), solid(100)).await.unwrap();
        assert_eq!(ab, ba);
        assert!((ab - 84.0).abs() < 1e-3);
    }
}

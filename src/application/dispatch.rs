//! Bounded-wait rendering: answer inline when the renderer is quick, hand the
//! still-running render to the background otherwise.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use metrics::{counter, histogram};
use tracing::{info, warn};

use crate::{
    application::render::{
        DocumentRenderer, InFlightRenders, RenderError, RenderedDocument, spawn_shared,
    },
    domain::content::ContentId,
};

const METRIC_FAST_PATH: &str = "docket_render_fast_path_total";
const METRIC_DEFERRED: &str = "docket_render_deferred_total";
const METRIC_FAILED: &str = "docket_render_failed_total";
const METRIC_WAIT_MS: &str = "docket_render_wait_ms";

/// Result of racing a render against its deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Completed(RenderedDocument),
    /// The deadline passed first. The render keeps running and is parked under
    /// `handoff` for the delivery job to adopt.
    TimedOut { handoff: String },
}

#[derive(Clone)]
pub struct RenderDispatcher {
    renderer: Arc<dyn DocumentRenderer>,
    in_flight: InFlightRenders,
    handoff_grace: Duration,
}

impl RenderDispatcher {
    pub fn new(
        renderer: Arc<dyn DocumentRenderer>,
        in_flight: InFlightRenders,
        handoff_grace: Duration,
    ) -> Self {
        Self {
            renderer,
            in_flight,
            handoff_grace,
        }
    }

    /// Wait at most `deadline` for `content_id` to render.
    ///
    /// The render runs on its own task, so returning `TimedOut` never waits on
    /// it and never cancels it. Renderer failures inside the deadline are
    /// returned as errors, not as timeouts.
    pub async fn render_with_deadline(
        &self,
        content_id: ContentId,
        deadline: Duration,
    ) -> Result<RenderOutcome, RenderError> {
        let started_at = Instant::now();
        let renderer = Arc::clone(&self.renderer);
        let render = spawn_shared(async move { renderer.render(content_id).await });

        let outcome = match tokio::time::timeout(deadline, render.clone()).await {
            Ok(Ok(document)) => {
                counter!(METRIC_FAST_PATH).increment(1);
                Ok(RenderOutcome::Completed(document))
            }
            Ok(Err(err)) => {
                warn!(
                    target = "application::dispatch::render_with_deadline",
                    content_id,
                    error = %err,
                    "render failed before deadline"
                );
                counter!(METRIC_FAILED).increment(1);
                Err(err)
            }
            Err(_) => {
                let handoff = self.in_flight.park(content_id, render, self.handoff_grace);
                info!(
                    target = "application::dispatch::render_with_deadline",
                    content_id,
                    deadline_ms = deadline.as_millis() as u64,
                    handoff = %handoff,
                    "render exceeded deadline; continuing in background"
                );
                counter!(METRIC_DEFERRED).increment(1);
                Ok(RenderOutcome::TimedOut { handoff })
            }
        };

        histogram!(METRIC_WAIT_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        outcome
    }

    pub fn in_flight(&self) -> &InFlightRenders {
        &self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct SleepyRenderer {
        delay: Duration,
        fail: bool,
        finished: AtomicUsize,
    }

    impl SleepyRenderer {
        fn new(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                delay,
                fail,
                finished: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DocumentRenderer for SleepyRenderer {
        async fn render(&self, content_id: ContentId) -> Result<RenderedDocument, RenderError> {
            tokio::time::sleep(self.delay).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RenderError::Markdown("boom".to_string()));
            }
            Ok(RenderedDocument::html(format!("Doc {content_id}"), "<p>ok</p>"))
        }
    }

    fn dispatcher(renderer: Arc<SleepyRenderer>) -> RenderDispatcher {
        RenderDispatcher::new(renderer, InFlightRenders::new(), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn quick_render_completes_inline() {
        let renderer = SleepyRenderer::new(Duration::from_millis(10), false);
        let outcome = dispatcher(renderer)
            .render_with_deadline(3, Duration::from_millis(500))
            .await
            .expect("render");

        match outcome {
            RenderOutcome::Completed(document) => {
                assert_eq!(document.title, "Doc 3");
                assert_eq!(&document.bytes[..], b"<p>ok</p>");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_render_times_out_without_waiting_and_keeps_running() {
        let renderer = SleepyRenderer::new(Duration::from_millis(300), false);
        let dispatcher = dispatcher(Arc::clone(&renderer));

        let started = Instant::now();
        let outcome = dispatcher
            .render_with_deadline(4, Duration::from_millis(50))
            .await
            .expect("render");
        let waited = started.elapsed();

        let RenderOutcome::TimedOut { handoff } = outcome else {
            panic!("expected timeout");
        };
        assert!(waited < Duration::from_millis(250), "waited {waited:?}");
        assert_eq!(renderer.finished.load(Ordering::SeqCst), 0);

        let adopted = dispatcher.in_flight().take(&handoff, 4).expect("parked");
        let document = adopted.await.expect("render finished");
        assert_eq!(document.title, "Doc 4");
        assert_eq!(renderer.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_before_deadline_is_an_error() {
        let renderer = SleepyRenderer::new(Duration::from_millis(5), true);
        let err = dispatcher(renderer)
            .render_with_deadline(5, Duration::from_millis(500))
            .await
            .expect_err("failure surfaced");
        assert_eq!(err, RenderError::Markdown("boom".to_string()));
    }
}

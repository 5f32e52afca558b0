use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;
use uuid::Uuid;

use crate::domain::content::ContentId;

use super::types::{RenderError, RenderedDocument};

/// A render that keeps running on its own task and can be awaited by any
/// number of parties.
pub type SharedRender = Shared<BoxFuture<'static, Result<RenderedDocument, RenderError>>>;

/// Spawn `render` on the runtime and return a shareable handle to its result.
///
/// The task is detached: dropping every handle, or giving up on a deadline,
/// never cancels it.
pub fn spawn_shared<F>(render: F) -> SharedRender
where
    F: std::future::Future<Output = Result<RenderedDocument, RenderError>> + Send + 'static,
{
    let handle = tokio::spawn(render);
    async move {
        match handle.await {
            Ok(result) => result,
            Err(err) => Err(RenderError::Aborted(err.to_string())),
        }
    }
    .boxed()
    .shared()
}

struct ParkedRender {
    content_id: ContentId,
    render: SharedRender,
}

/// Renders that outlived their request deadline, parked until the delivery
/// job picks them up.
///
/// Single-process only: a worker in another process never finds the handoff
/// and renders again.
#[derive(Default, Clone)]
pub struct InFlightRenders {
    parked: Arc<DashMap<String, ParkedRender>>,
}

impl InFlightRenders {
    pub fn new() -> Self {
        Self {
            parked: Arc::new(DashMap::new()),
        }
    }

    /// Park a render and return the handoff id the delivery job should carry.
    ///
    /// The entry is dropped `grace` after the render settles if nobody adopted it.
    pub fn park(&self, content_id: ContentId, render: SharedRender, grace: Duration) -> String {
        let handoff = Uuid::new_v4().to_string();
        self.parked.insert(
            handoff.clone(),
            ParkedRender {
                content_id,
                render: render.clone(),
            },
        );

        let parked = Arc::clone(&self.parked);
        let key = handoff.clone();
        tokio::spawn(async move {
            let _ = render.await;
            tokio::time::sleep(grace).await;
            if parked.remove(&key).is_some() {
                debug!(
                    target = "application::render::in_flight",
                    handoff = %key,
                    "discarded unclaimed in-flight render"
                );
            }
        });

        handoff
    }

    /// Adopt a parked render. Returns `None` when the handoff is unknown or
    /// belongs to a different content record.
    pub fn take(&self, handoff: &str, content_id: ContentId) -> Option<SharedRender> {
        let (_, parked) = self
            .parked
            .remove_if(handoff, |_, parked| parked.content_id == content_id)?;
        Some(parked.render)
    }

    pub fn len(&self) -> usize {
        self.parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn doc() -> RenderedDocument {
        RenderedDocument::html("t", "body")
    }

    #[tokio::test]
    async fn shared_render_resolves_for_every_waiter() {
        let render = spawn_shared(async { Ok(doc()) });
        let (a, b) = tokio::join!(render.clone(), render);
        assert_eq!(a.expect("first"), doc());
        assert_eq!(b.expect("second"), doc());
    }

    #[tokio::test]
    async fn dropped_handles_do_not_cancel_the_task() {
        let finished = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&finished);
        let render = spawn_shared(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.fetch_add(1, Ordering::SeqCst);
            Ok(doc())
        });
        drop(render);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn take_requires_matching_content() {
        let renders = InFlightRenders::new();
        let handoff = renders.park(1, spawn_shared(async { Ok(doc()) }), Duration::from_secs(60));

        assert!(renders.take(&handoff, 2).is_none());
        let adopted = renders.take(&handoff, 1).expect("adopted");
        assert_eq!(adopted.await.expect("render"), doc());
        assert!(renders.take(&handoff, 1).is_none());
    }

    #[tokio::test]
    async fn unclaimed_renders_expire_after_grace() {
        let renders = InFlightRenders::new();
        renders.park(1, spawn_shared(async { Ok(doc()) }), Duration::from_millis(10));
        assert_eq!(renders.len(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(renders.is_empty());
    }
}

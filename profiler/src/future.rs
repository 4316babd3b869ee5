use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use crate::lane::LaneKind;
use crate::profiler::Profiler;

pin_project! {
    /// Wraps a future built through `Profiler::profile_future` so that its
    /// completion records one task on a synthetic lane and recycles the lane.
    ///
    /// Dropping the wrapper before completion (cancellation) records the task
    /// up to that point; the lane is recycled either way.
    #[must_use = "futures do nothing unless polled"]
    pub struct ProfiledFuture<F> {
        #[pin]
        inner: F,
        completion: Option<LaneCompletion>,
    }
}

impl<F> ProfiledFuture<F> {
    pub(crate) fn inert(inner: F) -> Self {
        ProfiledFuture {
            inner,
            completion: None,
        }
    }

    pub(crate) fn recording(inner: F, completion: LaneCompletion) -> Self {
        ProfiledFuture {
            inner,
            completion: Some(completion),
        }
    }
}

impl<F: Future> Future for ProfiledFuture<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let output = ready!(this.inner.poll(cx));
        drop(this.completion.take());
        Poll::Ready(output)
    }
}

/// Records the lane task when dropped, exactly once.
pub(crate) struct LaneCompletion {
    pub profiler: Profiler,
    pub kind: LaneKind,
    pub lane_id: u64,
    pub start_nanos: u64,
    pub description: String,
}

impl Drop for LaneCompletion {
    fn drop(&mut self) {
        let description = std::mem::take(&mut self.description);
        self.profiler
            .finish_lane(&self.kind, self.lane_id, self.start_nanos, description);
    }
}

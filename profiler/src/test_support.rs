use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// Cloneable in-memory sink; the clone kept by a test observes everything
/// the writer thread wrote through its clone.
#[derive(Clone, Default)]
pub(crate) struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().clone()
    }

    pub fn events(&self) -> Vec<serde_json::Value> {
        serde_json::from_slice(&self.bytes()).expect("trace is a valid JSON array")
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

const VTABLE: RawWakerVTable = RawWakerVTable::new(
    |_| RawWaker::new(std::ptr::null(), &VTABLE),
    |_| {},
    |_| {},
    |_| {},
);

/// Waker that does nothing; enough to poll futures in tests.
pub(crate) fn noop_waker() -> Waker {
    // SAFETY: every vtable entry ignores its argument.
    unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
}

/// Polls a future that is expected to be immediately ready.
pub(crate) fn poll_now<F: std::future::Future>(future: F) -> F::Output {
    let waker = noop_waker();
    let mut cx = std::task::Context::from_waker(&waker);
    let mut future = std::pin::pin!(future);
    match future.as_mut().poll(&mut cx) {
        std::task::Poll::Ready(output) => output,
        std::task::Poll::Pending => panic!("future was not ready"),
    }
}

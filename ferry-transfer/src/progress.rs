//! Cumulative byte-count reporting.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc::UnboundedSender;

/// Receives the running total of bytes moved by a transfer.
pub trait Reporter: Send + Sync {
    fn progress(&self, cumulative: u64);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardReporter;

impl Reporter for DiscardReporter {
    fn progress(&self, _cumulative: u64) {}
}

/// Forwards totals into an unbounded channel until [`ChannelReporter::close`].
#[derive(Debug, Default)]
pub struct ChannelReporter {
    sender: Mutex<Option<UnboundedSender<u64>>>,
}

impl ChannelReporter {
    pub fn new(sender: UnboundedSender<u64>) -> Self {
        Self::from_option(Some(sender))
    }

    pub fn from_option(sender: Option<UnboundedSender<u64>>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }

    /// Drop the sender. Later reports go nowhere.
    pub fn close(&self) {
        self.sender.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

impl Reporter for ChannelReporter {
    fn progress(&self, cumulative: u64) {
        let guard = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sender) = guard.as_ref() {
            // A dropped receiver only means nobody is watching.
            let _ = sender.send(cumulative);
        }
    }
}

/// Shared running total; every increment is reported.
#[derive(Clone)]
pub struct ProgressCounter {
    total: Arc<AtomicU64>,
    reporter: Arc<dyn Reporter>,
}

impl ProgressCounter {
    pub fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self {
            total: Arc::new(AtomicU64::new(0)),
            reporter,
        }
    }

    pub fn add(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        let total = self.total.fetch_add(bytes, Ordering::SeqCst) + bytes;
        self.reporter.progress(total);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Stream adapters
// ---------------------------------------------------------------------------

pub(crate) struct ProgressReader<R> {
    inner: R,
    counter: ProgressCounter,
}

impl<R> ProgressReader<R> {
    pub(crate) fn new(inner: R, counter: ProgressCounter) -> Self {
        Self { inner, counter }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            self.counter.add((buf.filled().len() - before) as u64);
        }
        poll
    }
}

pub(crate) struct ProgressWriter<W> {
    inner: W,
    counter: ProgressCounter,
}

impl<W> ProgressWriter<W> {
    pub(crate) fn new(inner: W, counter: ProgressCounter) -> Self {
        Self { inner, counter }
    }

    pub(crate) fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for ProgressWriter<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = poll {
            self.counter.add(n as u64);
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

//! Per-connection idle timeout.
//!
//! # Responsibilities
//! - Tag each accepted connection with a unique id for tracing
//! - Close connections that have had no request in flight and no read or
//!   write progress for the idle timeout
//!
//! The acceptor sits innermost, directly on the TCP stream, so a TLS
//! handshake that stalls is covered by the same clock. Its service wrapper
//! shares the connection's activity, which holds the clock while a handler
//! is still working.

use std::future::{ready, Future, Ready};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use axum_server::accept::Accept;
use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant, Sleep};
use tower::Service;

/// Relaxed ordering is enough: only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Requests in flight on one connection, and when the last one finished.
#[derive(Debug, Default)]
struct Activity {
    in_flight: AtomicUsize,
    last_done: Mutex<Option<Instant>>,
}

impl Activity {
    fn begin(self: &Arc<Self>) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlight(Arc::clone(self))
    }

    /// The next deadline if the connection is not idle yet.
    fn extend(&self, timeout: Duration) -> Option<Instant> {
        let now = Instant::now();
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            return Some(now + timeout);
        }
        let last_done = *self.last_done.lock().unwrap_or_else(PoisonError::into_inner);
        last_done
            .map(|done| done + timeout)
            .filter(|next| *next > now)
    }
}

/// Held for as long as a request's handler runs.
struct InFlight(Arc<Activity>);

impl Drop for InFlight {
    fn drop(&mut self) {
        *self.0.last_done.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Wraps every accepted stream in an [`IdleStream`] and its service in an
/// [`IdleService`] sharing the same activity.
#[derive(Debug, Clone, Copy)]
pub struct IdleAcceptor {
    timeout: Duration,
}

impl IdleAcceptor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl<I, S> Accept<I, S> for IdleAcceptor
where
    I: AsyncRead + AsyncWrite + Unpin,
{
    type Stream = IdleStream<I>;
    type Service = IdleService<S>;
    type Future = Ready<io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let stream = IdleStream::new(stream, self.timeout);
        let service = IdleService {
            inner: service,
            activity: Arc::clone(&stream.activity),
        };
        ready(Ok((stream, service)))
    }
}

/// Marks its connection busy until each response is produced.
#[derive(Debug, Clone)]
pub struct IdleService<S> {
    inner: S,
    activity: Arc<Activity>,
}

impl<S, R> Service<R> for IdleService<S>
where
    S: Service<R>,
    S::Future: Send + 'static,
    S::Response: 'static,
    S::Error: 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: R) -> Self::Future {
        let in_flight = self.activity.begin();
        let response = self.inner.call(request);
        Box::pin(async move {
            let response = response.await;
            drop(in_flight);
            response
        })
    }
}

/// A stream that fails with [`io::ErrorKind::TimedOut`] once it has been
/// idle for longer than its timeout.
#[derive(Debug)]
pub struct IdleStream<I> {
    inner: I,
    id: ConnectionId,
    timeout: Duration,
    deadline: Pin<Box<Sleep>>,
    activity: Arc<Activity>,
}

impl<I> IdleStream<I> {
    pub fn new(inner: I, timeout: Duration) -> Self {
        let id = ConnectionId::new();
        tracing::trace!(connection_id = %id, "Connection accepted");
        Self {
            inner,
            id,
            timeout,
            deadline: Box::pin(tokio::time::sleep(timeout)),
            activity: Arc::default(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    fn touch(&mut self) {
        let next = Instant::now() + self.timeout;
        self.deadline.as_mut().reset(next);
    }

    /// Called only when the inner I/O is pending.
    fn poll_idle<T>(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<T>> {
        while self.deadline.as_mut().poll(cx).is_ready() {
            match self.activity.extend(self.timeout) {
                Some(next) => self.deadline.as_mut().reset(next),
                None => {
                    tracing::debug!(connection_id = %self.id, timeout = ?self.timeout, "Closing idle connection");
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "connection idle timeout",
                    )));
                }
            }
        }
        Poll::Pending
    }
}

impl<I> Drop for IdleStream<I> {
    fn drop(&mut self) {
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

impl<I: AsyncRead + Unpin> AsyncRead for IdleStream<I> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(result) => {
                this.touch();
                Poll::Ready(result)
            }
            Poll::Pending => this.poll_idle(cx),
        }
    }
}

impl<I: AsyncWrite + Unpin> AsyncWrite for IdleStream<I> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(result) => {
                this.touch();
                Poll::Ready(result)
            }
            Poll::Pending => this.poll_idle(cx),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_flush(cx) {
            Poll::Ready(result) => Poll::Ready(result),
            Poll::Pending => this.poll_idle(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write_vectored(cx, bufs) {
            Poll::Ready(result) => {
                this.touch();
                Poll::Ready(result)
            }
            Poll::Pending => this.poll_idle(cx),
        }
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}

//! Request body producer and streaming response body receiver.
//!
//! # Design
//! Both halves consume `self` at the point where the lifecycle
//! allows "exactly once": `BodyProducer::start_producing` writes the payload a
//! single time, and `BodyReceiver::connection_lost` resolves the completion
//! signal a single time. Double use is a compile error rather than a runtime
//! check.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;

use crate::error::FetchError;

/// Completion signal a `BodyReceiver` resolves when the stream ends.
pub type BodySignal = oneshot::Sender<Result<Bytes, FetchError>>;

/// Supplies a static request payload to a transport.
///
/// The length is known up front so the transport can send `Content-Length`
/// before any byte is written.
#[derive(Debug, Clone)]
pub struct BodyProducer {
    body: Bytes,
}

impl BodyProducer {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self { body: body.into() }
    }

    /// Exact number of bytes `start_producing` will write.
    pub fn length(&self) -> u64 {
        self.body.len() as u64
    }

    /// Write the whole payload to `consumer` and flush it.
    ///
    /// Consumer I/O errors are returned unchanged.
    pub async fn start_producing<W>(self, consumer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        consumer.write_all(&self.body).await?;
        consumer.flush().await
    }
}

/// Accumulates body chunks pushed by a transport into one buffer.
#[derive(Debug)]
pub struct BodyReceiver {
    buffer: BytesMut,
    finished: BodySignal,
}

impl BodyReceiver {
    pub fn new(finished: BodySignal) -> Self {
        Self {
            buffer: BytesMut::new(),
            finished,
        }
    }

    /// Append one chunk. Empty chunks are accepted and change nothing.
    pub fn data_received(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Bytes accumulated so far.
    pub fn received(&self) -> usize {
        self.buffer.len()
    }

    /// End of stream. `Ok(())` resolves the signal with everything received;
    /// an error reason is forwarded instead.
    pub fn connection_lost(self, reason: Result<(), FetchError>) {
        let outcome = reason.map(|()| self.buffer.freeze());
        // The fetch that owns the other end may have been dropped; nothing
        // is waiting for the body in that case.
        let _ = self.finished.send(outcome);
    }
}

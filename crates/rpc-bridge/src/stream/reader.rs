//! Asynchronous reader that turns a body stream into a stream of messages.
//!
//! A spawned task pulls chunks from the source, runs them through a
//! [`FrameDecoder`] and pushes [`StreamEvent`]s over an unbounded channel.
//! The consumer side is [`MessageStream`]. Dropping it stops the task.

use super::{BoxError, FrameDecoder, StreamReadError};
use axum::body::Body;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One item delivered to the consumer
#[derive(Debug)]
pub enum StreamEvent<T> {
    /// A decoded message
    Data(T),
    /// The source ended and every frame was delivered
    End,
    /// Reading stopped; no further events follow
    Error(StreamReadError),
}

/// Reads separator-delimited messages of type `T` from a chunked body.
pub struct StreamMessageReader<T> {
    source: BoxStream<'static, Result<Bytes, BoxError>>,
    idle_timeout: Option<Duration>,
    _message: PhantomData<fn() -> T>,
}

impl<T> StreamMessageReader<T>
where
    T: DeserializeOwned + Send + 'static,
{
    pub fn new<S, B, E>(source: S) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: Into<Bytes>,
        E: Into<BoxError>,
    {
        Self {
            source: source.map(|chunk| chunk.map(Into::into).map_err(Into::into)).boxed(),
            idle_timeout: None,
            _message: PhantomData,
        }
    }

    /// Reader over an HTTP request body.
    pub fn from_body(body: Body) -> Self {
        Self::new(body.into_data_stream())
    }

    /// Fail with [`StreamReadError::Timeout`] when no chunk arrives in time.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Spawn the reading task and hand back the consumer side.
    pub fn start(self) -> MessageStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(tx));
        MessageStream {
            events: rx,
            task,
            finished: false,
        }
    }

    async fn run(mut self, tx: mpsc::UnboundedSender<StreamEvent<T>>) {
        let mut decoder = FrameDecoder::<T>::new();
        let mut delivered = 0usize;

        loop {
            let next = match self.idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, self.source.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(?limit, delivered, "Stream idle timeout");
                        let _ = tx.send(StreamEvent::Error(StreamReadError::Timeout(limit)));
                        return;
                    }
                },
                None => self.source.next().await,
            };

            let result = match next {
                Some(Ok(chunk)) => decoder.feed(&chunk, |message| {
                    delivered += 1;
                    let _ = tx.send(StreamEvent::Data(message));
                }),
                Some(Err(e)) => Err(StreamReadError::Source(e)),
                None => {
                    let result = decoder.finish(|message| {
                        delivered += 1;
                        let _ = tx.send(StreamEvent::Data(message));
                    });
                    if result.is_ok() {
                        debug!(delivered, "Stream ended");
                        let _ = tx.send(StreamEvent::End);
                        return;
                    }
                    result
                }
            };

            if let Err(e) = result {
                warn!(error = %e, delivered, "Stream read failed");
                let _ = tx.send(StreamEvent::Error(e));
                return;
            }

            if tx.is_closed() {
                debug!(delivered, "Stream consumer dropped");
                return;
            }
        }
    }
}

/// Consumer side of a started [`StreamMessageReader`].
///
/// Yields `Ok(message)` per frame, at most one `Err`, then `None`.
pub struct MessageStream<T> {
    events: mpsc::UnboundedReceiver<StreamEvent<T>>,
    task: JoinHandle<()>,
    finished: bool,
}

impl<T> MessageStream<T> {
    /// Next raw event. `None` once the reader task is gone.
    pub async fn next_event(&mut self) -> Option<StreamEvent<T>> {
        self.events.recv().await
    }

    /// Next message, `Ok(None)` at end of stream.
    pub async fn next_message(&mut self) -> Result<Option<T>, StreamReadError> {
        self.next().await.transpose()
    }

    /// Drain the stream into a vector.
    pub async fn collect_messages(mut self) -> Result<Vec<T>, StreamReadError> {
        let mut messages = Vec::new();
        while let Some(message) = self.next_message().await? {
            messages.push(message);
        }
        Ok(messages)
    }

    /// Stop reading. Events already queued are discarded.
    pub fn cancel(self) {
        self.task.abort();
    }
}

impl<T> Unpin for MessageStream<T> {}

impl<T> Stream for MessageStream<T> {
    type Item = Result<T, StreamReadError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        let item = match ready!(self.events.poll_recv(cx)) {
            Some(StreamEvent::Data(message)) => return Poll::Ready(Some(Ok(message))),
            Some(StreamEvent::End) => None,
            Some(StreamEvent::Error(e)) => Some(Err(e)),
            None => Some(Err(StreamReadError::Aborted)),
        };
        self.finished = true;
        Poll::Ready(item)
    }
}

impl<T> Drop for MessageStream<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::{LineCodec, SourceError, SourceObject};

pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

const READ_BUFFER_BYTES: usize = 64 * 1024;

/// Lazy, forward-only sequence of lines read from one opened object.
pub struct LineStream {
    object: SourceObject,
    framed: FramedRead<ObjectReader, LineCodec>,
    lines_read: u64,
}

impl LineStream {
    pub fn new<R>(object: SourceObject, reader: R, codec: LineCodec) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        let reader: ObjectReader = Box::pin(reader);
        Self {
            object,
            framed: FramedRead::with_capacity(reader, codec, READ_BUFFER_BYTES),
            lines_read: 0,
        }
    }

    pub fn object(&self) -> &SourceObject {
        &self.object
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    pub async fn next_line(&mut self) -> Option<Result<Bytes, SourceError>> {
        self.next().await
    }
}

impl Stream for LineStream {
    type Item = Result<Bytes, SourceError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.framed).poll_next(cx) {
            Poll::Ready(Some(Ok(line))) => {
                this.lines_read += 1;
                Poll::Ready(Some(Ok(line)))
            }
            Poll::Ready(Some(Err(source))) => Poll::Ready(Some(Err(SourceError::Read {
                object: this.object.to_string(),
                source,
            }))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for LineStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineStream")
            .field("object", &self.object)
            .field("lines_read", &self.lines_read)
            .finish_non_exhaustive()
    }
}

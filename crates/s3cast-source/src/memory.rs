use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::{LineCodec, LineStream, Locator, ObjectSource, SourceError, SourceObject};

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    failure: Option<String>,
}

/// In-memory object store. Objects list in key order, like an S3 bucket.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    buckets: BTreeMap<String, BTreeMap<String, MemoryObject>>,
    codec: LineCodec,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec(mut self, codec: LineCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn insert(&mut self, bucket: &str, key: &str, data: impl Into<Bytes>) -> &mut Self {
        self.put(bucket, key, data.into(), None)
    }

    /// Stores an object whose reads fail with `reason` once `data` is consumed.
    pub fn insert_failing(
        &mut self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        reason: &str,
    ) -> &mut Self {
        self.put(bucket, key, data.into(), Some(reason.to_string()))
    }

    pub fn create_bucket(&mut self, bucket: &str) -> &mut Self {
        self.buckets.entry(bucket.to_string()).or_default();
        self
    }

    fn put(&mut self, bucket: &str, key: &str, data: Bytes, failure: Option<String>) -> &mut Self {
        self.buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), MemoryObject { data, failure });
        self
    }
}

impl ObjectSource for MemorySource {
    async fn list_objects(&self, locator: &Locator) -> Result<Vec<SourceObject>, SourceError> {
        let objects = self
            .buckets
            .get(locator.bucket())
            .ok_or_else(|| SourceError::BucketNotFound {
                bucket: locator.bucket().to_string(),
            })?;

        Ok(objects
            .iter()
            .filter(|(key, _)| key.starts_with(locator.prefix()))
            .map(|(key, object)| {
                SourceObject::new(locator.scheme(), locator.bucket(), key.as_str())
                    .with_size(object.data.len() as u64)
            })
            .collect())
    }

    async fn open(&self, object: &SourceObject) -> Result<LineStream, SourceError> {
        let stored = self
            .buckets
            .get(object.bucket())
            .and_then(|objects| objects.get(object.key()))
            .ok_or_else(|| SourceError::ObjectNotFound {
                object: object.to_string(),
            })?;

        let body = io::Cursor::new(stored.data.clone());
        let stream = match &stored.failure {
            Some(reason) => LineStream::new(
                object.clone(),
                body.chain(FailingReader {
                    reason: reason.clone(),
                }),
                self.codec.clone(),
            ),
            None => LineStream::new(object.clone(), body, self.codec.clone()),
        };
        Ok(stream)
    }
}

struct FailingReader {
    reason: String,
}

impl AsyncRead for FailingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::other(self.reason.clone())))
    }
}

use std::io;

use thiserror::Error;

use crate::LocatorError;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Locator(#[from] LocatorError),

    #[error("unsupported locator scheme `{scheme}`")]
    UnsupportedScheme { scheme: String },

    #[error("bucket `{bucket}` not found")]
    BucketNotFound { bucket: String },

    #[error("object {object} not found")]
    ObjectNotFound { object: String },

    #[error("failed to list {locator}: {reason}")]
    List { locator: String, reason: String },

    #[error("failed to open {object}: {source}")]
    Open {
        object: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {object}: {source}")]
    Read {
        object: String,
        #[source]
        source: io::Error,
    },

    #[error("{operation} {target} failed: {source}")]
    Storage {
        operation: &'static str,
        target: String,
        #[source]
        source: opendal::Error,
    },

    #[error("invalid s3 endpoint `{endpoint}`: {reason}")]
    Endpoint { endpoint: String, reason: String },
}

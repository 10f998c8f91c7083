use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::TryStreamExt;
use opendal::services::S3;
use opendal::{ErrorKind, Operator};
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::{LineCodec, LineStream, Locator, ObjectSource, SourceError, SourceObject};

const DEFAULT_REGION: &str = "us-east-1";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Reads `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Option<Self> {
        let access_key_id = non_empty_env("AWS_ACCESS_KEY_ID")?;
        let secret_access_key = non_empty_env("AWS_SECRET_ACCESS_KEY")?;
        Some(Self {
            access_key_id,
            secret_access_key,
            session_token: non_empty_env("AWS_SESSION_TOKEN"),
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone)]
pub struct S3Options {
    pub region: String,
    /// Custom endpoint for S3-compatible stores; `None` targets AWS.
    pub endpoint: Option<String>,
    pub path_style: bool,
    pub credentials: Option<Credentials>,
}

impl Default for S3Options {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            path_style: false,
            credentials: None,
        }
    }
}

impl S3Options {
    /// Region, endpoint and credentials from the standard `AWS_*` variables.
    pub fn from_env() -> Self {
        let region = ["AWS_REGION", "AWS_DEFAULT_REGION"]
            .iter()
            .find_map(|name| non_empty_env(name))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        Self {
            region,
            endpoint: non_empty_env("AWS_ENDPOINT_URL"),
            path_style: false,
            credentials: Credentials::from_env(),
        }
    }
}

/// Object source backed by an S3 bucket through an OpenDAL operator.
///
/// One operator is built per bucket on first use and reused afterwards.
#[derive(Debug, Clone)]
pub struct S3Source {
    options: S3Options,
    operators: Arc<Mutex<HashMap<String, Operator>>>,
    codec: LineCodec,
}

impl S3Source {
    pub fn new(options: S3Options) -> Result<Self, SourceError> {
        if let Some(endpoint) = options.endpoint.as_deref() {
            check_endpoint(endpoint)?;
        }
        Ok(Self {
            options,
            operators: Arc::new(Mutex::new(HashMap::new())),
            codec: LineCodec::new(),
        })
    }

    pub fn with_codec(mut self, codec: LineCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn is_signed(&self) -> bool {
        self.options.credentials.is_some()
    }

    /// Dotted bucket names break virtual-host TLS certificates, so they stay path-style.
    fn virtual_host_style(&self, bucket: &str) -> bool {
        !self.options.path_style && !bucket.contains('.')
    }

    fn operator(&self, bucket: &str) -> Result<Operator, SourceError> {
        if let Ok(cache) = self.operators.lock() {
            if let Some(operator) = cache.get(bucket) {
                return Ok(operator.clone());
            }
        }

        let operator = self.build_operator(bucket)?;
        if let Ok(mut cache) = self.operators.lock() {
            cache.insert(bucket.to_string(), operator.clone());
        }
        Ok(operator)
    }

    fn build_operator(&self, bucket: &str) -> Result<Operator, SourceError> {
        let mut builder = S3::default()
            .bucket(bucket)
            .region(&self.options.region)
            .root("/");
        if let Some(endpoint) = self.options.endpoint.as_deref() {
            builder = builder.endpoint(endpoint);
        }
        if self.virtual_host_style(bucket) {
            builder = builder.enable_virtual_host_style();
        }
        match &self.options.credentials {
            Some(credentials) => {
                builder = builder
                    .access_key_id(&credentials.access_key_id)
                    .secret_access_key(&credentials.secret_access_key);
                if let Some(token) = credentials.session_token.as_deref() {
                    builder = builder.session_token(token);
                }
            }
            None => builder = builder.allow_anonymous(),
        }

        debug!(
            bucket,
            region = %self.options.region,
            virtual_host = self.virtual_host_style(bucket),
            "building s3 operator"
        );
        Operator::new(builder)
            .map(|operator| operator.finish())
            .map_err(|source| SourceError::Storage {
                operation: "configure",
                target: format!("s3://{bucket}"),
                source,
            })
    }
}

fn check_endpoint(endpoint: &str) -> Result<(), SourceError> {
    let invalid = |reason: &str| SourceError::Endpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };
    let Some((scheme, rest)) = endpoint.split_once("://") else {
        return Err(invalid("missing http:// or https:// prefix"));
    };
    if !matches!(scheme, "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if rest.trim_end_matches('/').is_empty() {
        return Err(invalid("missing host"));
    }
    Ok(())
}

fn list_error(locator: &Locator, source: opendal::Error) -> SourceError {
    if source.kind() == ErrorKind::NotFound {
        return SourceError::BucketNotFound {
            bucket: locator.bucket().to_string(),
        };
    }
    SourceError::Storage {
        operation: "list",
        target: locator.to_string(),
        source,
    }
}

fn open_error(object: &SourceObject, source: opendal::Error) -> SourceError {
    if source.kind() == ErrorKind::NotFound {
        return SourceError::ObjectNotFound {
            object: object.to_string(),
        };
    }
    SourceError::Storage {
        operation: "open",
        target: object.to_string(),
        source,
    }
}

impl ObjectSource for S3Source {
    async fn list_objects(&self, locator: &Locator) -> Result<Vec<SourceObject>, SourceError> {
        let operator = self.operator(locator.bucket())?;
        let path = match locator.prefix() {
            "" => "/",
            prefix => prefix,
        };

        let mut lister = operator
            .lister_with(path)
            .recursive(true)
            .await
            .map_err(|err| list_error(locator, err))?;

        let mut objects = Vec::new();
        while let Some(entry) = lister
            .try_next()
            .await
            .map_err(|err| list_error(locator, err))?
        {
            let metadata = entry.metadata();
            if !metadata.is_file() || !entry.path().starts_with(locator.prefix()) {
                continue;
            }
            objects.push(
                SourceObject::new(locator.scheme(), locator.bucket(), entry.path())
                    .with_size(metadata.content_length()),
            );
        }

        debug!(locator = %locator, objects = objects.len(), "s3 listing finished");
        Ok(objects)
    }

    async fn open(&self, object: &SourceObject) -> Result<LineStream, SourceError> {
        let operator = self.operator(object.bucket())?;
        operator
            .stat(object.key())
            .await
            .map_err(|err| open_error(object, err))?;

        let reader = operator
            .reader(object.key())
            .await
            .map_err(|err| open_error(object, err))?;
        let body = reader
            .into_bytes_stream(..)
            .await
            .map_err(|err| open_error(object, err))?;

        Ok(LineStream::new(
            object.clone(),
            StreamReader::new(body),
            self.codec.clone(),
        ))
    }
}

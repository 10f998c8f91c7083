use std::path::{Component, Path, PathBuf};

use tokio::fs::File;
use walkdir::WalkDir;

use crate::{LineCodec, LineStream, Locator, ObjectSource, SourceError, SourceObject};

/// Serves objects from the local filesystem: a bucket is a directory under `root`,
/// a key is a `/`-separated path relative to that directory.
#[derive(Debug, Clone)]
pub struct LocalFsSource {
    root: PathBuf,
    codec: LineCodec,
}

impl LocalFsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            codec: LineCodec::new(),
        }
    }

    pub fn with_codec(mut self, codec: LineCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A bucket must name exactly one directory directly under `root`.
    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, SourceError> {
        let mut components = Path::new(bucket).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(bucket)),
            _ => Err(SourceError::BucketNotFound {
                bucket: bucket.to_string(),
            }),
        }
    }

    fn object_path(&self, object: &SourceObject) -> Result<PathBuf, SourceError> {
        let bucket_dir = self.bucket_dir(object.bucket())?;
        let key = Path::new(object.key());
        let contained = !object.key().is_empty()
            && key
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !contained {
            return Err(SourceError::ObjectNotFound {
                object: object.to_string(),
            });
        }
        Ok(bucket_dir.join(key))
    }
}

impl ObjectSource for LocalFsSource {
    async fn list_objects(&self, locator: &Locator) -> Result<Vec<SourceObject>, SourceError> {
        let bucket_dir = self.bucket_dir(locator.bucket())?;
        let label = locator.to_string();
        let locator = locator.clone();

        tokio::task::spawn_blocking(move || list_bucket_dir(&bucket_dir, &locator))
            .await
            .map_err(|err| SourceError::List {
                locator: label,
                reason: format!("listing task failed: {err}"),
            })?
    }

    async fn open(&self, object: &SourceObject) -> Result<LineStream, SourceError> {
        let path = self.object_path(object)?;
        let file = File::open(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SourceError::ObjectNotFound {
                    object: object.to_string(),
                }
            } else {
                SourceError::Open {
                    object: object.to_string(),
                    source,
                }
            }
        })?;
        Ok(LineStream::new(object.clone(), file, self.codec.clone()))
    }
}

fn list_bucket_dir(bucket_dir: &Path, locator: &Locator) -> Result<Vec<SourceObject>, SourceError> {
    if !bucket_dir.is_dir() {
        return Err(SourceError::BucketNotFound {
            bucket: locator.bucket().to_string(),
        });
    }

    let mut objects = Vec::new();
    for entry in WalkDir::new(bucket_dir)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|err| SourceError::List {
            locator: locator.to_string(),
            reason: err.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(key) = object_key(bucket_dir, entry.path()) else {
            continue;
        };
        if !key.starts_with(locator.prefix()) {
            continue;
        }

        let mut object = SourceObject::new(locator.scheme(), locator.bucket(), key);
        if let Ok(metadata) = entry.metadata() {
            object = object.with_size(metadata.len());
        }
        objects.push(object);
    }
    Ok(objects)
}

fn object_key(bucket_dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(bucket_dir).ok()?;
    let parts = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<Vec<&str>>>()?;
    Some(parts.join("/"))
}

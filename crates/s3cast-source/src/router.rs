use crate::{
    LineStream, LocalFsSource, Locator, MemorySource, ObjectSource, S3Source, SourceError,
    SourceObject,
};

pub const S3_SCHEMES: &[&str] = &["s3", "s3a", "s3n"];
pub const FILE_SCHEME: &str = "file";
pub const MEMORY_SCHEME: &str = "mem";

/// Dispatches locators to the backend registered for their scheme.
#[derive(Debug, Clone, Default)]
pub struct SourceRouter {
    fs: Option<LocalFsSource>,
    s3: Option<S3Source>,
    memory: Option<MemorySource>,
}

enum Backend<'a> {
    Fs(&'a LocalFsSource),
    S3(&'a S3Source),
    Memory(&'a MemorySource),
}

impl SourceRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fs(mut self, source: LocalFsSource) -> Self {
        self.fs = Some(source);
        self
    }

    pub fn with_s3(mut self, source: S3Source) -> Self {
        self.s3 = Some(source);
        self
    }

    pub fn with_memory(mut self, source: MemorySource) -> Self {
        self.memory = Some(source);
        self
    }

    pub fn supports(&self, scheme: &str) -> bool {
        self.backend(scheme).is_ok()
    }

    /// Fails fast for locators no registered backend can serve.
    pub fn check(&self, locator: &Locator) -> Result<(), SourceError> {
        self.backend(locator.scheme()).map(|_| ())
    }

    fn backend(&self, scheme: &str) -> Result<Backend<'_>, SourceError> {
        let backend = if S3_SCHEMES.contains(&scheme) {
            self.s3.as_ref().map(Backend::S3)
        } else if scheme == FILE_SCHEME {
            self.fs.as_ref().map(Backend::Fs)
        } else if scheme == MEMORY_SCHEME {
            self.memory.as_ref().map(Backend::Memory)
        } else {
            None
        };

        backend.ok_or_else(|| SourceError::UnsupportedScheme {
            scheme: scheme.to_string(),
        })
    }
}

impl ObjectSource for SourceRouter {
    async fn list_objects(&self, locator: &Locator) -> Result<Vec<SourceObject>, SourceError> {
        match self.backend(locator.scheme())? {
            Backend::Fs(source) => source.list_objects(locator).await,
            Backend::S3(source) => source.list_objects(locator).await,
            Backend::Memory(source) => source.list_objects(locator).await,
        }
    }

    async fn open(&self, object: &SourceObject) -> Result<LineStream, SourceError> {
        match self.backend(object.scheme())? {
            Backend::Fs(source) => source.open(object).await,
            Backend::S3(source) => source.open(object).await,
            Backend::Memory(source) => source.open(object).await,
        }
    }
}

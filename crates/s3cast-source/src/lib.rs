mod codec;
mod error;
mod fs;
mod locator;
mod memory;
mod object;
mod router;
mod s3;
mod source;
mod stream;

pub use codec::LineCodec;
pub use error::SourceError;
pub use fs::LocalFsSource;
pub use locator::{Locator, LocatorError};
pub use memory::MemorySource;
pub use object::SourceObject;
pub use router::{SourceRouter, FILE_SCHEME, MEMORY_SCHEME, S3_SCHEMES};
pub use s3::{Credentials, S3Options, S3Source};
pub use source::ObjectSource;
pub use stream::{LineStream, ObjectReader};

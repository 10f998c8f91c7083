use std::future::Future;

use crate::{LineStream, Locator, SourceError, SourceObject};

/// Capability to enumerate objects under a locator and open each one as a line stream.
///
/// `list_objects` returns objects in the store's own order; callers must not re-sort.
pub trait ObjectSource {
    fn list_objects(
        &self,
        locator: &Locator,
    ) -> impl Future<Output = Result<Vec<SourceObject>, SourceError>> + Send;

    fn open(
        &self,
        object: &SourceObject,
    ) -> impl Future<Output = Result<LineStream, SourceError>> + Send;
}

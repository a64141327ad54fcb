//! Remote API capability consumed by the engine

use crate::error::CallError;
use crate::types::{Cursor, ReplyPage, SearchFilters, SearchPage, ThreadPage};

/// Paginated comment API.
///
/// Implementations perform exactly one request per call and classify its
/// failure; retry and backoff live in the [`Governor`](crate::Governor).
pub trait RemoteClient {
    /// One page of unit ids matching `query`
    fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        cursor: Option<&Cursor>,
    ) -> Result<SearchPage, CallError>;

    /// One page of top-level threads for `unit_id`
    fn list_comments(&self, unit_id: &str, cursor: Option<&Cursor>)
    -> Result<ThreadPage, CallError>;

    /// One page of replies below `parent_id`
    fn list_replies(&self, parent_id: &str, cursor: Option<&Cursor>)
    -> Result<ReplyPage, CallError>;
}

impl<C: RemoteClient + ?Sized> RemoteClient for &C {
    fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        cursor: Option<&Cursor>,
    ) -> Result<SearchPage, CallError> {
        (**self).search(query, filters, cursor)
    }

    fn list_comments(
        &self,
        unit_id: &str,
        cursor: Option<&Cursor>,
    ) -> Result<ThreadPage, CallError> {
        (**self).list_comments(unit_id, cursor)
    }

    fn list_replies(
        &self,
        parent_id: &str,
        cursor: Option<&Cursor>,
    ) -> Result<ReplyPage, CallError> {
        (**self).list_replies(parent_id, cursor)
    }
}

//! Discovery: resolve explicit ids and search queries into source units

use indicatif::ProgressBar;
use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::client::RemoteClient;
use crate::error::HarvestError;
use crate::governor::{Governor, Operation};
use crate::types::{Cursor, SearchFilters, SourceUnit};

/// Content-affecting discovery inputs; also the cache key material.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryInput {
    /// Explicit unit ids, processed first in the given order
    pub unit_ids: Vec<String>,
    pub queries: Vec<String>,
    /// Search hits kept per query
    pub units_per_query: usize,
    pub filters: SearchFilters,
}

impl DiscoveryInput {
    pub fn is_empty(&self) -> bool {
        self.unit_ids.is_empty() && self.queries.is_empty()
    }

    /// Short blake3 hash of the canonical JSON form
    pub fn cache_key(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"));
        blake3::hash(canonical.as_bytes()).to_hex()[..16].to_string()
    }
}

/// Discovery outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovered {
    /// Unique units in first-seen order
    pub units: Vec<SourceUnit>,
    /// Queries dropped after a non-fatal search failure
    pub skipped_queries: usize,
}

/// Resolve `input` into an ordered, duplicate-free unit list.
///
/// Search failures skip the query with a warning; only a quota exhaustion
/// aborts discovery.
pub fn discover<C: RemoteClient + ?Sized>(
    input: &DiscoveryInput,
    client: &C,
    governor: &mut Governor,
    pb: &ProgressBar,
) -> Result<Discovered, HarvestError> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut out = Discovered::default();

    for id in &input.unit_ids {
        let id = id.trim();
        if id.is_empty() {
            continue;
        }
        if seen.insert(id.to_string()) {
            out.units.push(SourceUnit::explicit(id));
        }
    }

    for (i, query) in input.queries.iter().enumerate() {
        pb.set_message(format!("query {}/{}: {query}", i + 1, input.queries.len()));
        let hits = match search_query(query, input, client, governor) {
            Ok(hits) => hits,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::warn!("Skipping query '{query}': {e}");
                out.skipped_queries += 1;
                continue;
            }
        };

        let before = out.units.len();
        for id in hits {
            if seen.insert(id.clone()) {
                out.units.push(SourceUnit {
                    unit_id: id,
                    origin_query: Some(query.clone()),
                    published_after: input.filters.published_after,
                });
            }
        }
        log::info!(
            "Query '{query}': {} new units ({} total)",
            out.units.len() - before,
            out.units.len()
        );
    }

    Ok(out)
}

/// Page through search results for one query until the per-query cap or
/// the end of results
fn search_query<C: RemoteClient + ?Sized>(
    query: &str,
    input: &DiscoveryInput,
    client: &C,
    governor: &mut Governor,
) -> Result<Vec<String>, HarvestError> {
    let limit = input.units_per_query;
    let mut hits: Vec<String> = Vec::new();
    let mut cursor: Option<Cursor> = None;

    while hits.len() < limit {
        let requested = cursor.clone();
        let page = governor.call(Operation::Search, query, || {
            client.search(query, &input.filters, requested.as_ref())
        })?;
        if page.next_cursor.is_some() && page.next_cursor == requested {
            return Err(HarvestError::MalformedPage(format!(
                "search '{query}': next cursor repeats requested cursor"
            )));
        }

        let room = limit - hits.len();
        hits.extend(
            page.unit_ids
                .into_iter()
                .filter(|id| !id.is_empty())
                .take(room),
        );

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    log::debug!("Query '{query}': {} hits", hits.len());
    Ok(hits)
}

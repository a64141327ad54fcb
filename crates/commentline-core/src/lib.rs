//! Commentline Core - resumable harvesting engine for paginated comment APIs
//!
//! This crate drives discovery, per-unit pagination, deduplication and
//! checkpointing against any [`RemoteClient`], funnelling every remote call
//! through a single quota-aware [`Governor`].

pub mod checkpoint;
pub mod client;
pub mod discovery;
pub mod error;
pub mod export;
pub mod governor;
pub mod harvest;
pub mod http;
pub mod kv;
pub mod ledger;
pub mod logging;
pub mod paginator;
pub mod progress;
pub mod shutdown;
pub mod sink;
pub mod types;

// Re-exports for convenience
pub use checkpoint::{CheckpointRecord, CheckpointStore, Finish, StatusCounts, UnitStatus};
pub use client::RemoteClient;
pub use discovery::{Discovered, DiscoveryInput, discover};
pub use error::{CallError, HarvestError};
pub use export::{CommentsAccumulator, ExportStats, comments_schema, export_jsonl_to_parquet};
pub use governor::{BackoffPolicy, Governor, GovernorStats, Operation, Sleeper, ThreadSleeper};
pub use harvest::{HarvestConfig, Harvester, RunSummary};
pub use http::{
    HttpConfig, HttpError, HttpResponse, SHARED_RUNTIME, get_text, http_client, http_config,
    set_http_config,
};
pub use kv::{DurableKv, FileKv, KvError, MemoryKv};
pub use ledger::DedupLedger;
pub use logging::{IndicatifLogger, init_logging};
pub use paginator::{PageState, Paginator, ReplyPager};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use shutdown::{install_signal_handlers, is_shutdown_requested, shutdown_flag};
pub use sink::{JsonlSink, ParquetSink, Sink, cleanup_tmp_files};
pub use types::{
    Cursor, Item, Page, ReplyMode, ReplyPage, SearchFilters, SearchOrder, SearchPage, SourceUnit,
    Thread, ThreadPage,
};

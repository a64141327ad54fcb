//! YouTube Data API v3 client
//!
//! Each method performs exactly one HTTP request and classifies the outcome;
//! retries and quota accounting belong to the engine's governor.

use commentline_core::{
    CallError, Cursor, HttpError, HttpResponse, RemoteClient, ReplyPage, SearchFilters,
    SearchPage, ThreadPage, get_text,
};
use serde::de::DeserializeOwned;

use crate::response::{CommentList, CommentThreadList, ErrorEnvelope, SearchList};

pub const DEFAULT_API_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Page size for comment listings (API maximum)
const COMMENTS_PAGE_SIZE: &str = "100";

/// Page size for search (API maximum)
const SEARCH_PAGE_SIZE: &str = "50";

/// Error reasons that mean "slow down / out of quota"
const RATE_LIMIT_REASONS: &[&str] = &[
    "quotaExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "dailyLimitExceeded",
];

/// Error reasons that mean the resource has nothing to harvest
const UNAVAILABLE_REASONS: &[&str] = &[
    "commentsDisabled",
    "videoNotFound",
    "commentThreadNotFound",
    "commentNotFound",
    "forbidden",
];

pub struct YouTubeClient {
    api_url: String,
    api_key: String,
}

impl std::fmt::Debug for YouTubeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the key
        f.debug_struct("YouTubeClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl YouTubeClient {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        mut params: Vec<(&str, String)>,
        cursor: Option<&Cursor>,
    ) -> Result<T, CallError> {
        if let Some(c) = cursor {
            params.push(("pageToken", c.as_str().to_string()));
        }
        params.push(("key", self.api_key.clone()));
        let url = format!("{}/{endpoint}", self.api_url);

        // timeouts and connection failures are always worth another try
        let response = get_text(&url, &params)
            .map_err(|e: HttpError| CallError::Transient(format!("{endpoint}: {e}")))?;
        if !response.is_success() {
            return Err(classify(endpoint, &response));
        }
        serde_json::from_str(&response.body)
            .map_err(|e| CallError::Malformed(format!("{endpoint}: {e}")))
    }
}

impl RemoteClient for YouTubeClient {
    fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        cursor: Option<&Cursor>,
    ) -> Result<SearchPage, CallError> {
        let mut params = vec![
            ("part", "id".to_string()),
            ("type", "video".to_string()),
            ("q", query.to_string()),
            ("maxResults", SEARCH_PAGE_SIZE.to_string()),
            ("order", filters.order.api_name().to_string()),
        ];
        if let Some(region) = &filters.region {
            params.push(("regionCode", region.clone()));
        }
        if let Some(after) = filters.published_after {
            params.push((
                "publishedAfter",
                after.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            ));
        }
        let list: SearchList = self.get("search", params, cursor)?;
        Ok(list.into_page())
    }

    fn list_comments(
        &self,
        unit_id: &str,
        cursor: Option<&Cursor>,
    ) -> Result<ThreadPage, CallError> {
        let params = vec![
            ("part", "snippet,replies".to_string()),
            ("videoId", unit_id.to_string()),
            ("maxResults", COMMENTS_PAGE_SIZE.to_string()),
            ("textFormat", "plainText".to_string()),
        ];
        let list: CommentThreadList = self.get("commentThreads", params, cursor)?;
        Ok(list.into_page(unit_id))
    }

    fn list_replies(
        &self,
        parent_id: &str,
        cursor: Option<&Cursor>,
    ) -> Result<ReplyPage, CallError> {
        let params = vec![
            ("part", "snippet".to_string()),
            ("parentId", parent_id.to_string()),
            ("maxResults", COMMENTS_PAGE_SIZE.to_string()),
            ("textFormat", "plainText".to_string()),
        ];
        let list: CommentList = self.get("comments", params, cursor)?;
        Ok(list.into_page(parent_id))
    }
}

/// Map a non-2xx response onto the engine's error classes
pub fn classify(endpoint: &str, response: &HttpResponse) -> CallError {
    let status = response.status;
    let parsed = serde_json::from_str::<ErrorEnvelope>(&response.body).ok();
    let reasons: Vec<&str> = parsed
        .as_ref()
        .map(|env| env.error.reasons().collect())
        .unwrap_or_default();
    let detail = match &parsed {
        Some(env) if !env.error.message.is_empty() => {
            format!("{endpoint}: HTTP {status} {} ({})", reasons.join(","), env.error.message)
        }
        _ => format!("{endpoint}: HTTP {status}"),
    };

    let has = |set: &[&str]| reasons.iter().any(|r| set.contains(r));
    match status {
        429 => CallError::RateLimited(detail),
        403 if has(RATE_LIMIT_REASONS) => CallError::RateLimited(detail),
        403 | 404 if has(UNAVAILABLE_REASONS) => CallError::Unavailable(detail),
        404 => CallError::Unavailable(detail),
        500..=599 => CallError::Transient(detail),
        408 => CallError::Transient(detail),
        _ => CallError::Malformed(detail),
    }
}

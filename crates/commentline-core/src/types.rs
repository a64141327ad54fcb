//! Domain types shared by the harvesting engine

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque continuation token for a paginated stream.
///
/// Never interpreted: some APIs hand out non-seekable tokens, so the only
/// valid operations are storing it and handing it back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One independently paginated resource (a video).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    pub unit_id: String,
    /// Search query that first surfaced this unit (None for explicit ids)
    pub origin_query: Option<String>,
    /// Publish-date filter in effect when the unit was admitted
    pub published_after: Option<DateTime<Utc>>,
}

impl SourceUnit {
    /// Unit supplied directly by id
    pub fn explicit(unit_id: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            origin_query: None,
            published_after: None,
        }
    }
}

/// A single harvested comment or reply.
///
/// On-disk field names follow the historical CSV column layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "comment_id")]
    pub item_id: String,
    #[serde(rename = "video_id")]
    pub unit_id: String,
    pub parent_id: Option<String>,
    pub is_reply: bool,
    pub author: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "likes", default)]
    pub like_count: u64,
    pub published_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(default)]
    pub reply_count: u64,
}

impl Item {
    /// Top-level item with empty attributes
    pub fn new(item_id: impl Into<String>, unit_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            unit_id: unit_id.into(),
            parent_id: None,
            is_reply: false,
            author: None,
            text: String::new(),
            like_count: 0,
            published_at: None,
            updated_at: None,
            reply_count: 0,
        }
    }

    /// Mark this item as a reply to `parent_id`
    pub fn reply_to(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self.is_reply = true;
        self.reply_count = 0;
        self
    }
}

/// A top-level item together with the replies the API embedded next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    pub top: Item,
    /// Replies returned inline (may be a prefix of the full reply set)
    pub replies: Vec<Item>,
    /// Total replies the API reports for this thread
    pub total_reply_count: u64,
}

/// One page of top-level threads for a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadPage {
    pub threads: Vec<Thread>,
    pub next_cursor: Option<Cursor>,
}

/// One page of replies below a single parent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyPage {
    pub items: Vec<Item>,
    pub next_cursor: Option<Cursor>,
}

/// One page of search hits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub unit_ids: Vec<String>,
    pub next_cursor: Option<Cursor>,
}

/// Flat page emitted by the paginator: parents always precede their replies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub items: Vec<Item>,
    pub next_cursor: Option<Cursor>,
}

/// Search result ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchOrder {
    #[default]
    Relevance,
    Date,
    ViewCount,
    Rating,
}

impl SearchOrder {
    /// Parse CLI/config string into enum
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "relevance" => Some(Self::Relevance),
            "date" => Some(Self::Date),
            "viewCount" | "view_count" | "views" => Some(Self::ViewCount),
            "rating" => Some(Self::Rating),
            _ => None,
        }
    }

    /// Value of the API `order` parameter
    pub fn api_name(self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::Date => "date",
            Self::ViewCount => "viewCount",
            Self::Rating => "rating",
        }
    }
}

impl fmt::Display for SearchOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

/// Optional filters applied to every discovery search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub region: Option<String>,
    pub order: SearchOrder,
    pub published_after: Option<DateTime<Utc>>,
}

/// How deep reply expansion goes for each thread
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    /// Top-level comments only
    None,
    /// Replies embedded in the thread page
    #[default]
    Inline,
    /// Page through the reply listing when inline replies are incomplete
    Full,
}

impl ReplyMode {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "inline" => Some(Self::Inline),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_serializes_with_column_names() {
        let item = Item::new("c1", "v1").reply_to("p1");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["comment_id"], "c1");
        assert_eq!(json["video_id"], "v1");
        assert_eq!(json["parent_id"], "p1");
        assert_eq!(json["is_reply"], true);
        assert_eq!(json["likes"], 0);
    }

    #[test]
    fn item_tolerates_missing_optional_columns() {
        let item: Item =
            serde_json::from_str(r#"{"comment_id":"a","video_id":"v","parent_id":null,"is_reply":false,"author":null,"published_at":null,"updated_at":null}"#)
                .unwrap();
        assert_eq!(item.text, "");
        assert_eq!(item.like_count, 0);
    }

    #[test]
    fn cursor_is_transparent() {
        let c = Cursor::new("QURTSl9p");
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"QURTSl9p\"");
        assert_eq!(c.to_string(), "QURTSl9p");
    }

    #[test]
    fn search_order_names() {
        assert_eq!(SearchOrder::from_name("viewCount"), Some(SearchOrder::ViewCount));
        assert_eq!(SearchOrder::from_name("date"), Some(SearchOrder::Date));
        assert_eq!(SearchOrder::from_name("Date"), None);
        assert_eq!(SearchOrder::ViewCount.api_name(), "viewCount");
        assert_eq!(SearchOrder::default(), SearchOrder::Relevance);
    }

    #[test]
    fn reply_mode_names() {
        assert_eq!(ReplyMode::from_name("FULL"), Some(ReplyMode::Full));
        assert_eq!(ReplyMode::from_name("none"), Some(ReplyMode::None));
        assert_eq!(ReplyMode::from_name("deep"), None);
    }
}

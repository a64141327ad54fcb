//! YouTube Data API v3 response shapes and their conversion to engine pages
//!
//! Only the fields the harvester stores are modelled; everything else in the
//! payload is ignored by serde.

use serde::Deserialize;

use commentline_core::{Cursor, Item, ReplyPage, SearchPage, Thread, ThreadPage};

/// `commentThreads.list`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThreadList {
    #[serde(default)]
    pub items: Vec<CommentThread>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentThread {
    pub snippet: ThreadSnippet,
    pub replies: Option<ThreadReplies>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSnippet {
    pub top_level_comment: Comment,
    #[serde(default)]
    pub total_reply_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct ThreadReplies {
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// `comments.list` (replies below one parent)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentList {
    #[serde(default)]
    pub items: Vec<Comment>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub id: String,
    pub snippet: CommentSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSnippet {
    pub author_display_name: Option<String>,
    #[serde(default)]
    pub text_display: String,
    #[serde(default)]
    pub like_count: u64,
    pub published_at: Option<String>,
    pub updated_at: Option<String>,
    pub parent_id: Option<String>,
}

/// `search.list`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchList {
    #[serde(default)]
    pub items: Vec<SearchResult>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResult {
    pub id: ResourceId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    pub kind: String,
    pub video_id: Option<String>,
}

/// Error envelope returned with non-2xx statuses
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ApiError,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub reason: String,
}

impl ApiError {
    /// Machine-readable reasons (`quotaExceeded`, `commentsDisabled`, ...)
    pub fn reasons(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(|e| e.reason.as_str())
    }
}

fn token(t: Option<String>) -> Option<Cursor> {
    t.filter(|s| !s.is_empty()).map(Cursor::new)
}

impl Comment {
    fn into_item(self, video_id: &str, parent_id: Option<&str>, reply_count: u64) -> Item {
        let sn = self.snippet;
        Item {
            item_id: self.id,
            unit_id: video_id.to_string(),
            parent_id: parent_id.map(str::to_string),
            is_reply: parent_id.is_some(),
            author: sn.author_display_name,
            text: sn.text_display,
            like_count: sn.like_count,
            published_at: sn.published_at,
            updated_at: sn.updated_at,
            reply_count,
        }
    }
}

impl CommentThreadList {
    pub fn into_page(self, video_id: &str) -> ThreadPage {
        let threads = self
            .items
            .into_iter()
            .map(|t| {
                let total = t.snippet.total_reply_count;
                let top = t.snippet.top_level_comment.into_item(video_id, None, total);
                let replies = t
                    .replies
                    .map(|r| r.comments)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| {
                        // inline replies always belong to this thread
                        let parent = c.snippet.parent_id.clone().unwrap_or_else(|| top.item_id.clone());
                        c.into_item(video_id, Some(&parent), 0)
                    })
                    .collect();
                Thread {
                    top,
                    replies,
                    total_reply_count: total,
                }
            })
            .collect();
        ThreadPage {
            threads,
            next_cursor: token(self.next_page_token),
        }
    }
}

impl CommentList {
    /// Replies of `parent_id`; the video id is filled in by the paginator
    pub fn into_page(self, parent_id: &str) -> ReplyPage {
        let items = self
            .items
            .into_iter()
            .map(|c| {
                let parent = c
                    .snippet
                    .parent_id
                    .clone()
                    .unwrap_or_else(|| parent_id.to_string());
                c.into_item("", Some(&parent), 0)
            })
            .collect();
        ReplyPage {
            items,
            next_cursor: token(self.next_page_token),
        }
    }
}

impl SearchList {
    pub fn into_page(self) -> SearchPage {
        let unit_ids = self
            .items
            .into_iter()
            .filter(|r| r.id.kind == "youtube#video")
            .filter_map(|r| r.id.video_id)
            .collect();
        SearchPage {
            unit_ids,
            next_cursor: token(self.next_page_token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREADS: &str = r#"{
        "kind": "youtube#commentThreadListResponse",
        "nextPageToken": "QURTSl9p",
        "items": [{
            "id": "t1",
            "snippet": {
                "videoId": "dQw4w9WgXcQ",
                "topLevelComment": {
                    "id": "c1",
                    "snippet": {
                        "authorDisplayName": "@ann",
                        "textDisplay": "great",
                        "likeCount": 4,
                        "publishedAt": "2024-01-01T00:00:00Z",
                        "updatedAt": "2024-01-01T00:00:00Z"
                    }
                },
                "totalReplyCount": 2
            },
            "replies": {"comments": [{
                "id": "c1.r1",
                "snippet": {"textDisplay": "agreed", "parentId": "c1", "likeCount": 1}
            }]}
        }]
    }"#;

    #[test]
    fn thread_page_maps_items_and_replies() {
        let list: CommentThreadList = serde_json::from_str(THREADS).unwrap();
        let page = list.into_page("dQw4w9WgXcQ");
        assert_eq!(page.next_cursor, Some(Cursor::new("QURTSl9p")));
        assert_eq!(page.threads.len(), 1);

        let t = &page.threads[0];
        assert_eq!(t.top.item_id, "c1");
        assert_eq!(t.top.author.as_deref(), Some("@ann"));
        assert_eq!(t.top.like_count, 4);
        assert_eq!(t.top.reply_count, 2);
        assert!(!t.top.is_reply);
        assert_eq!(t.total_reply_count, 2);

        assert_eq!(t.replies[0].item_id, "c1.r1");
        assert_eq!(t.replies[0].parent_id.as_deref(), Some("c1"));
        assert!(t.replies[0].is_reply);
        assert_eq!(t.replies[0].unit_id, "dQw4w9WgXcQ");
    }

    #[test]
    fn last_page_has_no_cursor() {
        let list: CommentThreadList = serde_json::from_str(r#"{"items": []}"#).unwrap();
        let page = list.into_page("v");
        assert!(page.threads.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn reply_page_defaults_parent() {
        let list: CommentList = serde_json::from_str(
            r#"{"items": [{"id": "r9", "snippet": {"textDisplay": "x"}}], "nextPageToken": ""}"#,
        )
        .unwrap();
        let page = list.into_page("c1");
        assert_eq!(page.items[0].parent_id.as_deref(), Some("c1"));
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn search_keeps_only_videos() {
        let list: SearchList = serde_json::from_str(
            r#"{"items": [
                {"id": {"kind": "youtube#video", "videoId": "aaaaaaaaaaa"}},
                {"id": {"kind": "youtube#channel", "channelId": "UC123"}},
                {"id": {"kind": "youtube#video", "videoId": "bbbbbbbbbbb"}}
            ], "nextPageToken": "CDIQAA"}"#,
        )
        .unwrap();
        let page = list.into_page();
        assert_eq!(page.unit_ids, vec!["aaaaaaaaaaa", "bbbbbbbbbbb"]);
        assert_eq!(page.next_cursor, Some(Cursor::new("CDIQAA")));
    }

    #[test]
    fn error_envelope_reasons() {
        let env: ErrorEnvelope = serde_json::from_str(
            r#"{"error": {"code": 403, "message": "disabled", "errors": [{"reason": "commentsDisabled", "domain": "youtube.commentThread"}]}}"#,
        )
        .unwrap();
        assert_eq!(env.error.code, 403);
        assert_eq!(env.error.reasons().collect::<Vec<_>>(), vec!["commentsDisabled"]);
    }
}

//! Cursor-driven pagination over one unit's comment stream
//!
//! [`Paginator`] walks top-level thread pages; each thread that needs deeper
//! reply expansion gets its own nested [`ReplyPager`]. Either way the caller
//! receives flat [`Page`]s in which a parent always precedes its replies.
//! Neither type persists anything: the starting cursor and the count already
//! collected come from the caller's checkpoint.

use crate::checkpoint::Finish;
use crate::client::RemoteClient;
use crate::error::HarvestError;
use crate::governor::{Governor, Operation};
use crate::types::{Cursor, Item, Page, ReplyMode, ThreadPage};

/// Pagination state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Start,
    Fetching,
    /// Remote returned no next cursor
    Exhausted,
    /// Per-unit item cap reached; more pages may exist
    Capped,
    Failed,
}

impl PageState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Exhausted | Self::Capped | Self::Failed)
    }
}

/// Drives one unit's thread pages to exhaustion, cap, or failure.
#[derive(Debug)]
pub struct Paginator {
    unit_id: String,
    cursor: Option<Cursor>,
    state: PageState,
    collected: u64,
    cap: Option<u64>,
    replies: ReplyMode,
}

impl Paginator {
    /// Start (or resume) at `start_cursor` with `collected` items already counted
    pub fn new(unit_id: impl Into<String>, start_cursor: Option<Cursor>, collected: u64) -> Self {
        Self {
            unit_id: unit_id.into(),
            cursor: start_cursor,
            state: PageState::Start,
            collected,
            cap: None,
            replies: ReplyMode::default(),
        }
    }

    pub fn with_cap(mut self, cap: Option<u64>) -> Self {
        self.cap = cap;
        self
    }

    pub fn with_replies(mut self, replies: ReplyMode) -> Self {
        self.replies = replies;
        self
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn collected(&self) -> u64 {
        self.collected
    }

    /// How the unit finished, once it did so successfully
    pub fn finish(&self) -> Option<Finish> {
        match self.state {
            PageState::Exhausted => Some(Finish::Exhausted),
            PageState::Capped => Some(Finish::Capped),
            _ => None,
        }
    }

    /// Fetch the next page, or `Ok(None)` once the stream has ended.
    ///
    /// Any error moves the paginator to [`PageState::Failed`] without
    /// advancing the cursor.
    pub fn next_page<C: RemoteClient + ?Sized>(
        &mut self,
        client: &C,
        governor: &mut Governor,
    ) -> Result<Option<Page>, HarvestError> {
        if self.state.is_terminal() {
            return Ok(None);
        }
        let remaining = match self.cap {
            Some(cap) if self.collected >= cap => {
                self.state = PageState::Capped;
                return Ok(None);
            }
            Some(cap) => Some(usize::try_from(cap - self.collected).unwrap_or(usize::MAX)),
            None => None,
        };

        self.state = PageState::Fetching;
        match self.fetch(client, governor, remaining) {
            Ok(page) => Ok(Some(page)),
            Err(e) => {
                self.state = PageState::Failed;
                Err(e)
            }
        }
    }

    fn fetch<C: RemoteClient + ?Sized>(
        &mut self,
        client: &C,
        governor: &mut Governor,
        remaining: Option<usize>,
    ) -> Result<Page, HarvestError> {
        let unit_id = self.unit_id.as_str();
        let requested = self.cursor.clone();
        let ThreadPage {
            threads,
            next_cursor,
        } = governor.call(Operation::ListComments, unit_id, || {
            client.list_comments(unit_id, requested.as_ref())
        })?;

        if let (Some(next), Some(prev)) = (&next_cursor, &requested) {
            if next == prev {
                return Err(HarvestError::MalformedPage(format!(
                    "{unit_id}: next cursor repeats requested cursor {prev}"
                )));
            }
        }

        let mut items: Vec<Item> = Vec::new();
        for thread in threads {
            if remaining.is_some_and(|r| items.len() >= r) {
                break;
            }
            let mut top = thread.top;
            if top.item_id.is_empty() {
                return Err(HarvestError::MalformedPage(format!(
                    "{unit_id}: thread without comment id"
                )));
            }
            if top.parent_id.is_some() {
                return Err(HarvestError::MalformedPage(format!(
                    "{unit_id}: top-level comment {} has a parent",
                    top.item_id
                )));
            }
            top.unit_id = unit_id.to_string();
            let top_id = top.item_id.clone();
            let inline_count = thread.replies.len() as u64;
            items.push(top);

            let replies = match self.replies {
                ReplyMode::None => Vec::new(),
                ReplyMode::Full if thread.total_reply_count > inline_count => {
                    let room = remaining.map(|r| r.saturating_sub(items.len()));
                    log::debug!(
                        "{unit_id}: expanding {} replies of {top_id}",
                        thread.total_reply_count
                    );
                    match ReplyPager::new(&top_id).collect(client, governor, room) {
                        Ok(replies) => replies,
                        // a vanished thread must not end the whole unit
                        Err(HarvestError::Unavailable(msg)) => {
                            log::warn!(
                                "{unit_id}: replies of {top_id} unavailable ({msg}), keeping {inline_count} inline"
                            );
                            thread.replies
                        }
                        Err(e) => return Err(e),
                    }
                }
                ReplyMode::Inline | ReplyMode::Full => thread.replies,
            };

            for mut reply in replies {
                if reply.item_id.is_empty() {
                    return Err(HarvestError::MalformedPage(format!(
                        "{unit_id}: reply without comment id under {top_id}"
                    )));
                }
                if reply.parent_id.as_deref() != Some(top_id.as_str()) {
                    return Err(HarvestError::MalformedPage(format!(
                        "{unit_id}: reply {} does not belong to thread {top_id}",
                        reply.item_id
                    )));
                }
                reply.unit_id = unit_id.to_string();
                reply.is_reply = true;
                items.push(reply);
            }
        }

        let capped = match remaining {
            Some(r) if items.len() >= r => {
                items.truncate(r);
                true
            }
            _ => false,
        };

        self.collected += items.len() as u64;
        self.state = if capped {
            PageState::Capped
        } else if next_cursor.is_none() {
            PageState::Exhausted
        } else {
            PageState::Fetching
        };
        self.cursor = next_cursor.clone();

        Ok(Page { items, next_cursor })
    }
}

/// Nested pagination over the replies of one parent item
#[derive(Debug)]
pub struct ReplyPager<'a> {
    parent_id: &'a str,
    cursor: Option<Cursor>,
    state: PageState,
}

impl<'a> ReplyPager<'a> {
    pub fn new(parent_id: &'a str) -> Self {
        Self {
            parent_id,
            cursor: None,
            state: PageState::Start,
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    /// Next batch of replies, or `Ok(None)` when the reply stream has ended
    pub fn next_batch<C: RemoteClient + ?Sized>(
        &mut self,
        client: &C,
        governor: &mut Governor,
    ) -> Result<Option<Vec<Item>>, HarvestError> {
        if self.state.is_terminal() {
            return Ok(None);
        }
        self.state = PageState::Fetching;

        let parent_id = self.parent_id;
        let requested = self.cursor.clone();
        let page = match governor.call(Operation::ListReplies, parent_id, || {
            client.list_replies(parent_id, requested.as_ref())
        }) {
            Ok(page) => page,
            Err(e) => {
                self.state = PageState::Failed;
                return Err(e);
            }
        };

        if page.next_cursor.is_some() && page.next_cursor == requested {
            self.state = PageState::Failed;
            return Err(HarvestError::MalformedPage(format!(
                "replies of {parent_id}: next cursor repeats requested cursor"
            )));
        }

        self.state = if page.next_cursor.is_none() {
            PageState::Exhausted
        } else {
            PageState::Fetching
        };
        self.cursor = page.next_cursor;
        Ok(Some(page.items))
    }

    /// Drain the reply stream, stopping early once `limit` replies are held
    pub fn collect<C: RemoteClient + ?Sized>(
        mut self,
        client: &C,
        governor: &mut Governor,
        limit: Option<usize>,
    ) -> Result<Vec<Item>, HarvestError> {
        let mut out = Vec::new();
        while let Some(batch) = self.next_batch(client, governor)? {
            out.extend(batch);
            if limit.is_some_and(|l| out.len() >= l) {
                break;
            }
        }
        Ok(out)
    }
}

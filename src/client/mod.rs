//! Client-side view of one page of chores.
//!
//! [`ChoreCache`] holds what a UI would render: the current page, the active
//! filters and whether more pages exist. Mutations go through a [`ChoreApi`]
//! and are then reconciled locally; live events from other sessions are
//! folded into the same state with [`ChoreCache::apply_event`].

mod http;

use thiserror::Error;

use crate::db::{Chore, ChoreFilters, ChorePage, ChorePatch, ListQuery, NewChore, DEFAULT_PAGE_SIZE};
use crate::notify::ChoreEvent;

pub use http::HttpChoreApi;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with an error status and `{"error": message}`.
    #[error("{status}: {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response body: {0}")]
    Decode(#[from] std::io::Error),

    #[error("invalid event: {0}")]
    Event(#[from] serde_json::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The REST operations the cache needs.
pub trait ChoreApi {
    fn list(&self, query: &ListQuery) -> Result<ChorePage, ClientError>;
    fn create(&self, chore: &NewChore) -> Result<Chore, ClientError>;
    fn update(&self, id: i64, patch: &ChorePatch) -> Result<Chore, ClientError>;
    fn delete(&self, id: i64) -> Result<(), ClientError>;
}

pub struct ChoreCache<A> {
    api: A,
    chores: Vec<Chore>,
    page: u32,
    limit: u32,
    total: u64,
    has_more: bool,
    filters: ChoreFilters,
}

impl<A: ChoreApi> ChoreCache<A> {
    pub fn new(api: A) -> Self {
        Self::with_limit(api, DEFAULT_PAGE_SIZE)
    }

    pub fn with_limit(api: A, limit: u32) -> Self {
        Self {
            api,
            chores: Vec::new(),
            page: 1,
            limit: limit.max(1),
            total: 0,
            has_more: false,
            filters: ChoreFilters::default(),
        }
    }

    pub fn chores(&self) -> &[Chore] {
        &self.chores
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn filters(&self) -> &ChoreFilters {
        &self.filters
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Replace the held page with the server's. `None` keeps the current filters.
    pub fn fetch_chores(
        &mut self,
        page: u32,
        filters: Option<ChoreFilters>,
    ) -> Result<&[Chore], ClientError> {
        let filters = filters.unwrap_or_else(|| self.filters.clone());
        let query = ListQuery {
            page: page.max(1),
            limit: self.limit,
            filters,
        };
        let result = self.api.list(&query)?;

        self.has_more = result.has_more();
        self.chores = result.items;
        self.page = result.page;
        self.limit = result.limit;
        self.total = result.total;
        self.filters = query.filters;
        Ok(&self.chores)
    }

    pub fn create_chore(&mut self, chore: &NewChore) -> Result<Chore, ClientError> {
        let created = self.api.create(chore)?;
        self.insert_local(created.clone());
        Ok(created)
    }

    pub fn update_chore(&mut self, id: i64, patch: &ChorePatch) -> Result<Chore, ClientError> {
        let updated = self.api.update(id, patch)?;
        self.replace_local(updated.clone());
        Ok(updated)
    }

    pub fn delete_chore(&mut self, id: i64) -> Result<(), ClientError> {
        self.api.delete(id)?;
        self.remove_local(id);
        Ok(())
    }

    /// Fold a live event into the held page. Applying the echo of the
    /// caller's own mutation a second time changes nothing.
    pub fn apply_event(&mut self, event: &ChoreEvent) {
        match event {
            ChoreEvent::ChoreCreated { chore } => self.insert_local(chore.clone()),
            ChoreEvent::ChoreUpdated { chore } => self.replace_local(chore.clone()),
            ChoreEvent::ChoreDeleted { chore_id } => self.remove_local(*chore_id),
        }
    }

    /// Parse a WebSocket text frame and apply it.
    pub fn apply_message(&mut self, text: &str) -> Result<(), ClientError> {
        let event: ChoreEvent = serde_json::from_str(text)?;
        self.apply_event(&event);
        Ok(())
    }

    fn position(&self, id: i64) -> Option<usize> {
        self.chores.iter().position(|c| c.id == id)
    }

    fn insert_local(&mut self, chore: Chore) {
        if let Some(idx) = self.position(chore.id) {
            self.chores[idx] = chore;
            return;
        }
        if !self.filters.matches(&chore) {
            return;
        }
        // Newest first: only page 1 gains the row, later pages just shift.
        if self.page <= 1 {
            self.chores.insert(0, chore);
            self.chores.truncate(self.limit as usize);
        }
        self.total += 1;
        self.refresh_has_more();
    }

    fn replace_local(&mut self, chore: Chore) {
        let Some(idx) = self.position(chore.id) else {
            return;
        };
        if self.filters.matches(&chore) {
            self.chores[idx] = chore;
        } else {
            self.chores.remove(idx);
            self.total = self.total.saturating_sub(1);
            self.refresh_has_more();
        }
    }

    fn remove_local(&mut self, id: i64) {
        if let Some(idx) = self.position(id) {
            self.chores.remove(idx);
            self.total = self.total.saturating_sub(1);
            self.refresh_has_more();
        }
    }

    fn refresh_has_more(&mut self) {
        self.has_more = (self.page as u64) * (self.limit as u64) < self.total;
    }
}

use serde::Serialize;

use crate::error::FetchError;
use crate::fetch::{EntityQuery, EntitySource};
use crate::filtering::FilterState;
use crate::models::Entity;

/// Where the current page window comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PagingStrategy {
    /// The backend paginates and reports `total`.
    Backend,
    /// The full filtered set is held locally and sliced.
    Local,
}

impl PagingStrategy {
    /// Local whenever an active facet is in ALL mode, since the backend
    /// cannot be trusted to apply it.
    pub fn for_filters(filters: &FilterState) -> Self {
        if filters.has_all_mode() {
            PagingStrategy::Local
        } else {
            PagingStrategy::Backend
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub items: Vec<Entity>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub strategy: PagingStrategy,
}

impl Page {
    pub fn page_count(&self) -> usize {
        self.total.div_ceil(self.page_size.max(1))
    }

    pub fn has_next(&self) -> bool {
        self.page < self.page_count()
    }
}

/// Page cursor over either backend pagination or a local filtered set.
#[derive(Debug, Clone)]
pub struct LocalPager {
    page: usize,
    page_size: usize,
    strategy: PagingStrategy,
}

impl LocalPager {
    pub fn new(page_size: usize) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            strategy: PagingStrategy::Backend,
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn strategy(&self) -> PagingStrategy {
        self.strategy
    }

    /// Pages are 1-based; 0 is treated as 1.
    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
        self.page = 1;
    }

    /// Pick the strategy for `filters`. Switching strategies resets the
    /// page to 1; returns whether a switch happened.
    pub fn sync(&mut self, filters: &FilterState) -> bool {
        let next = PagingStrategy::for_filters(filters);
        if next == self.strategy {
            return false;
        }

        tracing::debug!(from = ?self.strategy, to = ?next, "paging strategy switched");
        self.strategy = next;
        self.page = 1;
        true
    }

    /// Slice `[(page-1)*size, page*size)` out of a materialized set.
    pub fn slice(&self, entities: &[Entity]) -> Page {
        let start = (self.page - 1).saturating_mul(self.page_size);
        let items = entities
            .iter()
            .skip(start)
            .take(self.page_size)
            .cloned()
            .collect();

        Page {
            items,
            total: entities.len(),
            page: self.page,
            page_size: self.page_size,
            strategy: PagingStrategy::Local,
        }
    }

    /// Backend query for the current window, with the filter's own modes.
    pub fn backend_query(&self, filters: &FilterState) -> EntityQuery {
        EntityQuery::from_filters(filters, self.page, self.page_size)
    }

    /// Produce the current page for `filters`.
    ///
    /// In local mode `aggregate` must be the fully filtered set from the
    /// aggregate fetcher; in backend mode it is ignored.
    pub async fn load_page(
        &mut self,
        filters: &FilterState,
        source: &dyn EntitySource,
        aggregate: &[Entity],
    ) -> Result<Page, FetchError> {
        self.sync(filters);

        match self.strategy {
            PagingStrategy::Local => Ok(self.slice(aggregate)),
            PagingStrategy::Backend => {
                let page = source.fetch_page(&self.backend_query(filters)).await?;
                Ok(Page {
                    items: page.data,
                    total: page.total,
                    page: self.page,
                    page_size: self.page_size,
                    strategy: PagingStrategy::Backend,
                })
            }
        }
    }
}

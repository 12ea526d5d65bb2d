//! Aggregate fetching against the entity backend.
//!
//! The backend honors `{facet}_MATCH=all` for some facets and silently falls
//! back to ANY for others. [`AggregateFetcher`] therefore asks for the ANY
//! union of every selection (a superset of the true result), pages through
//! it sequentially, deduplicates by ID and re-applies ALL-mode facets locally.
//!
//! Each run is tagged with a generation from [`FetchGeneration`]. Starting a
//! newer run, or calling [`AggregateFetcher::invalidate`], makes older runs
//! stale; a stale run stops at its next resume point and is never committed.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::BackendConfig;
use crate::counts::CountIndex;
use crate::error::FetchError;
use crate::filtering::FilterState;
use crate::models::{Entity, EntityPage, FacetTotals, MatchMode};

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Tokens and requested match mode for one facet of a backend query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetQuery {
    pub tokens: Vec<String>,
    pub match_mode: MatchMode,
}

/// Parameters of `GET /entities`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityQuery {
    pub page: usize,
    pub page_size: usize,
    pub facets: BTreeMap<String, FacetQuery>,
}

impl EntityQuery {
    /// Query carrying each active facet with its own match mode.
    pub fn from_filters(filters: &FilterState, page: usize, page_size: usize) -> Self {
        let facets = filters
            .active_facets()
            .map(|(facet, selection)| {
                (
                    facet.clone(),
                    FacetQuery {
                        tokens: selection.selected.iter().cloned().collect(),
                        match_mode: selection.match_mode,
                    },
                )
            })
            .collect();

        Self {
            page: page.max(1),
            page_size,
            facets,
        }
    }

    /// Query asking for the ANY union of every active facet.
    ///
    /// Whatever the backend does with match modes, this returns a superset
    /// of the ALL-mode result.
    pub fn union_of(filters: &FilterState, page_size: usize) -> Self {
        let mut query = Self::from_filters(filters, 1, page_size);
        for facet in query.facets.values_mut() {
            facet.match_mode = MatchMode::Any;
        }
        query
    }

    pub fn with_page(&self, page: usize) -> Self {
        Self {
            page: page.max(1),
            ..self.clone()
        }
    }

    /// `page`, `pageSize`, then `{facet}=a,b` and `{facet}_MATCH=any|all`.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), self.page.to_string()),
            ("pageSize".to_string(), self.page_size.to_string()),
        ];
        for (facet, query) in &self.facets {
            pairs.push((facet.clone(), query.tokens.join(",")));
            pairs.push((format!("{}_MATCH", facet), query.match_mode.to_string()));
        }
        pairs
    }
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// The entity backend.
#[async_trait]
pub trait EntitySource: Send + Sync {
    /// `GET /entities` for one page.
    async fn fetch_page(&self, query: &EntityQuery) -> Result<EntityPage, FetchError>;

    /// `GET /facet-counts`: precomputed leaf incidence totals.
    async fn fetch_facet_counts(&self) -> Result<FacetTotals, FetchError>;
}

/// HTTP backend speaking the `/entities` and `/facet-counts` API.
#[derive(Debug, Clone)]
pub struct HttpEntitySource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEntitySource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);

        let resp = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(|source| FetchError::Transport {
            url: url.clone(),
            source,
        })?;

        serde_json::from_str(&body).map_err(|source| FetchError::Malformed { url, source })
    }
}

#[async_trait]
impl EntitySource for HttpEntitySource {
    async fn fetch_page(&self, query: &EntityQuery) -> Result<EntityPage, FetchError> {
        tracing::debug!(
            page = query.page,
            page_size = query.page_size,
            facets = query.facets.len(),
            "requesting entity page"
        );
        self.get_json("/entities", &query.query_pairs()).await
    }

    async fn fetch_facet_counts(&self) -> Result<FacetTotals, FetchError> {
        self.get_json("/facet-counts", &[]).await
    }
}

/// Backend over an in-memory dataset.
///
/// Reproduces the real backend's contract, including its partial support
/// for ALL: facets not listed via [`InMemorySource::honor_all`] are matched
/// with ANY even when ALL is requested.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    entities: Vec<Entity>,
    honors_all: HashSet<String>,
    count_facet: Option<String>,
}

impl InMemorySource {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self {
            entities,
            ..Self::default()
        }
    }

    /// Honor `_MATCH=all` for `facet`.
    pub fn honor_all(mut self, facet: &str) -> Self {
        self.honors_all.insert(facet.to_string());
        self
    }

    /// Facet whose leaf totals `/facet-counts` reports.
    pub fn with_count_facet(mut self, facet: &str) -> Self {
        self.count_facet = Some(facet.to_string());
        self
    }

    fn effective_filters(&self, query: &EntityQuery) -> FilterState {
        let mut filters = FilterState::new();
        for (facet, q) in &query.facets {
            let mode = if self.honors_all.contains(facet) {
                q.match_mode
            } else {
                MatchMode::Any
            };
            filters.set_match_mode(facet, mode);
            for token in &q.tokens {
                filters.toggle(facet, token);
            }
        }
        filters
    }
}

#[async_trait]
impl EntitySource for InMemorySource {
    async fn fetch_page(&self, query: &EntityQuery) -> Result<EntityPage, FetchError> {
        let filters = self.effective_filters(query);
        let matching: Vec<&Entity> = self.entities.iter().filter(|e| filters.matches(e)).collect();

        let start = (query.page.max(1) - 1).saturating_mul(query.page_size);
        let data = matching
            .iter()
            .skip(start)
            .take(query.page_size)
            .map(|e| (*e).clone())
            .collect();

        Ok(EntityPage::new(data, matching.len()))
    }

    async fn fetch_facet_counts(&self) -> Result<FacetTotals, FetchError> {
        let index = match &self.count_facet {
            Some(facet) => CountIndex::build(&self.entities, facet),
            None => CountIndex::default(),
        };

        Ok(FacetTotals {
            totals_by_token: index.iter().map(|(k, e)| (k.clone(), e.count)).collect(),
            total_entities: self.entities.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// Generations
// ---------------------------------------------------------------------------

/// Monotonically increasing run counter shared by a fetcher and anything
/// that needs to supersede its runs.
#[derive(Debug, Clone, Default)]
pub struct FetchGeneration(Arc<AtomicU64>);

impl FetchGeneration {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Start a new generation and return it.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

// ---------------------------------------------------------------------------
// Aggregate fetcher
// ---------------------------------------------------------------------------

/// The complete, validated entity set for one filter snapshot.
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub generation: u64,
    pub entities: Vec<Entity>,
    pub pages_fetched: usize,
    /// Rows received before deduplication and local filtering.
    pub rows_received: usize,
    /// The page ceiling was hit while pages were still full.
    pub truncated: bool,
}

#[derive(Debug)]
pub enum AggregateOutcome {
    Complete(Aggregate),
    /// A newer run started before this one resolved.
    Superseded { generation: u64 },
    /// A page request failed; nothing from this run is usable.
    Unavailable { generation: u64, error: FetchError },
}

impl AggregateOutcome {
    pub fn generation(&self) -> u64 {
        match self {
            AggregateOutcome::Complete(agg) => agg.generation,
            AggregateOutcome::Superseded { generation }
            | AggregateOutcome::Unavailable { generation, .. } => *generation,
        }
    }
}

pub struct AggregateFetcher {
    source: Arc<dyn EntitySource>,
    page_size: usize,
    max_pages: usize,
    generation: FetchGeneration,
}

impl AggregateFetcher {
    pub fn new(source: Arc<dyn EntitySource>, config: &BackendConfig) -> Self {
        Self {
            source,
            page_size: config.page_size.max(1),
            max_pages: config.max_pages.max(1),
            generation: FetchGeneration::default(),
        }
    }

    pub fn source(&self) -> &Arc<dyn EntitySource> {
        &self.source
    }

    /// Handle for superseding runs from elsewhere.
    pub fn generation(&self) -> FetchGeneration {
        self.generation.clone()
    }

    /// Make every in-flight run stale, e.g. because the filters changed.
    pub fn invalidate(&self) {
        self.generation.advance();
    }

    /// Fetch every entity matching `filters`.
    ///
    /// Pages are requested one after another in page order until a short
    /// page arrives or the page ceiling is reached.
    pub async fn fetch(&self, filters: &FilterState) -> AggregateOutcome {
        let generation = self.generation.advance();
        let snapshot = filters.clone();
        let base = EntityQuery::union_of(&snapshot, self.page_size);

        let mut rows: Vec<Entity> = Vec::new();
        let mut pages_fetched = 0;
        let mut truncated = false;

        loop {
            if pages_fetched == self.max_pages {
                tracing::warn!(
                    generation,
                    max_pages = self.max_pages,
                    rows = rows.len(),
                    "page ceiling reached, aggregate truncated"
                );
                truncated = true;
                break;
            }

            let query = base.with_page(pages_fetched + 1);
            let result = self.source.fetch_page(&query).await;

            if !self.generation.is_current(generation) {
                tracing::debug!(generation, page = query.page, "aggregate run superseded");
                return AggregateOutcome::Superseded { generation };
            }

            let page = match result {
                Ok(page) => page,
                Err(error) => {
                    tracing::warn!(generation, page = query.page, %error, "aggregate unavailable");
                    return AggregateOutcome::Unavailable { generation, error };
                }
            };

            pages_fetched += 1;
            let sent = page.rows_sent();
            rows.extend(page.data);

            if sent < self.page_size {
                break;
            }
        }

        let rows_received = rows.len();
        let mut seen = HashSet::new();
        let entities: Vec<Entity> = rows
            .into_iter()
            .filter(|e| seen.insert(e.id.clone()))
            .filter(|e| snapshot.matches_all_mode_facets(e))
            .collect();

        if !self.generation.is_current(generation) {
            return AggregateOutcome::Superseded { generation };
        }

        tracing::info!(
            generation,
            pages = pages_fetched,
            rows = rows_received,
            entities = entities.len(),
            truncated,
            "aggregate complete"
        );

        AggregateOutcome::Complete(Aggregate {
            generation,
            entities,
            pages_fetched,
            rows_received,
            truncated,
        })
    }
}

// ---------------------------------------------------------------------------
// Committed view
// ---------------------------------------------------------------------------

/// Last committed aggregate plus loading and error flags.
#[derive(Debug, Default)]
pub struct AggregateView {
    pub entities: Vec<Entity>,
    pub loading: bool,
    pub truncated: bool,
    pub error: Option<FetchError>,
    committed: u64,
}

impl AggregateView {
    pub fn begin(&mut self) {
        self.loading = true;
    }

    /// Commit an outcome unless it is superseded or older than what is
    /// already committed. Returns whether the view changed.
    pub fn commit(&mut self, outcome: AggregateOutcome) -> bool {
        if outcome.generation() < self.committed {
            return false;
        }

        match outcome {
            AggregateOutcome::Superseded { .. } => false,
            AggregateOutcome::Complete(agg) => {
                self.committed = agg.generation;
                self.entities = agg.entities;
                self.truncated = agg.truncated;
                self.error = None;
                self.loading = false;
                true
            }
            AggregateOutcome::Unavailable { generation, error } => {
                self.committed = generation;
                self.entities.clear();
                self.truncated = false;
                self.error = Some(error);
                self.loading = false;
                true
            }
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Serves canned pages and records every query it sees.
    struct PagedSource {
        pages: Vec<Vec<Entity>>,
        fail_on: Option<usize>,
        supersede_on: Option<(usize, FetchGeneration)>,
        /// (page, rows) the wire sent without a usable id
        skipped_on: Option<(usize, usize)>,
        seen: Mutex<Vec<EntityQuery>>,
    }

    impl PagedSource {
        fn new(pages: Vec<Vec<Entity>>) -> Self {
            Self {
                pages,
                fail_on: None,
                supersede_on: None,
                skipped_on: None,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EntitySource for PagedSource {
        async fn fetch_page(&self, query: &EntityQuery) -> Result<EntityPage, FetchError> {
            self.seen.lock().unwrap().push(query.clone());
            if self.fail_on == Some(query.page) {
                return Err(FetchError::Unavailable("connection reset".to_string()));
            }
            if let Some((page, generation)) = &self.supersede_on {
                if *page == query.page {
                    generation.advance();
                }
            }
            let data = self.pages.get(query.page - 1).cloned().unwrap_or_default();
            let total = data.len();
            let mut page = EntityPage::new(data, total);
            if let Some((skipped_page, rows)) = self.skipped_on {
                if skipped_page == query.page {
                    page.skipped = rows;
                }
            }
            Ok(page)
        }

        async fn fetch_facet_counts(&self) -> Result<FacetTotals, FetchError> {
            Ok(FacetTotals::default())
        }
    }

    fn page_of(prefix: &str, n: usize, services: &str) -> Vec<Entity> {
        (0..n)
            .map(|i| Entity::new(format!("{}{}", prefix, i)).with_field("services", services))
            .collect()
    }

    fn config(page_size: usize, max_pages: usize) -> BackendConfig {
        BackendConfig {
            base_url: String::new(),
            page_size,
            max_pages,
        }
    }

    #[tokio::test]
    async fn test_pages_until_short_page() {
        let source = Arc::new(PagedSource::new(vec![
            page_of("a", 500, "VFX"),
            page_of("b", 500, "VFX"),
            page_of("c", 10, "VFX"),
        ]));
        let fetcher = AggregateFetcher::new(source.clone(), &config(500, 200));

        let AggregateOutcome::Complete(agg) = fetcher.fetch(&FilterState::new()).await else {
            panic!("expected a complete aggregate");
        };

        assert_eq!(agg.entities.len(), 1010);
        assert_eq!(agg.pages_fetched, 3);
        assert!(!agg.truncated);

        let pages: Vec<_> = source.seen.lock().unwrap().iter().map(|q| q.page).collect();
        assert_eq!(pages, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_exactly_full_last_page_needs_one_empty_request() {
        let source = Arc::new(PagedSource::new(vec![
            page_of("a", 500, "VFX"),
            page_of("b", 500, "VFX"),
        ]));
        let fetcher = AggregateFetcher::new(source.clone(), &config(500, 200));

        let AggregateOutcome::Complete(agg) = fetcher.fetch(&FilterState::new()).await else {
            panic!("expected a complete aggregate");
        };

        assert_eq!(agg.entities.len(), 1000);
        assert_eq!(agg.pages_fetched, 3);
        assert!(!agg.truncated);

        let pages: Vec<_> = source.seen.lock().unwrap().iter().map(|q| q.page).collect();
        assert_eq!(pages, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_skipped_rows_still_count_toward_a_full_page() {
        let mut source = PagedSource::new(vec![page_of("a", 498, "VFX"), page_of("b", 3, "VFX")]);
        source.skipped_on = Some((1, 2));
        let source = Arc::new(source);
        let fetcher = AggregateFetcher::new(source.clone(), &config(500, 200));

        let AggregateOutcome::Complete(agg) = fetcher.fetch(&FilterState::new()).await else {
            panic!("expected a complete aggregate");
        };

        assert_eq!(agg.entities.len(), 501);
        assert_eq!(agg.pages_fetched, 2);
    }

    #[tokio::test]
    async fn test_duplicate_ids_keep_first_occurrence() {
        let mut second = page_of("x", 1, "Games");
        second[0].id = "a0".into();
        let source = Arc::new(PagedSource::new(vec![page_of("a", 2, "VFX"), second]));
        let fetcher = AggregateFetcher::new(source, &config(2, 10));

        let AggregateOutcome::Complete(agg) = fetcher.fetch(&FilterState::new()).await else {
            panic!("expected a complete aggregate");
        };

        assert_eq!(agg.rows_received, 3);
        assert_eq!(agg.entities.len(), 2);
        assert_eq!(agg.entities[0].tokens("services")[0].label, "VFX");
    }

    #[tokio::test]
    async fn test_all_mode_is_reapplied_locally() {
        let mut page = page_of("vfx", 3, "VFX");
        page.extend(page_of("both", 2, "VFX, Animation"));
        let source = Arc::new(PagedSource::new(vec![page]));
        let fetcher = AggregateFetcher::new(source.clone(), &config(500, 10));

        let mut filters = FilterState::new();
        filters.set_match_mode("services", MatchMode::All);
        filters.toggle("services", "VFX");
        filters.toggle("services", "Animation");

        let AggregateOutcome::Complete(agg) = fetcher.fetch(&filters).await else {
            panic!("expected a complete aggregate");
        };
        assert_eq!(agg.entities.len(), 2);

        let seen = source.seen.lock().unwrap();
        assert_eq!(seen[0].facets["services"].match_mode, MatchMode::Any);
    }

    #[tokio::test]
    async fn test_failure_reports_unavailable() {
        let mut source = PagedSource::new(vec![page_of("a", 2, "VFX"), page_of("b", 2, "VFX")]);
        source.fail_on = Some(2);
        let fetcher = AggregateFetcher::new(Arc::new(source), &config(2, 10));

        let outcome = fetcher.fetch(&FilterState::new()).await;
        assert!(matches!(outcome, AggregateOutcome::Unavailable { .. }));

        let mut view = AggregateView::default();
        view.entities = page_of("old", 1, "VFX");
        view.begin();
        assert!(view.commit(outcome));
        assert!(view.is_unavailable());
        assert!(view.entities.is_empty());
        assert!(!view.loading);
    }

    #[tokio::test]
    async fn test_page_ceiling_truncates() {
        let pages = (0..5).map(|i| page_of(&format!("p{}-", i), 2, "VFX")).collect();
        let source = Arc::new(PagedSource::new(pages));
        let fetcher = AggregateFetcher::new(source, &config(2, 3));

        let AggregateOutcome::Complete(agg) = fetcher.fetch(&FilterState::new()).await else {
            panic!("expected a complete aggregate");
        };
        assert!(agg.truncated);
        assert_eq!(agg.pages_fetched, 3);
        assert_eq!(agg.entities.len(), 6);
    }

    #[tokio::test]
    async fn test_superseded_run_is_not_committed() {
        // The source bumps the shared counter while page 2 is in flight,
        // as a filter change would.
        let mut source = PagedSource::new(vec![page_of("a", 2, "VFX"), page_of("b", 2, "VFX")]);
        let generation = FetchGeneration::default();
        source.supersede_on = Some((2, generation.clone()));
        let fetcher = AggregateFetcher {
            source: Arc::new(source),
            page_size: 2,
            max_pages: 10,
            generation,
        };

        let outcome = fetcher.fetch(&FilterState::new()).await;
        assert!(matches!(outcome, AggregateOutcome::Superseded { generation: 1 }));

        let mut view = AggregateView::default();
        view.begin();
        assert!(!view.commit(outcome));
        assert!(view.loading);
    }

    #[test]
    fn test_stale_outcome_does_not_overwrite_newer_commit() {
        let newer = Aggregate {
            generation: 5,
            entities: page_of("new", 1, "VFX"),
            pages_fetched: 1,
            rows_received: 1,
            truncated: false,
        };
        let older = Aggregate {
            generation: 4,
            entities: page_of("old", 3, "VFX"),
            ..newer.clone()
        };

        let mut view = AggregateView::default();
        assert!(view.commit(AggregateOutcome::Complete(newer)));
        assert!(!view.commit(AggregateOutcome::Complete(older)));
        assert_eq!(view.entities.len(), 1);
    }

    #[test]
    fn test_query_pairs() {
        let mut filters = FilterState::new();
        filters.set_match_mode("services", MatchMode::All);
        filters.toggle("services", "VFX");
        filters.toggle("services", "Animation");

        let query = EntityQuery::from_filters(&filters, 2, 25);
        assert_eq!(
            query.query_pairs(),
            vec![
                ("page".to_string(), "2".to_string()),
                ("pageSize".to_string(), "25".to_string()),
                ("services".to_string(), "animation,vfx".to_string()),
                ("services_MATCH".to_string(), "all".to_string()),
            ]
        );

        let union = EntityQuery::union_of(&filters, 500);
        assert_eq!(union.facets["services"].match_mode, MatchMode::Any);
        assert_eq!(union.page, 1);
    }

    #[tokio::test]
    async fn test_in_memory_source_downgrades_all_mode() {
        let entities = vec![
            Entity::new("1").with_field("services", "VFX"),
            Entity::new("2").with_field("services", "VFX, Animation"),
        ];
        let mut filters = FilterState::new();
        filters.set_match_mode("services", MatchMode::All);
        filters.toggle("services", "VFX");
        filters.toggle("services", "Animation");
        let query = EntityQuery::from_filters(&filters, 1, 10);

        let lenient = InMemorySource::new(entities.clone());
        assert_eq!(lenient.fetch_page(&query).await.unwrap().total, 2);

        let strict = InMemorySource::new(entities).honor_all("services");
        assert_eq!(strict.fetch_page(&query).await.unwrap().total, 1);
    }
}

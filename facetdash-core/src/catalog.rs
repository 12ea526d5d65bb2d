//! Per-facet derived state for a session.
//!
//! A catalog starts from the backend's precomputed totals, where rollups are
//! leaf sums, and is upgraded to entity-ID postings once the full entity set
//! has been fetched. Only then are rollups exact union counts; postings from
//! a load cut short by the page ceiling stay flagged as approximate.

use serde::Serialize;
use std::sync::Arc;

use crate::config::BackendConfig;
use crate::counts::{CountIndex, Postings};
use crate::error::FetchError;
use crate::fetch::{Aggregate, AggregateFetcher, AggregateOutcome, EntitySource};
use crate::filtering::FilterState;
use crate::hierarchy::{FacetTaxonomy, Incidence, Level, NodeId, RollupCount};
use crate::models::{Entity, FacetTotals};

#[derive(Debug, Clone)]
enum IncidenceState {
    Totals(CountIndex),
    Postings {
        postings: Postings,
        counts: CountIndex,
        /// Built from a truncated entity set.
        partial: bool,
    },
}

/// One line of a rolled-up taxonomy, in depth-first order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollupRow {
    pub id: NodeId,
    pub depth: usize,
    pub level: Level,
    pub name: String,
    pub count: RollupCount,
}

#[derive(Debug, Clone)]
pub struct FacetCatalog {
    facet: String,
    taxonomy: FacetTaxonomy,
    state: IncidenceState,
}

impl FacetCatalog {
    /// Catalog backed by precomputed leaf totals only.
    pub fn from_totals(facet: &str, taxonomy: FacetTaxonomy, totals: &FacetTotals) -> Self {
        let mut counts = CountIndex::from_totals(totals);
        counts.relabel(taxonomy.leaves().iter());

        Self {
            facet: facet.to_string(),
            taxonomy,
            state: IncidenceState::Totals(counts),
        }
    }

    /// Catalog with exact postings from the full entity set.
    pub fn from_entities(facet: &str, taxonomy: FacetTaxonomy, entities: &[Entity]) -> Self {
        let mut catalog = Self {
            facet: facet.to_string(),
            taxonomy,
            state: IncidenceState::Totals(CountIndex::default()),
        };
        catalog.load_entities(entities);
        catalog
    }

    /// Catalog with postings from a full-table aggregate.
    pub fn from_aggregate(facet: &str, taxonomy: FacetTaxonomy, aggregate: &Aggregate) -> Self {
        let mut catalog = Self::from_entities(facet, taxonomy, &[]);
        catalog.load_aggregate(aggregate);
        catalog
    }

    /// Replace the approximate totals with postings built from the complete
    /// entity set.
    pub fn load_entities(&mut self, entities: &[Entity]) {
        self.load_postings(entities, false);
    }

    /// Load postings from a full-table aggregate. A truncated aggregate
    /// leaves rollups flagged as approximate.
    pub fn load_aggregate(&mut self, aggregate: &Aggregate) {
        if aggregate.truncated {
            tracing::warn!(
                facet = %self.facet,
                entities = aggregate.entities.len(),
                pages = aggregate.pages_fetched,
                "entity table truncated; rollups stay approximate"
            );
        }
        self.load_postings(&aggregate.entities, aggregate.truncated);
    }

    fn load_postings(&mut self, entities: &[Entity], partial: bool) {
        let postings = Postings::build(entities, &self.facet);
        let counts = CountIndex::build(entities, &self.facet);
        tracing::debug!(
            facet = %self.facet,
            leaves = postings.len(),
            entities = entities.len(),
            partial,
            "catalog switched to postings"
        );
        self.state = IncidenceState::Postings {
            postings,
            counts,
            partial,
        };
    }

    pub fn facet(&self) -> &str {
        &self.facet
    }

    pub fn taxonomy(&self) -> &FacetTaxonomy {
        &self.taxonomy
    }

    /// Whether rollups are union counts over the complete entity set.
    pub fn is_exact(&self) -> bool {
        matches!(self.state, IncidenceState::Postings { partial: false, .. })
    }

    pub fn counts(&self) -> &CountIndex {
        match &self.state {
            IncidenceState::Totals(counts) => counts,
            IncidenceState::Postings { counts, .. } => counts,
        }
    }

    pub fn incidence(&self) -> Incidence<'_> {
        match &self.state {
            IncidenceState::Totals(counts) => Incidence::Totals(counts),
            IncidenceState::Postings { postings, .. } => Incidence::Postings(postings),
        }
    }

    pub fn rollup(&self, id: NodeId) -> RollupCount {
        let mut count = self.taxonomy.rollup(id, self.incidence());
        if let IncidenceState::Postings { partial: true, .. } = self.state {
            count.exact = false;
        }
        count
    }

    pub fn rollup_tree(&self) -> Vec<RollupRow> {
        self.taxonomy
            .flatten()
            .into_iter()
            .map(|(id, depth)| {
                let node = self.taxonomy.node(id);
                RollupRow {
                    id,
                    depth,
                    level: node.level,
                    name: node.name.clone(),
                    count: self.rollup(id),
                }
            })
            .collect()
    }
}

/// Fetch the backend's leaf totals for the initial, approximate view.
pub async fn load_totals(source: &dyn EntitySource) -> Result<FacetTotals, FetchError> {
    source.fetch_facet_counts().await
}

/// Fetch the complete, unfiltered entity table.
///
/// This is the background full-table load that postings are built from. A
/// truncated result is still returned with `truncated` set;
/// [`FacetCatalog::load_aggregate`] keeps its rollups approximate.
pub async fn load_all_entities(
    source: Arc<dyn EntitySource>,
    config: &BackendConfig,
) -> Result<Aggregate, FetchError> {
    let fetcher = AggregateFetcher::new(source, config);
    match fetcher.fetch(&FilterState::new()).await {
        AggregateOutcome::Complete(agg) => Ok(agg),
        AggregateOutcome::Unavailable { error, .. } => Err(error),
        AggregateOutcome::Superseded { .. } => Err(FetchError::Unavailable(
            "full entity load superseded".to_string(),
        )),
    }
}

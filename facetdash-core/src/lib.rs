//! facetdash-core: faceted aggregation and hierarchical rollups for the
//! organization dashboard.
//!
//! ```text
//! tokens ──► counts ──► hierarchy ──► catalog
//!
//! filtering ──► fetch ──► paging
//! ```
//!
//! Token parsing, counting and rollups are synchronous and pure over
//! immutable snapshots; only [`fetch`] and [`paging`] touch the network.

// Public modules
pub mod catalog;
pub mod config;
pub mod counts;
pub mod error;
pub mod fetch;
pub mod filtering;
pub mod grouping;
pub mod hierarchy;
pub mod io;
pub mod models;
pub mod paging;
pub mod sorting;
pub mod tokens;
pub mod validation;

// Re-export commonly used types for convenience
pub use catalog::{load_all_entities, load_totals, FacetCatalog, RollupRow};
pub use config::{BackendConfig, DisplayConfig, EngineConfig};
pub use counts::{CountEntry, CountIndex, Postings};
pub use error::{FetchError, LoadError};
pub use fetch::{
    Aggregate, AggregateFetcher, AggregateOutcome, AggregateView, EntityQuery, EntitySource,
    FacetQuery, FetchGeneration, HttpEntitySource, InMemorySource,
};
pub use filtering::{
    apply_filters, parse_facet_filters, parse_match_modes, FacetSelection, FilterState,
};
pub use grouping::{get_sorted_group_names, group_entities_by_facet};
pub use hierarchy::{FacetTaxonomy, Incidence, Level, NodeId, NodeSelection, RollupCount, TaxonomyNode};
pub use io::{load_entities, load_taxonomy_rows};
pub use models::{Entity, EntityId, EntityPage, FacetTotals, FacetValue, MatchMode, TaxonomyRow};
pub use paging::{LocalPager, Page, PagingStrategy};
pub use sorting::{label_sort_key, rank_counts};
pub use tokens::{normalize_key, parse_tokens, Token};
pub use validation::validate_taxonomy;

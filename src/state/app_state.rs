use std::collections::HashMap;
use std::sync::Arc;
use facetdash_core::*;

/// Session state for one dashboard run
/// Derived indexes are read-only; only the filters, the pager and the
/// committed aggregate change while the session is alive
pub struct AppState {
    /// Engine configuration
    pub config: EngineConfig,
    /// Taxonomy reference rows, loaded once
    pub taxonomy_rows: Vec<TaxonomyRow>,
    /// Active filters
    pub filters: FilterState,
    /// Current page window
    pub pager: LocalPager,
    /// Last committed aggregate for ALL-mode filters
    pub aggregate: AggregateView,
    fetcher: AggregateFetcher,
}

impl AppState {
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn EntitySource>,
        taxonomy_rows: Vec<TaxonomyRow>,
    ) -> Self {
        let fetcher = AggregateFetcher::new(source, &config.backend);
        let pager = LocalPager::new(config.display.page_size);

        Self {
            config,
            taxonomy_rows,
            filters: FilterState::new(),
            pager,
            aggregate: AggregateView::default(),
            fetcher,
        }
    }

    pub fn source(&self) -> &Arc<dyn EntitySource> {
        self.fetcher.source()
    }

    pub fn fetcher(&self) -> &AggregateFetcher {
        &self.fetcher
    }

    /// Apply "facet=value" selections and "facet=mode" match modes
    pub fn apply_filters(
        &mut self,
        facets: &HashMap<String, Vec<String>>,
        modes: &HashMap<String, MatchMode>,
    ) {
        for (facet, mode) in modes {
            self.filters.set_match_mode(facet, *mode);
        }
        for (facet, values) in facets {
            for value in values {
                self.filters.select(facet, value);
            }
        }
        self.filters_changed();
    }

    /// Toggle a taxonomy node (group toggle for L1/L2, single token for leaves)
    pub fn toggle_node(&mut self, facet: &str, node_name: &str) -> Result<(), String> {
        let taxonomy = FacetTaxonomy::from_rows(&self.taxonomy_rows);
        let path: Vec<&str> = node_name.split('>').map(str::trim).collect();

        let found = if path.len() > 1 {
            taxonomy.find_path(&path)
        } else {
            taxonomy.find(node_name)
        };
        let id = found.ok_or_else(|| format!("No taxonomy node named '{}'", node_name))?;

        taxonomy.toggle_node(id, &mut self.filters, facet);
        self.filters_changed();
        Ok(())
    }

    /// Any in-flight aggregate belongs to the old filters now
    fn filters_changed(&mut self) {
        self.fetcher.invalidate();
        self.pager.sync(&self.filters);
    }

    /// Catalog for one facet: approximate from backend totals, or exact from
    /// the full entity table
    pub async fn build_catalog(&self, facet: &str, exact: bool) -> Result<FacetCatalog, FetchError> {
        let taxonomy = FacetTaxonomy::from_rows(&self.taxonomy_rows);

        if exact {
            let aggregate = load_all_entities(self.source().clone(), &self.config.backend).await?;
            Ok(FacetCatalog::from_aggregate(facet, taxonomy, &aggregate))
        } else {
            let totals = load_totals(self.source().as_ref()).await?;
            Ok(FacetCatalog::from_totals(facet, taxonomy, &totals))
        }
    }
}

use facetdash_core::{FetchError, Page, PagingStrategy};

use crate::state::AppState;

/// Re-run the aggregate fetch when the current filters need local paging
/// Returns whether a new aggregate (or failure) was committed
pub async fn refresh_aggregate(state: &mut AppState) -> bool {
    if PagingStrategy::for_filters(&state.filters) != PagingStrategy::Local {
        return false;
    }

    state.aggregate.begin();
    let outcome = state.fetcher().fetch(&state.filters).await;
    state.aggregate.commit(outcome)
}

/// Produce the page the pager currently points at
pub async fn current_page(state: &mut AppState) -> Result<Page, FetchError> {
    if let Some(error) = state.aggregate.error.take() {
        // Surfaced once; retrying is up to the caller
        return Err(error);
    }

    let source = state.source().clone();
    state
        .pager
        .load_page(&state.filters, source.as_ref(), &state.aggregate.entities)
        .await
}

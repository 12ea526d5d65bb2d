//! Fake entity backend for integration tests.
//!
//! Spins up a minimal `axum` HTTP server on a random TCP port bound to
//! 127.0.0.1. Serves:
//! - `GET /entities`: paged, filtered entities; `_MATCH=all` is honored only
//!   for facets registered with [`FakeBackend::honor_all`]
//! - `GET /facet-counts`: leaf totals for the `services` facet
//!
//! Individual pages can be made to fail or to return an unparseable body.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use facetdash_core::{Entity, EntityQuery, EntitySource, FacetQuery, InMemorySource, MatchMode};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// State shared between the router and test code.
#[derive(Default)]
struct ApiState {
    source: InMemorySource,
    fail_page: Option<usize>,
    malformed_page: Option<usize>,
    /// Raw query strings of every `/entities` request, in arrival order.
    requests: Vec<HashMap<String, String>>,
}

/// Handle to the running fake backend.
pub struct FakeBackend {
    addr: SocketAddr,
    state: Arc<Mutex<ApiState>>,
}

impl FakeBackend {
    /// Start the fake backend over `entities`. Returns once the server is
    /// listening.
    pub async fn start(entities: Vec<Entity>) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(ApiState {
            source: InMemorySource::new(entities).with_count_facet("services"),
            ..ApiState::default()
        }));

        let app = Router::new()
            .route("/entities", get(list_entities))
            .route("/facet-counts", get(facet_counts))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Ok(Self { addr, state })
    }

    /// Base URL for the API (e.g. `http://127.0.0.1:PORT`).
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Honor `_MATCH=all` for `facet`; other facets silently use ANY.
    pub async fn honor_all(&self, facet: &str) {
        let mut state = self.state.lock().await;
        let source = std::mem::take(&mut state.source);
        state.source = source.honor_all(facet);
    }

    /// Answer `page` with HTTP 500.
    pub async fn fail_page(&self, page: usize) {
        self.state.lock().await.fail_page = Some(page);
    }

    /// Answer `page` with a body that is not JSON.
    pub async fn malform_page(&self, page: usize) {
        self.state.lock().await.malformed_page = Some(page);
    }

    pub async fn requests(&self) -> Vec<HashMap<String, String>> {
        self.state.lock().await.requests.clone()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

fn parse_query(params: &HashMap<String, String>) -> EntityQuery {
    let number = |key: &str, default: usize| {
        params
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    };

    let mut facets = BTreeMap::new();
    for (key, value) in params {
        if key == "page" || key == "pageSize" || key.ends_with("_MATCH") {
            continue;
        }
        let match_mode = params
            .get(&format!("{}_MATCH", key))
            .and_then(|m| m.parse().ok())
            .unwrap_or(MatchMode::Any);
        facets.insert(
            key.clone(),
            FacetQuery {
                tokens: value.split(',').map(str::to_string).collect(),
                match_mode,
            },
        );
    }

    EntityQuery {
        page: number("page", 1),
        page_size: number("pageSize", 20),
        facets,
    }
}

async fn list_entities(
    State(state): State<Arc<Mutex<ApiState>>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().await;
    state.requests.push(params.clone());
    let query = parse_query(&params);

    if state.fail_page == Some(query.page) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    if state.malformed_page == Some(query.page) {
        return (StatusCode::OK, "<html>gateway timeout</html>").into_response();
    }

    match state.source.fetch_page(&query).await {
        Ok(page) => axum::Json(serde_json::json!({
            "data": page.data,
            "total": page.total,
        }))
        .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn facet_counts(State(state): State<Arc<Mutex<ApiState>>>) -> Response {
    let state = state.lock().await;
    match state.source.fetch_facet_counts().await {
        Ok(totals) => axum::Json(serde_json::json!({
            "totalsByToken": totals.totals_by_token,
            "totalEntities": totals.total_entities,
        }))
        .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

//! HTTP endpoint returning ranked windows for Sourcegraph-hosted files.
//!
//! `GET /glance?file=<sourcegraph blob url>` responds with
//! `{"lineWindows": [...], "highlightedContent": "..."}`. Responses are
//! cached per `file` value in a bounded least-recently-used cache.

use std::{net::SocketAddr, num::NonZeroUsize, sync::Arc};

use axum::{
    Json,
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    embedding::Embedder,
    error::{Error, Result},
    glance::{self, ScoredWindow},
    source::{ContentSource, SourcegraphFile},
};

/// Window size used for every request.
pub const DEFAULT_SERVER_WINDOW_SIZE: usize = 10;
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlanceResponse {
    pub line_windows: Vec<ScoredWindow>,
    pub highlighted_content: Option<String>,
}

pub type ResponseCache = Mutex<LruCache<String, Arc<GlanceResponse>>>;

/// Build the response cache, or `None` when `capacity` is 0.
pub fn build_cache(capacity: usize) -> Option<ResponseCache> {
    NonZeroUsize::new(capacity)
        .map(|capacity| Mutex::new(LruCache::new(capacity)))
}

pub struct ServerState<E, S> {
    embedder: Arc<E>,
    source: S,
    window_size: usize,
    cache: Option<ResponseCache>,
}

impl<E, S> ServerState<E, S> {
    pub fn new(
        embedder: Arc<E>,
        source: S,
        window_size: usize,
        cache_capacity: usize,
    ) -> Self {
        Self {
            embedder,
            source,
            window_size,
            cache: build_cache(cache_capacity),
        }
    }

    async fn cached(&self, key: &str) -> Option<Arc<GlanceResponse>> {
        let cache = self.cache.as_ref()?;
        cache.lock().await.get(key).cloned()
    }

    async fn remember(&self, key: String, response: Arc<GlanceResponse>) {
        if let Some(cache) = &self.cache {
            cache.lock().await.put(key, response);
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GlanceQuery {
    file: Option<String>,
}

pub fn router<E, S>(state: Arc<ServerState<E, S>>) -> Router
where
    E: Embedder + 'static,
    S: ContentSource + 'static,
{
    Router::new()
        .route("/glance", get(glance_handler::<E, S>))
        .with_state(state)
}

/// Bind `addr` and serve until the process exits.
pub async fn serve<E, S>(addr: SocketAddr, state: ServerState<E, S>) -> Result<()>
where
    E: Embedder + 'static,
    S: ContentSource + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "serving /glance");
    axum::serve(listener, router(Arc::new(state))).await?;
    Ok(())
}

async fn glance_handler<E, S>(
    State(state): State<Arc<ServerState<E, S>>>,
    Query(query): Query<GlanceQuery>,
) -> Response
where
    E: Embedder + 'static,
    S: ContentSource + 'static,
{
    let Some(url) = query.file.filter(|f| !f.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing file parameter").into_response();
    };

    let Some(file) = SourcegraphFile::parse_url(&url) else {
        return (
            StatusCode::BAD_REQUEST,
            format!("Not a Sourcegraph file URL: {url}"),
        )
            .into_response();
    };

    if let Some(cached) = state.cached(&url).await {
        return Json(cached.as_ref()).into_response();
    }

    let resolved = match state.source.resolve(&file).await {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!(%url, error = %e, "failed to fetch file");
            return (StatusCode::BAD_GATEWAY, e.to_string()).into_response();
        }
    };

    let embedder = Arc::clone(&state.embedder);
    let window_size = state.window_size;
    let content = resolved.content;
    let ranked = tokio::task::spawn_blocking(move || {
        glance::glance(embedder.as_ref(), &content, window_size)
    })
    .await
    .map_err(|e| Error::Config(format!("ranking task failed: {e}")))
    .and_then(|r| r);

    let line_windows = match ranked {
        Ok(windows) => windows,
        Err(e) => {
            warn!(%url, error = %e, "failed to rank file");
            let status = match e {
                Error::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            return (status, e.to_string()).into_response();
        }
    };

    let response = Arc::new(GlanceResponse {
        line_windows,
        highlighted_content: resolved.highlighted,
    });
    state.remember(url, Arc::clone(&response)).await;

    Json(response.as_ref()).into_response()
}

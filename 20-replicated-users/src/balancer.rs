//! Round-robin load balancer run by the supervisor on the public port.
//!
//! Each incoming request is forwarded verbatim (method, path, query, body) to
//! the next worker in turn, and the worker's status, content type and body are
//! passed back unchanged. The balancer knows nothing about users.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::{Context, Result, ensure};
use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{Method, Uri, header},
    response::{IntoResponse, Response},
};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::http::cors_layer;

#[derive(Clone)]
pub struct Balancer {
    state: Arc<BalancerState>,
}

struct BalancerState {
    upstreams: Vec<SocketAddr>,
    next: AtomicUsize,
    client: reqwest::Client,
}

impl Balancer {
    pub fn new(upstreams: Vec<SocketAddr>) -> Result<Self> {
        ensure!(!upstreams.is_empty(), "load balancer requires at least one worker");
        Ok(Self {
            state: Arc::new(BalancerState {
                upstreams,
                next: AtomicUsize::new(0),
                client: reqwest::Client::new(),
            }),
        })
    }

    /// Picks the next worker, cycling through them in order.
    pub fn next_upstream(&self) -> SocketAddr {
        let upstreams = &self.state.upstreams;
        let index = self.state.next.fetch_add(1, Ordering::Relaxed) % upstreams.len();
        upstreams[index]
    }

    async fn forward(&self, method: Method, uri: &Uri, body: Bytes) -> Result<Response> {
        let upstream = self.next_upstream();
        let path = uri.path_and_query().map_or("/", |path| path.as_str());
        let url = format!("http://{upstream}{path}");
        debug!(%method, %url, "forwarding request");

        let reply = self
            .state
            .client
            .request(method, &url)
            .body(body)
            .send()
            .await
            .with_context(|| format!("failed to reach worker at {upstream}"))?;

        let status = reply.status();
        let content_type = reply.headers().get(header::CONTENT_TYPE).cloned();
        let bytes = reply
            .bytes()
            .await
            .with_context(|| format!("failed to read reply from worker at {upstream}"))?;

        let mut response = (status, bytes).into_response();
        if let Some(content_type) = content_type {
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, content_type);
        }
        Ok(response)
    }
}

pub fn app(balancer: Balancer) -> Router {
    Router::new()
        .fallback(proxy)
        .with_state(balancer)
        .layer(DefaultBodyLimit::disable())
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

async fn proxy(
    State(balancer): State<Balancer>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    match balancer.forward(method, &uri, body).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = ?err, "upstream worker failed");
            ApiError::Internal.into_response()
        }
    }
}

//! HTTP endpoint of a worker.
//!
//! Axum only buffers the request and writes the reply; all routing decisions
//! live in [`crate::router`] and run inside the store actor. A single fallback
//! handler receives every request so that unknown paths and methods go through
//! the same guard sequence as known ones.

use std::any::Any;
use std::future::Future;

use anyhow::Result;
use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Method, Uri, header},
    response::{IntoResponse, Response},
};
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info};

use crate::error::ApiError;
use crate::router::Reply;
use crate::runtime::StoreHandle;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Builds the worker's axum application around a running store actor.
pub fn app(store: StoreHandle) -> Router {
    Router::new()
        .fallback(handle_request)
        .with_state(store)
        .layer(DefaultBodyLimit::disable())
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Every response allows any origin, errors and panics included.
pub(crate) fn cors_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    )
}

/// Serves `app` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn handle_request(
    State(store): State<StoreHandle>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    info!(pid = std::process::id(), %method, %uri, "request");

    match store.dispatch(method, uri.path().to_string(), body).await {
        Ok(reply) => reply.into_response(),
        Err(err) => {
            error!(error = ?err, "store unavailable");
            ApiError::Internal.into_response()
        }
    }
}

fn handle_panic(_panic: Box<dyn Any + Send + 'static>) -> Response {
    error!("request handler panicked");
    ApiError::Internal.into_response()
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let body = self.body.map(|body| body.to_string()).unwrap_or_default();
        (
            self.status,
            [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)],
            body,
        )
            .into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        Reply::from(self).into_response()
    }
}

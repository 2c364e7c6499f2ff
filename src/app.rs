use std::net::SocketAddr;

use axum::{middleware::from_fn_with_state, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    auth, companies, middleware::api_key::require_api_key, openapi, state::AppState, users,
};

pub fn build_app(state: AppState) -> Router {
    let gate = state.api_gate.clone();

    Router::new()
        .merge(auth::router(&state))
        .merge(users::router(&state))
        .merge(companies::router())
        .merge(openapi::router())
        .with_state(state)
        .layer(from_fn_with_state(gate, require_api_key))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let path = req.uri().path().to_owned();
                    tracing::info_span!("http_request", %method, %path, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, ?latency, "response");
                        } else {
                            tracing::info!(%status, ?latency, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use procprom_metrics::{
    CONTENT_TYPE, MetricTuple, PrometheusEncoder, SystemMetrics, TupleConfig, TupleKind,
};

pub struct ExporterState {
    pub prefix: String,
    pub sys_prefix: String,
    pub sys_metrics: bool,
    pub static_metrics: Vec<MetricTuple>,
    pub system_metrics: Arc<SystemMetrics>,
}

pub fn exporter_router(state: Arc<ExporterState>) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .route("/health", get(health_live))
        .with_state(state)
}

pub async fn health_live() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn prometheus_metrics(State(state): State<Arc<ExporterState>>) -> impl IntoResponse {
    let mut tuples = Vec::with_capacity(state.static_metrics.len() + 1);
    tuples.push(MetricTuple::new(TupleKind::Gauge, "up", "Is up", 1));
    tuples.extend(state.static_metrics.iter().cloned());

    let config = TupleConfig {
        prefix: state.prefix.clone(),
        tuples,
        sys_metrics: state.sys_metrics,
        sys_prefix: Some(state.sys_prefix.clone()),
    };
    let payload = PrometheusEncoder::from_tuples_with(config, &state.system_metrics)
        .await
        .render();

    let mut response = Response::new(Body::from(payload));
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));

    response
}

// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP REST API for the harvester.
//!
//! Every endpoint maps onto one [`HarvestService`] operation. Errors come
//! back as `{"error": {"code", "message"}}` with a matching status.

use crate::company::CompanySummary;
use crate::model::StoredCompany;
use crate::service::{HarvestError, HarvestOutcome, HarvestService};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub type SharedService = Arc<HarvestService>;

/// Build the axum Router with all REST endpoints.
pub fn router(state: SharedService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/crawl", get(handle_crawl).post(handle_crawl))
        .route("/api/v1/companies", get(handle_companies))
        .route("/api/v1/summary", get(handle_summary))
        .layer(cors)
        .with_state(state)
}

/// Bind `host:port` and serve until the process stops.
pub async fn start(host: &str, port: u16, state: SharedService) -> anyhow::Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    serve(listener, state).await
}

/// Serve on an already bound listener.
pub async fn serve(listener: TcpListener, state: SharedService) -> anyhow::Result<()> {
    tracing::info!("REST API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

impl HarvestError {
    fn status(&self) -> StatusCode {
        match self {
            HarvestError::CrawlInProgress => StatusCode::CONFLICT,
            HarvestError::Crawl(_) => StatusCode::BAD_GATEWAY,
            HarvestError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            HarvestError::CrawlInProgress => "E_CRAWL_IN_PROGRESS",
            HarvestError::Crawl(_) => "E_CRAWL_FAILED",
            HarvestError::Store(_) => "E_STORE",
        }
    }
}

impl IntoResponse for HarvestError {
    fn into_response(self) -> Response {
        tracing::warn!("request failed: {self}");
        let body = json!({
            "error": { "code": self.code(), "message": self.to_string() }
        });
        (self.status(), Json(body)).into_response()
    }
}

// ── Handlers ────────────────────────────────────────────────────

async fn health(State(state): State<SharedService>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "crawling": state.is_crawling(),
    }))
}

async fn handle_crawl(
    State(state): State<SharedService>,
) -> Result<Json<HarvestOutcome>, HarvestError> {
    Ok(Json(state.trigger_crawl().await?))
}

#[derive(Deserialize, Default)]
struct CompaniesParams {
    #[serde(default)]
    refresh: bool,
}

#[derive(Serialize)]
struct CompanyList {
    count: usize,
    companies: Vec<StoredCompany>,
}

async fn handle_companies(
    Query(params): Query<CompaniesParams>,
    State(state): State<SharedService>,
) -> Result<Json<CompanyList>, HarvestError> {
    let companies = state.list_companies(params.refresh).await?;
    Ok(Json(CompanyList {
        count: companies.len(),
        companies,
    }))
}

async fn handle_summary(
    State(state): State<SharedService>,
) -> Result<Json<CompanySummary>, HarvestError> {
    Ok(Json(state.summary().await?))
}

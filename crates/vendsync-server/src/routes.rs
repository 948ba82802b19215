use std::convert::Infallible;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use futures::{Stream, StreamExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use vendsync_core::models::{DiffReport, PriceChange};
use vendsync_core::progress::END_TOKEN;
use vendsync_core::{ProgressPacing, ProgressPoll, ProgressSubscription, new_run_id};

use crate::dto::{
    CommitRequest, CommitResponse, DiffReportDto, DiffRequest, HarvestAccepted, HarvestRequest,
    HealthResponse, SourceListResponse, StagedLineResponse, StagedResponse, TargetListResponse,
    TargetResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the full router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/v1/harvests", post(start_harvest))
        .route("/v1/progress/{run_id}", get(progress))
        .route("/v1/targets", get(list_targets))
        .route("/v1/targets/{id}/harvest", get(get_staged))
        .route("/v1/sources", get(list_sources))
        .route("/v1/diff", post(diff))
        .route("/v1/commit", post(commit));

    let public = Router::new()
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(api).with_state(state)
}

// ---------------------------------------------------------------------------
// Harvests
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/harvests",
    request_body = HarvestRequest,
    responses(
        (status = 202, description = "Harvest started", body = HarvestAccepted),
        (status = 404, description = "Unknown scrape target", body = crate::dto::ErrorResponse),
    ),
    tag = "harvests"
)]
pub async fn start_harvest(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<HarvestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let target_id = body.target_id;
    // Reject unknown targets before anything runs in the background.
    let target = state.db.target_repo().get_target(target_id).await?;
    if target.is_none() {
        return Err(vendsync_core::AppError::TargetNotFound(format!("scrape target {target_id}")).into());
    }

    let run_id = body
        .run_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(new_run_id);

    let harvester = state.harvester.clone();
    let reporter = state.progress.reporter(run_id.clone());
    let cancel = state.shutdown.child_token();
    tokio::spawn(async move {
        // Failures are already published to the run's channel.
        if let Ok(summary) = harvester.run(target_id, &reporter, &cancel).await {
            tracing::info!(
                run_id = %summary.run_id,
                target_id,
                staged = summary.staged,
                pages = summary.pages,
                "Background harvest finished"
            );
        }
    });

    tracing::info!(%run_id, target_id, "Harvest accepted");
    Ok((StatusCode::ACCEPTED, axum::Json(HarvestAccepted { run_id, target_id })))
}

#[utoipa::path(
    get,
    path = "/v1/progress/{run_id}",
    params(
        ("run_id" = String, Path, description = "Run identifier")
    ),
    responses(
        (status = 200, description = "Server-sent status lines, ending with `END`", content_type = "text/event-stream"),
    ),
    tag = "harvests"
)]
pub async fn progress(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!(%run_id, "Progress stream opened");
    let subscription = state.progress.subscribe(&run_id);
    let events = progress_lines(subscription, state.pacing)
        .map(|line| Ok::<_, Infallible>(Event::default().data(line)));
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Relay a subscription line by line until the run ends or stays silent for
/// `max_idle_polls` polls. The last line is always [`END_TOKEN`].
fn progress_lines(
    subscription: ProgressSubscription,
    pacing: ProgressPacing,
) -> impl Stream<Item = String> {
    futures::stream::unfold(Some(subscription), move |state| async move {
        let mut subscription = state?;
        let mut idle = 0;
        loop {
            match subscription.next(pacing.poll_wait).await {
                ProgressPoll::Message(message) => return Some((message, Some(subscription))),
                ProgressPoll::Idle if idle + 1 < pacing.max_idle_polls => {
                    idle += 1;
                    tokio::time::sleep(pacing.idle_sleep).await;
                }
                ProgressPoll::Idle => {
                    tracing::debug!(
                        run_id = %subscription.run_id(),
                        idle_polls = pacing.max_idle_polls,
                        "Progress stream idle, closing"
                    );
                    return Some((END_TOKEN.to_string(), None));
                }
                ProgressPoll::End => {
                    tracing::debug!(run_id = %subscription.run_id(), "Progress stream closed");
                    return Some((END_TOKEN.to_string(), None));
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Targets and staging
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/targets",
    responses(
        (status = 200, description = "Configured scrape targets", body = TargetListResponse),
    ),
    tag = "targets"
)]
pub async fn list_targets(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let targets = state.db.target_repo().list_targets().await?;
    let total = targets.len();

    Ok(axum::Json(TargetListResponse {
        targets: targets.into_iter().map(TargetResponse::from).collect(),
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/targets/{id}/harvest",
    params(
        ("id" = i64, Path, description = "Scrape target ID")
    ),
    responses(
        (status = 200, description = "Staged lines of the latest harvest", body = StagedResponse),
        (status = 404, description = "Unknown scrape target", body = crate::dto::ErrorResponse),
    ),
    tag = "targets"
)]
pub async fn get_staged(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if state.db.target_repo().get_target(id).await?.is_none() {
        return Err(vendsync_core::AppError::TargetNotFound(format!("scrape target {id}")).into());
    }

    let lines = state.db.harvest_repo().get(id).await?;
    let total = lines.len();

    Ok(axum::Json(StagedResponse {
        target_id: id,
        lines: lines.into_iter().map(StagedLineResponse::from).collect(),
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/sources",
    responses(
        (status = 200, description = "Registered crawl sources", body = SourceListResponse),
    ),
    tag = "targets"
)]
pub async fn list_sources(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(SourceListResponse {
        sources: state.harvester.sources().names(),
    })
}

// ---------------------------------------------------------------------------
// Diff and commit
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/diff",
    request_body = DiffRequest,
    responses(
        (status = 200, description = "One report per requested path", body = Vec<DiffReportDto>),
        (status = 400, description = "No paths requested", body = crate::dto::ErrorResponse),
        (status = 404, description = "Unknown hub path", body = crate::dto::ErrorResponse),
    ),
    tag = "reconcile"
)]
pub async fn diff(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<DiffRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.path_ids.is_empty() {
        return Ok(ApiError::bad_request("path_ids must not be empty"));
    }

    let reports = state
        .reconciler
        .diff(&body.path_ids, body.origins.as_deref())
        .await?;

    let response: Vec<DiffReportDto> = reports.into_iter().map(Into::into).collect();
    Ok(axum::Json(response).into_response())
}

#[utoipa::path(
    post,
    path = "/v1/commit",
    request_body = CommitRequest,
    responses(
        (status = 200, description = "Hub updated; the input is echoed back", body = CommitResponse),
        (status = 409, description = "Conflicting write", body = crate::dto::ErrorResponse),
    ),
    tag = "reconcile"
)]
pub async fn commit(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<CommitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = match &body {
        CommitRequest::Reports { reports } => {
            let reports: Vec<DiffReport> = reports.iter().cloned().map(Into::into).collect();
            state.reconciler.commit_reports(&reports).await?
        }
        CommitRequest::Changes { changes } => {
            let changes: Vec<PriceChange> = changes.iter().cloned().map(Into::into).collect();
            state.reconciler.commit(&changes).await?
        }
    };

    Ok(axum::Json(CommitResponse {
        updated,
        committed: body,
    }))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_status = match state.db.health_check().await {
        Ok(()) => "ok",
        Err(_) => "error",
    };

    let status = if db_status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if db_status == "ok" {
            "healthy"
        } else {
            "unhealthy"
        },
        database: db_status,
    };

    (status, axum::Json(response))
}

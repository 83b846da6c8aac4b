//! HTTP handlers for production runs

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::{page, require};
use crate::middleware::CurrentUser;
use crate::services::production::{
    CancelOutcome, CompleteRunInput, CompleteStageInput, CreateRunInput, ProductionService,
    RunFilter, RunMaterialInput, StartRunInput,
};
use crate::AppState;
use shared::{PaginatedResponse, ProductionRun, RunCompleted, RunDetail, RunStage, RunStatus};

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    pub status: Option<RunStatus>,
    pub product_item_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct NoteInput {
    pub note: String,
}

/// Create a production run in planning
pub async fn create_run(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateRunInput>,
) -> AppResult<Json<RunDetail>> {
    require(&current_user.0, "runs", "write")?;
    let service = ProductionService::new(state.db);
    let run = service
        .create_run(current_user.0.org_id, current_user.0.user_id, input)
        .await?;
    Ok(Json(run))
}

/// Get a run with its material lines and stages
pub async fn get_run(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(run_id): Path<Uuid>,
) -> AppResult<Json<RunDetail>> {
    let service = ProductionService::new(state.db);
    let run = service.get_run(current_user.0.org_id, run_id).await?;
    Ok(Json(run))
}

/// List runs with optional status/product filters
pub async fn list_runs(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListRunsQuery>,
) -> AppResult<Json<PaginatedResponse<ProductionRun>>> {
    let service = ProductionService::new(state.db);
    let filter = RunFilter {
        status: query.status,
        product_item_id: query.product_item_id,
    };
    let runs = service
        .list_runs(
            current_user.0.org_id,
            filter,
            page(query.page, query.per_page),
        )
        .await?;
    Ok(Json(runs))
}

/// Start a run, capturing planned labor and the overhead policy
pub async fn start_run(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(run_id): Path<Uuid>,
    Json(input): Json<StartRunInput>,
) -> AppResult<Json<RunDetail>> {
    require(&current_user.0, "runs", "write")?;
    let service = ProductionService::new(state.db);
    let run = service
        .start_run(current_user.0.org_id, run_id, input)
        .await?;
    Ok(Json(run))
}

/// Replace a run's unconsumed planned material lines
pub async fn set_materials(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(run_id): Path<Uuid>,
    Json(materials): Json<Vec<RunMaterialInput>>,
) -> AppResult<Json<RunDetail>> {
    require(&current_user.0, "runs", "write")?;
    let service = ProductionService::new(state.db);
    let run = service
        .set_materials(current_user.0.org_id, run_id, materials)
        .await?;
    Ok(Json(run))
}

/// Complete a single-shot run, computing its cost breakdown
pub async fn complete_run(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(run_id): Path<Uuid>,
    Json(input): Json<CompleteRunInput>,
) -> AppResult<Json<RunCompleted>> {
    require(&current_user.0, "runs", "write")?;
    let service = ProductionService::new(state.db);
    let completed = service
        .complete_run(current_user.0.org_id, current_user.0.user_id, run_id, input)
        .await?;
    Ok(Json(completed))
}

/// Cancel a run
pub async fn cancel_run(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(run_id): Path<Uuid>,
) -> AppResult<Json<CancelOutcome>> {
    require(&current_user.0, "runs", "write")?;
    let service = ProductionService::new(state.db);
    let outcome = service.cancel_run(current_user.0.org_id, run_id).await?;
    Ok(Json(outcome))
}

/// Append to a run's note trail (works on terminal runs too)
pub async fn append_note(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(run_id): Path<Uuid>,
    Json(input): Json<NoteInput>,
) -> AppResult<Json<RunDetail>> {
    require(&current_user.0, "runs", "write")?;
    let service = ProductionService::new(state.db);
    let run = service
        .append_note(current_user.0.org_id, run_id, &input.note)
        .await?;
    Ok(Json(run))
}

/// Start a stage
pub async fn start_stage(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((run_id, stage_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<RunStage>> {
    require(&current_user.0, "runs", "write")?;
    let service = ProductionService::new(state.db);
    let stage = service
        .start_stage(current_user.0.org_id, run_id, stage_id)
        .await?;
    Ok(Json(stage))
}

/// Complete a stage; completing the final stage completes the run
pub async fn complete_stage(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((run_id, stage_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<CompleteStageInput>,
) -> AppResult<Json<RunCompleted>> {
    require(&current_user.0, "runs", "write")?;
    let service = ProductionService::new(state.db);
    let completed = service
        .complete_stage(
            current_user.0.org_id,
            current_user.0.user_id,
            run_id,
            stage_id,
            input,
        )
        .await?;
    Ok(Json(completed))
}

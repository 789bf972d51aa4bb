//! HTTP routes.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use turnwright_domain::{
    CharacterId, RollRequestId, RollType, SceneId, TurnContractId, UserId, Vantage,
};

use crate::app::App;
use crate::use_cases::pipeline::PipelineError;
use crate::use_cases::rolls::{RollError, RollRequestParams};
use crate::use_cases::turn::TurnError;

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
        .route("/api/scenes", post(create_scene))
        .route("/api/scenes/{scene_id}/participants", post(add_participant))
        .route("/api/scenes/{scene_id}/events", get(list_events))
        .route("/api/scenes/{scene_id}/chat", get(list_chat))
        .route("/api/scenes/{scene_id}/turns", post(start_turn))
        .route("/api/turns/{id}", get(get_turn))
        .route("/api/turns/{id}/inputs", post(submit_input))
        .route("/api/turns/{id}/resolve", post(resolve_turn))
        .route("/api/turns/{id}/recover", post(recover_turn))
        .route("/api/turns/{id}/rolls", post(request_roll))
        .route(
            "/api/turns/{id}/rolls/{roll_id}/fulfill",
            post(fulfill_roll),
        )
}

async fn health() -> &'static str {
    "OK"
}

// =============================================================================
// Scene bootstrap
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSceneRequest {
    name: String,
    mode: String,
    host_user_id: Uuid,
}

async fn create_scene(
    State(app): State<Arc<App>>,
    Json(body): Json<CreateSceneRequest>,
) -> Result<Json<crate::infrastructure::ports::Scene>, ApiError> {
    let mode = body
        .mode
        .parse()
        .map_err(|e: turnwright_domain::DomainError| ApiError::BadRequest(e.to_string()))?;
    let scene = crate::infrastructure::ports::Scene {
        id: SceneId::new(),
        name: body.name,
        mode,
        host_user_id: UserId::from_uuid(body.host_user_id),
    };
    app.stores.scenes.insert(scene.clone()).await?;
    Ok(Json(scene))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddParticipantRequest {
    user_id: Uuid,
    name: String,
    class: Option<String>,
    #[serde(default = "default_level")]
    level: u8,
    /// When set, a map entity with this many hit points is staged for
    /// the character.
    max_hp: Option<i32>,
    #[serde(default)]
    stats: std::collections::BTreeMap<String, i32>,
}

fn default_level() -> u8 {
    1
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ParticipantResponse {
    character_id: CharacterId,
    entity_id: Option<turnwright_domain::EntityId>,
}

async fn add_participant(
    State(app): State<Arc<App>>,
    Path(scene_id): Path<Uuid>,
    Json(body): Json<AddParticipantRequest>,
) -> Result<Json<ParticipantResponse>, ApiError> {
    let scene_id = SceneId::from_uuid(scene_id);
    if app.stores.scenes.get(scene_id).await?.is_none() {
        return Err(ApiError::NotFound);
    }

    let class = body
        .class
        .map(|c| c.parse())
        .transpose()
        .map_err(|e: turnwright_domain::DomainError| ApiError::BadRequest(e.to_string()))?;

    let entity_id = match body.max_hp {
        Some(max_hp) => {
            let mut entity = turnwright_domain::EntityState::new(scene_id, &body.name, max_hp)
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            entity.stats = body.stats;
            let id = entity.id;
            app.stores.entities.upsert(entity).await?;
            Some(id)
        }
        None => None,
    };

    let participant = crate::infrastructure::ports::SceneParticipant {
        character_id: CharacterId::new(),
        user_id: UserId::from_uuid(body.user_id),
        name: body.name,
        entity_id,
        class,
        level: body.level,
    };
    let character_id = participant.character_id;
    app.stores
        .scenes
        .add_participant(scene_id, participant)
        .await?;

    Ok(Json(ParticipantResponse {
        character_id,
        entity_id,
    }))
}

async fn list_events(
    State(app): State<Arc<App>>,
    Path(scene_id): Path<Uuid>,
) -> Result<Json<Vec<turnwright_domain::EventLogEntry>>, ApiError> {
    let entries = app
        .stores
        .events
        .list_for_scene(SceneId::from_uuid(scene_id))
        .await?;
    Ok(Json(entries))
}

async fn list_chat(
    State(app): State<Arc<App>>,
    Path(scene_id): Path<Uuid>,
) -> Result<Json<Vec<turnwright_domain::ChatMessage>>, ApiError> {
    let messages = app
        .stores
        .chat
        .list_for_scene(SceneId::from_uuid(scene_id))
        .await?;
    Ok(Json(messages))
}

// =============================================================================
// Turn lifecycle
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartTurnRequest {
    user_id: Uuid,
    prompt: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TurnView {
    id: TurnContractId,
    scene_id: SceneId,
    mode: String,
    phase: String,
    state_version: u64,
    prompt: String,
    metadata: std::collections::BTreeMap<String, String>,
    pending_rolls: Vec<RollRequestId>,
}

async fn start_turn(
    State(app): State<Arc<App>>,
    Path(scene_id): Path<Uuid>,
    Json(body): Json<StartTurnRequest>,
) -> Result<Json<TurnView>, ApiError> {
    let contract = app
        .use_cases
        .start_turn
        .execute(
            SceneId::from_uuid(scene_id),
            UserId::from_uuid(body.user_id),
            body.prompt,
        )
        .await?;
    Ok(Json(TurnView {
        id: contract.id,
        scene_id: contract.scene_id,
        mode: contract.mode.to_string(),
        phase: contract.phase.to_string(),
        state_version: contract.state_version,
        prompt: contract.prompt,
        metadata: contract.metadata,
        pending_rolls: Vec::new(),
    }))
}

async fn get_turn(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TurnView>, ApiError> {
    let id = TurnContractId::from_uuid(id);
    let contract = app
        .stores
        .contracts
        .get(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let pending_rolls = app
        .stores
        .rolls
        .unresolved_for_contract(id)
        .await?
        .into_iter()
        .map(|r| r.id)
        .collect();
    Ok(Json(TurnView {
        id: contract.id,
        scene_id: contract.scene_id,
        mode: contract.mode.to_string(),
        phase: contract.phase.to_string(),
        state_version: contract.state_version,
        prompt: contract.prompt,
        metadata: contract.metadata,
        pending_rolls,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitInputRequest {
    user_id: Uuid,
    character_id: Option<Uuid>,
    content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InputResponse {
    input_id: turnwright_domain::PlayerInputId,
    ready: bool,
    reason: String,
    missing_characters: Vec<CharacterId>,
    pending_rolls: Vec<RollRequestId>,
}

async fn submit_input(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(body): Json<SubmitInputRequest>,
) -> Result<Json<InputResponse>, ApiError> {
    let accepted = app
        .use_cases
        .submit_input
        .execute(
            TurnContractId::from_uuid(id),
            UserId::from_uuid(body.user_id),
            body.character_id.map(CharacterId::from_uuid),
            body.content,
        )
        .await?;
    Ok(Json(InputResponse {
        input_id: accepted.input.id,
        ready: accepted.readiness.ready,
        reason: accepted.readiness.reason,
        missing_characters: accepted.readiness.missing,
        pending_rolls: accepted.pending_rolls,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveRequest {
    user_id: Uuid,
    #[serde(default)]
    force: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveResponse {
    contract_id: TurnContractId,
    state_version: u64,
    narrative: String,
    applied_effects: Vec<String>,
    next_contract_id: TurnContractId,
}

async fn resolve_turn(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let resolved = app
        .use_cases
        .resolve_turn
        .execute(
            TurnContractId::from_uuid(id),
            UserId::from_uuid(body.user_id),
            body.force,
        )
        .await?;
    Ok(Json(ResolveResponse {
        contract_id: resolved.contract.id,
        state_version: resolved.contract.state_version,
        narrative: resolved.narrative,
        applied_effects: resolved.report.applied,
        next_contract_id: resolved.next_contract.id,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecoverRequest {
    user_id: Uuid,
}

async fn recover_turn(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(body): Json<RecoverRequest>,
) -> Result<Json<TurnView>, ApiError> {
    let contract = app
        .use_cases
        .recover_turn
        .execute(TurnContractId::from_uuid(id), UserId::from_uuid(body.user_id))
        .await?;
    Ok(Json(TurnView {
        id: contract.id,
        scene_id: contract.scene_id,
        mode: contract.mode.to_string(),
        phase: contract.phase.to_string(),
        state_version: contract.state_version,
        prompt: contract.prompt,
        metadata: contract.metadata,
        pending_rolls: Vec::new(),
    }))
}

// =============================================================================
// Rolls
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RollRequestBody {
    character_id: Option<Uuid>,
    roll_type: String,
    notation: String,
    ability: Option<String>,
    skill: Option<String>,
    dc: Option<i32>,
    #[serde(default)]
    vantage: Vantage,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RollRequestedResponse {
    roll_id: RollRequestId,
    roll_order: u32,
    contract_phase: String,
}

async fn request_roll(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(body): Json<RollRequestBody>,
) -> Result<Json<RollRequestedResponse>, ApiError> {
    let roll_type: RollType = body
        .roll_type
        .parse()
        .map_err(|e: turnwright_domain::DomainError| ApiError::BadRequest(e.to_string()))?;
    let requested = app
        .use_cases
        .request_roll
        .execute(
            TurnContractId::from_uuid(id),
            RollRequestParams {
                character_id: body.character_id.map(CharacterId::from_uuid),
                roll_type,
                notation: body.notation,
                ability: body.ability,
                skill: body.skill,
                dc: body.dc,
                vantage: body.vantage,
            },
        )
        .await?;
    Ok(Json(RollRequestedResponse {
        roll_id: requested.request.id,
        roll_order: requested.request.roll_order,
        contract_phase: requested.contract.phase.to_string(),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FulfillRequest {
    user_id: Uuid,
    notation: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FulfillResponse {
    roll_id: RollRequestId,
    total: i32,
    breakdown: String,
    critical: bool,
    fumble: bool,
    success: Option<bool>,
    replayed: bool,
    unblocked: bool,
    contract_phase: String,
}

async fn fulfill_roll(
    State(app): State<Arc<App>>,
    Path((id, roll_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<FulfillRequest>,
) -> Result<Json<FulfillResponse>, ApiError> {
    let fulfilled = app
        .use_cases
        .fulfill_roll
        .execute(
            TurnContractId::from_uuid(id),
            RollRequestId::from_uuid(roll_id),
            UserId::from_uuid(body.user_id),
            body.notation,
        )
        .await?;
    let resolution = fulfilled
        .request
        .resolution
        .as_ref()
        .ok_or_else(|| ApiError::Internal("fulfilled roll has no resolution".to_string()))?;
    Ok(Json(FulfillResponse {
        roll_id: fulfilled.request.id,
        total: resolution.total,
        breakdown: resolution.breakdown.clone(),
        critical: resolution.critical,
        fumble: resolution.fumble,
        success: resolution.success,
        replayed: fulfilled.replayed,
        unblocked: fulfilled.unblocked,
        contract_phase: fulfilled.contract.phase.to_string(),
    }))
}

// =============================================================================
// Errors
// =============================================================================

pub enum ApiError {
    NotFound,
    BadRequest(String),
    Forbidden,
    /// 409: readiness gates, version conflicts, closed phases.
    Conflict(String),
    /// 502: narrator call failed.
    Upstream(String),
    /// 422: narrator output rejected by the safety check.
    Unsafe(Vec<String>),
    /// 500 with the per-effect report; the host recovers via
    /// `/api/turns/{id}/recover`.
    PartialApplication {
        message: String,
        report: crate::use_cases::pipeline::ApplicationReport,
    },
    Internal(String),
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg).into_response(),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg).into_response(),
            ApiError::Unsafe(issues) => {
                (StatusCode::UNPROCESSABLE_ENTITY, issues.join("; ")).into_response()
            }
            ApiError::PartialApplication { message, report } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": message,
                    "applied": report.applied,
                    "failed": report.failed,
                })),
            )
                .into_response(),
            ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}

impl From<crate::infrastructure::ports::RepoError> for ApiError {
    fn from(e: crate::infrastructure::ports::RepoError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<TurnError> for ApiError {
    fn from(e: TurnError) -> Self {
        match e {
            TurnError::SceneNotFound | TurnError::ContractNotFound => ApiError::NotFound,
            TurnError::PermissionDenied => ApiError::Forbidden,
            TurnError::ActiveContractExists
            | TurnError::InputClosed(_)
            | TurnError::ConcurrentModification => ApiError::Conflict(e.to_string()),
            TurnError::NotReady { .. } => ApiError::Conflict(e.to_string()),
            TurnError::AiInvocationFailure(msg) => ApiError::Upstream(msg),
            TurnError::SafetyViolation { issues } => ApiError::Unsafe(issues),
            TurnError::Pipeline(PipelineError::ConcurrentModification) => {
                ApiError::Conflict("turn contract was modified concurrently".to_string())
            }
            TurnError::Pipeline(PipelineError::PartialApplication { report }) => {
                let fail_count = report.failed.len();
                let total = report.applied.len() + fail_count;
                ApiError::PartialApplication {
                    message: format!("{} of {} effects failed to apply", fail_count, total),
                    report,
                }
            }
            TurnError::Pipeline(e) => ApiError::Internal(e.to_string()),
            TurnError::Domain(e) => match e {
                turnwright_domain::DomainError::InvalidTransition { .. } => {
                    ApiError::Conflict(e.to_string())
                }
                _ => ApiError::BadRequest(e.to_string()),
            },
            TurnError::Repo(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<RollError> for ApiError {
    fn from(e: RollError) -> Self {
        match e {
            RollError::ContractNotFound | RollError::RollNotFound => ApiError::NotFound,
            RollError::PermissionDenied => ApiError::Forbidden,
            RollError::InvalidPhase(_) | RollError::ConcurrentModification => {
                ApiError::Conflict(e.to_string())
            }
            RollError::Domain(e) => ApiError::BadRequest(e.to_string()),
            RollError::Repo(e) => ApiError::Internal(e.to_string()),
        }
    }
}

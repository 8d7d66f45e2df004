//! Handlers for the `/api/arrangements` resource.
//!
//! Every handler acts for the authenticated owner only: records owned by
//! someone else answer 403, absent ones 404. Changes made here are pushed
//! to the owner's realtime connection directly, since the change bridge
//! ignores writes from this process.

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use harmonia_core::arrangement::{
    search_terms, validate_name, validate_source_size, ArrangementParams,
};
use harmonia_core::error::CoreError;
use harmonia_core::realtime::ChannelFrame;
use harmonia_core::types::{DbId, OwnerId};
use harmonia_db::models::arrangement::{Arrangement, ArrangementListQuery, CreateArrangement};
use harmonia_db::models::status::ArrangementStatus;
use harmonia_db::repositories::ArrangementRepo;
use harmonia_pipeline::{DispatchError, JobRequest};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::StatusResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// An arrangement as shown to its owner.
#[derive(Debug, Serialize)]
pub struct ArrangementView {
    pub id: DbId,
    pub name: String,
    pub bpm: f64,
    pub tags: String,
    /// Download link; present only once the arrangement is COMPLETED.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub created_at: String,
    pub status: &'static str,
}

impl ArrangementView {
    fn new(arrangement: &Arrangement, host_url: &str) -> Self {
        let status = arrangement.status();
        let file = (status == ArrangementStatus::Completed)
            .then(|| format!("{host_url}/api/arrangements/{}/file", arrangement.id));
        Self {
            id: arrangement.id,
            name: arrangement.name.clone(),
            bpm: arrangement.bpm,
            tags: arrangement.tags.clone(),
            file,
            created_at: arrangement.created_at.to_rfc3339(),
            status: status.name(),
        }
    }
}

/// One page of the owner's arrangements.
#[derive(Debug, Serialize)]
pub struct ArrangementList {
    pub count: i64,
    pub pages: i64,
    pub next: Option<String>,
    pub prev: Option<String>,
    pub results: Vec<ArrangementView>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub search_query: Option<String>,
    /// Comma-separated status names.
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/arrangements
///
/// Multipart fields `name`, `tags`, `bpm` and `file` (the percussion WAV).
/// The record is created PENDING and the job handed to the dispatcher.
pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<StatusResponse>)> {
    let upload = read_upload(multipart).await?;
    let params = ArrangementParams {
        name: upload.name,
        bpm: upload.bpm,
        tags: upload.tags,
    }
    .normalized()?;
    validate_source_size(upload.file.len())?;
    check_source_audio(upload.file.clone()).await?;

    let arrangement = ArrangementRepo::create(
        &state.pool,
        &CreateArrangement {
            owner_id: user.owner_id,
            name: params.name,
            bpm: params.bpm,
            tags: params.tags,
        },
    )
    .await?;
    tracing::info!(
        arrangement_id = arrangement.id,
        owner_id = user.owner_id,
        bpm = arrangement.bpm,
        "Arrangement created",
    );

    notify_owner(&state, user.owner_id).await;

    let job = JobRequest {
        arrangement_id: arrangement.id,
        source_audio: upload.file.to_vec(),
        bpm: arrangement.bpm,
        tags: arrangement.tags.clone(),
    };
    tokio::spawn(dispatch(state.clone(), user.owner_id, job));

    Ok((
        StatusCode::CREATED,
        Json(StatusResponse::success("Arrangement added successfully.").with_id(arrangement.id)),
    ))
}

/// GET /api/arrangements?page=&search_query=&status=
pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ListParams>,
) -> AppResult<Json<ArrangementList>> {
    let per_page = state.config.per_page;
    let page = params.page.unwrap_or(1).max(1);
    let search_query = params.search_query.unwrap_or_default();
    let status_filter = params.status.unwrap_or_default();
    let statuses = parse_statuses(&status_filter)?;

    let query = ArrangementListQuery {
        search_terms: search_terms(&search_query),
        statuses,
        limit: per_page,
        offset: (page - 1).saturating_mul(per_page),
    };
    let result = ArrangementRepo::list_by_owner(&state.pool, user.owner_id, &query).await?;

    if result.items.is_empty() {
        return Err(AppError::NotFound("Nothing found".into()));
    }

    let pages = page_count(result.total, per_page);
    let link = |page: i64| page_link(&state.config.host_url, page, &search_query, &status_filter);
    let next = (page < pages).then(|| link(page + 1));
    let prev = (page > 1).then(|| link(page - 1));

    let host_url = &state.config.host_url;
    Ok(Json(ArrangementList {
        count: result.total,
        pages,
        next,
        prev,
        results: result
            .items
            .iter()
            .map(|a| ArrangementView::new(a, host_url))
            .collect(),
    }))
}

/// GET /api/arrangements/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<ArrangementView>> {
    let arrangement = load_owned(&state, id, user.owner_id).await?;
    Ok(Json(ArrangementView::new(&arrangement, &state.config.host_url)))
}

/// PATCH /api/arrangements/{id}
pub async fn rename(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<RenameRequest>,
) -> AppResult<Json<StatusResponse>> {
    load_owned(&state, id, user.owner_id).await?;
    validate_name(&input.name)?;

    ArrangementRepo::rename(&state.pool, id, input.name.trim())
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Arrangement",
            id,
        }))?;

    notify_owner(&state, user.owner_id).await;
    Ok(Json(StatusResponse::success("Arrangement updated successfully.")))
}

/// DELETE /api/arrangements/{id}
///
/// Removes the record and its stored mix, if any.
pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<StatusResponse>> {
    let arrangement = load_owned(&state, id, user.owner_id).await?;

    if !ArrangementRepo::delete(&state.pool, id).await? {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Arrangement",
            id,
        }));
    }
    if let Some(asset_ref) = &arrangement.asset_ref {
        if let Err(e) = state.blobs.delete(asset_ref).await {
            tracing::warn!(arrangement_id = id, blob = %asset_ref, error = %e, "Failed to delete arrangement blob");
        }
    }
    tracing::info!(arrangement_id = id, owner_id = user.owner_id, "Arrangement deleted");

    notify_owner(&state, user.owner_id).await;
    Ok(Json(StatusResponse::success("Arrangement deleted successfully.")))
}

/// GET /api/arrangements/{id}/file
///
/// The mixed WAV as an attachment named after the arrangement.
pub async fn download(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Response> {
    let arrangement = load_owned(&state, id, user.owner_id).await?;

    let asset_ref = arrangement
        .asset_ref
        .as_deref()
        .ok_or_else(|| AppError::NotFound("File not found".into()))?;
    let bytes = state
        .blobs
        .get(asset_ref)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".into()))?;

    let disposition = HeaderValue::from_str(&attachment_disposition(&arrangement.name))
        .map_err(|e| AppError::InternalError(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Upload {
    name: String,
    tags: String,
    bpm: f64,
    file: Bytes,
}

/// Reject a source recording the mixer could not decode, before any job
/// exists for it.
async fn check_source_audio(file: Bytes) -> AppResult<()> {
    tokio::task::spawn_blocking(move || harmonia_audio::validate_source(&file))
        .await
        .map_err(|e| AppError::InternalError(format!("Source check aborted: {e}")))?
        .map_err(|e| AppError::BadRequest(format!("file is not a usable WAV recording: {e}")))
}

/// Collect the create form's fields.
async fn read_upload(mut multipart: Multipart) -> AppResult<Upload> {
    let mut name = None;
    let mut tags = None;
    let mut bpm = None;
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                file = Some(data);
            }
            "name" | "tags" | "bpm" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                match field_name.as_str() {
                    "name" => name = Some(text),
                    "tags" => tags = Some(text),
                    _ => bpm = Some(text),
                }
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| AppError::BadRequest("No file part in the request".into()))?;
    let name = name.ok_or_else(|| missing("name"))?;
    let tags = tags.ok_or_else(|| missing("tags"))?;
    let bpm = bpm
        .ok_or_else(|| missing("bpm"))?
        .trim()
        .parse::<f64>()
        .map_err(|_| CoreError::Validation("bpm must be a number".into()))?;

    Ok(Upload {
        name,
        tags,
        bpm,
        file,
    })
}

fn missing(field: &str) -> AppError {
    AppError::BadRequest(format!("Missing form field '{field}'"))
}

/// Hand a job to the dispatcher; a refused job is marked FAILED.
///
/// Runs detached so the request does not wait for a free pool slot.
async fn dispatch(state: AppState, owner_id: OwnerId, job: JobRequest) {
    let id = job.arrangement_id;
    let err = match state.dispatcher.submit(job).await {
        Ok(()) => return,
        Err(e) => e,
    };
    tracing::warn!(arrangement_id = id, error = %err, "Arrangement job not dispatched");

    // A duplicate run of the same id is still in progress and will finish it.
    if matches!(err, DispatchError::AlreadyInFlight(_)) {
        return;
    }
    match ArrangementRepo::transition(&state.pool, id, ArrangementStatus::Failed, None).await {
        Ok(Some(_)) => notify_owner(&state, owner_id).await,
        Ok(None) => {}
        Err(e) => {
            tracing::error!(arrangement_id = id, error = %e, "Failed to mark undispatched arrangement as failed");
        }
    }
}

/// Load an arrangement, checking it belongs to `owner_id`.
async fn load_owned(state: &AppState, id: DbId, owner_id: OwnerId) -> AppResult<Arrangement> {
    let arrangement = ArrangementRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Arrangement",
            id,
        }))?;
    if arrangement.owner_id != owner_id {
        return Err(AppError::Core(CoreError::Forbidden("Access denied".into())));
    }
    Ok(arrangement)
}

async fn notify_owner(state: &AppState, owner_id: OwnerId) {
    state.hub.publish(owner_id, ChannelFrame::data_updated()).await;
}

/// Parse a comma-separated status filter; blank entries are ignored.
fn parse_statuses(raw: &str) -> AppResult<Vec<ArrangementStatus>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            ArrangementStatus::from_name(s)
                .ok_or_else(|| AppError::from(CoreError::Validation(format!("Unknown status '{s}'"))))
        })
        .collect()
}

fn page_count(total: i64, per_page: i64) -> i64 {
    if total <= 0 {
        0
    } else {
        (total + per_page - 1) / per_page
    }
}

/// Absolute list URL for `page`, carrying the active filters.
fn page_link(host_url: &str, page: i64, search_query: &str, status: &str) -> String {
    let base = format!("{host_url}/api/arrangements");
    let Ok(mut url) = reqwest::Url::parse(&base) else {
        return format!("{base}?page={page}");
    };
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("page", &page.to_string());
        if !search_query.is_empty() {
            pairs.append_pair("search_query", search_query);
        }
        if !status.is_empty() {
            pairs.append_pair("status", status);
        }
    }
    url.to_string()
}

/// `Content-Disposition` for a download named after the arrangement.
///
/// Carries an ASCII fallback `filename` and the exact UTF-8 name as
/// `filename*`.
fn attachment_disposition(name: &str) -> String {
    let file_name = format!("{name}.wav");
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut encoded = String::with_capacity(file_name.len() * 3);
    for byte in file_name.bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }

    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

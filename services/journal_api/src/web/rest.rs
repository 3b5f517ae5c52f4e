//! services/journal_api/src/web/rest.rs
//!
//! Contains the Axum handlers for the journal endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{
    auth::{self, AuthStatusResponse, CredentialsRequest, PasswordResetRequest, RefreshResponse},
    state::AppState,
};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::NaiveDate;
use mood_journal_core::{
    selectors::{in_date_range, mood_stats, with_mood_between, with_tag},
    AudioClip, Entry, EntryDraft, EntryId, InsightError, MonthKey, MoodScore, SettingsPatch,
    Tags, TrailingWindow,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::{IntoParams, OpenApi, ToSchema};

type HandlerError = (StatusCode, String);

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::status_handler,
        auth::refresh_handler,
        auth::verification_email_handler,
        auth::password_reset_handler,
        list_entries_handler,
        create_entry_handler,
        create_voice_entry_handler,
        get_entry_handler,
        delete_entry_handler,
        get_settings_handler,
        patch_settings_handler,
        list_moods_handler,
        put_mood_handler,
        stats_handler,
        list_eras_handler,
        generate_eras_handler,
        extend_eras_handler,
        toggle_era_handler,
        monthly_report_handler,
        get_notice_handler,
        dismiss_notice_handler,
    ),
    components(
        schemas(
            CredentialsRequest,
            PasswordResetRequest,
            AuthStatusResponse,
            RefreshResponse,
            CreateEntryRequest,
            EntryKindParam,
            SetMoodRequest,
            ErasGeneratedResponse,
            EraToggleResponse,
        )
    ),
    tags(
        (name = "Mood Journal API", description = "Local API over the journal store and the auth session.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EntryQuery {
    /// First calendar day (inclusive).
    pub from: Option<NaiveDate>,
    /// Last calendar day (inclusive).
    pub to: Option<NaiveDate>,
    pub tag: Option<String>,
    pub min_mood: Option<i64>,
    pub max_mood: Option<i64>,
}

#[derive(Deserialize, Clone, Copy, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntryKindParam {
    Text,
    Media,
}

/// A text or media entry. Voice entries are uploaded to `/entries/voice`.
#[derive(Deserialize, ToSchema)]
pub struct CreateEntryRequest {
    pub kind: EntryKindParam,
    pub content: String,
    /// Required for media entries.
    pub media_ref: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// A 1-5 override that skips mood classification.
    pub mood: Option<i64>,
}

#[derive(Deserialize, ToSchema)]
pub struct SetMoodRequest {
    pub score: i64,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatsQuery {
    /// `week` (7 days) or `month` (30 days).
    #[param(value_type = String)]
    pub window: TrailingWindow,
}

#[derive(Serialize, ToSchema)]
pub struct ErasGeneratedResponse {
    pub count: usize,
}

#[derive(Serialize, ToSchema)]
pub struct EraToggleResponse {
    pub expanded: bool,
}

fn bad_request(message: impl Into<String>) -> HandlerError {
    (StatusCode::BAD_REQUEST, message.into())
}

fn mood_score(value: i64) -> Result<MoodScore, HandlerError> {
    MoodScore::new(value).map_err(|e| bad_request(e.to_string()))
}

fn insight_error(e: InsightError) -> HandlerError {
    let code = match &e {
        InsightError::NotEnoughEntries { .. } | InsightError::NotEnoughNewEntries { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        InsightError::NoEras => StatusCode::CONFLICT,
        InsightError::NoEntriesForMonth(_) => StatusCode::NOT_FOUND,
        InsightError::Unavailable(_) => {
            error!("Insight generation failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    (code, e.to_string())
}

//=========================================================================================
// Entries
//=========================================================================================

/// List entries, newest first, with optional filters.
#[utoipa::path(
    get,
    path = "/entries",
    params(EntryQuery),
    responses(
        (status = 200, description = "Matching entries, newest first"),
        (status = 400, description = "Invalid mood bound"),
        (status = 401, description = "Signed out")
    )
)]
pub async fn list_entries_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EntryQuery>,
) -> Result<Json<Vec<Entry>>, HandlerError> {
    let mut entries = state.store().entries();

    if query.from.is_some() || query.to.is_some() {
        let from = query.from.unwrap_or(NaiveDate::MIN);
        let to = query.to.unwrap_or(NaiveDate::MAX);
        entries = in_date_range(&entries, from, to).into_iter().cloned().collect();
    }
    if let Some(tag) = &query.tag {
        entries = with_tag(&entries, tag).into_iter().cloned().collect();
    }
    if query.min_mood.is_some() || query.max_mood.is_some() {
        let min = mood_score(query.min_mood.unwrap_or(MoodScore::MIN as i64))?;
        let max = mood_score(query.max_mood.unwrap_or(MoodScore::MAX as i64))?;
        entries = with_mood_between(&entries, min, max)
            .into_iter()
            .cloned()
            .collect();
    }
    Ok(Json(entries))
}

/// Record a text or media entry. Classification failures never block the save.
#[utoipa::path(
    post,
    path = "/entries",
    request_body = CreateEntryRequest,
    responses(
        (status = 201, description = "The stored entry"),
        (status = 400, description = "Invalid mood or missing media reference")
    )
)]
pub async fn create_entry_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateEntryRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let mut draft = match (req.kind, req.media_ref) {
        (EntryKindParam::Text, None) => EntryDraft::text(req.content),
        (EntryKindParam::Media, Some(media_ref)) => EntryDraft::media(req.content, media_ref),
        (EntryKindParam::Text, Some(_)) => {
            return Err(bad_request("Text entries cannot carry a media reference"))
        }
        (EntryKindParam::Media, None) => {
            return Err(bad_request("Media entries need a media_ref"))
        }
    };
    draft = draft.with_tags(Tags::new(req.tags));
    if let Some(mood) = req.mood {
        draft = draft.with_mood(mood_score(mood)?);
    }

    let entry = state.journal.record(draft).await;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Upload a voice note and record its transcript.
///
/// Multipart fields: `audio` (file), `media_ref` (text), optional `tags`
/// (comma separated) and `sample_rate` (present only for raw PCM16 uploads).
#[utoipa::path(
    post,
    path = "/entries/voice",
    request_body(content_type = "multipart/form-data", description = "The recorded audio."),
    responses(
        (status = 201, description = "The stored entry"),
        (status = 400, description = "Missing audio or media reference")
    )
)]
pub async fn create_voice_entry_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    let mut audio: Option<(String, Vec<u8>)> = None;
    let mut media_ref: Option<String> = None;
    let mut tags = Tags::default();
    let mut sample_rate: Option<u32> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Failed to read multipart data: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio" => {
                let file_name = field.file_name().unwrap_or("voice_note.m4a").to_string();
                let data = field.bytes().await.map_err(|e| {
                    bad_request(format!("Failed to read audio bytes: {}", e))
                })?;
                audio = Some((file_name, data.to_vec()));
            }
            "media_ref" | "tags" | "sample_rate" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("Failed to read field {}: {}", name, e)))?;
                match name.as_str() {
                    "media_ref" => media_ref = Some(text),
                    "tags" => tags = Tags::new(text.split(',')),
                    _ => {
                        sample_rate = Some(text.trim().parse().map_err(|_| {
                            bad_request(format!("Invalid sample_rate '{}'", text))
                        })?)
                    }
                }
            }
            other => warn!("Ignoring unknown multipart field '{}'", other),
        }
    }

    let (file_name, bytes) = audio.ok_or_else(|| bad_request("Multipart form must include audio"))?;
    let media_ref = media_ref.ok_or_else(|| bad_request("Multipart form must include media_ref"))?;
    let clip = match sample_rate {
        Some(sample_rate) => AudioClip::Pcm16 {
            sample_rate,
            data: bytes,
        },
        None => AudioClip::Encoded { file_name, bytes },
    };

    let entry = state.journal.record_voice(&clip, media_ref, tags).await;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Fetch one entry.
#[utoipa::path(
    get,
    path = "/entries/{id}",
    params(("id" = String, Path, description = "Entry id (UUID)")),
    responses(
        (status = 200, description = "The entry"),
        (status = 404, description = "No entry with this id")
    )
)]
pub async fn get_entry_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntryId>,
) -> Result<Json<Entry>, HandlerError> {
    state
        .store()
        .entry(id)
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Entry {} not found", id)))
}

/// Delete an entry. Deleting an unknown id is not an error.
#[utoipa::path(
    delete,
    path = "/entries/{id}",
    params(("id" = String, Path, description = "Entry id (UUID)")),
    responses((status = 204, description = "Entry removed or already absent"))
)]
pub async fn delete_entry_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntryId>,
) -> StatusCode {
    state.store().remove_entry(id);
    StatusCode::NO_CONTENT
}

//=========================================================================================
// Settings & Moods
//=========================================================================================

#[utoipa::path(
    get,
    path = "/settings",
    responses((status = 200, description = "Current settings"))
)]
pub async fn get_settings_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store().settings())
}

/// Shallow-merge the given fields into the settings.
#[utoipa::path(
    patch,
    path = "/settings",
    request_body(content = String, content_type = "application/json",
        description = "Any of `reminders_on`, `reminder_time` (HH:MM), `theme` (light, dark, system)."),
    responses(
        (status = 200, description = "Settings after the merge"),
        (status = 422, description = "Invalid field value")
    )
)]
pub async fn patch_settings_handler(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<SettingsPatch>,
) -> impl IntoResponse {
    Json(state.store().set_settings(patch))
}

/// Daily mood samples, oldest first.
#[utoipa::path(
    get,
    path = "/moods",
    responses((status = 200, description = "One sample per day"))
)]
pub async fn list_moods_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store().moods())
}

/// Set the mood sample for one day directly.
#[utoipa::path(
    put,
    path = "/moods/{date}",
    params(("date" = String, Path, description = "Calendar day, YYYY-MM-DD")),
    request_body = SetMoodRequest,
    responses(
        (status = 204, description = "Sample stored"),
        (status = 400, description = "Score outside 1-5")
    )
)]
pub async fn put_mood_handler(
    State(state): State<Arc<AppState>>,
    Path(date): Path<NaiveDate>,
    Json(req): Json<SetMoodRequest>,
) -> Result<StatusCode, HandlerError> {
    state.store().set_mood(date, mood_score(req.score)?);
    Ok(StatusCode::NO_CONTENT)
}

/// Mean, min and max mood over a trailing window. `null` when nothing is scored.
#[utoipa::path(
    get,
    path = "/stats",
    params(StatsQuery),
    responses((status = 200, description = "Mood statistics or null"))
)]
pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> impl IntoResponse {
    let stats = state
        .store()
        .read(|s| mood_stats(s.entries(), query.window, chrono::Utc::now()));
    Json(stats)
}

//=========================================================================================
// Eras
//=========================================================================================

#[utoipa::path(
    get,
    path = "/eras",
    responses((status = 200, description = "Stored eras, newest generation first"))
)]
pub async fn list_eras_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store().eras())
}

/// Regenerate all eras from the whole journal.
#[utoipa::path(
    post,
    path = "/eras/generate",
    responses(
        (status = 200, description = "Eras replaced", body = ErasGeneratedResponse),
        (status = 422, description = "Not enough (new) entries yet"),
        (status = 503, description = "Segmentation unavailable")
    )
)]
pub async fn generate_eras_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ErasGeneratedResponse>, HandlerError> {
    let count = state.journal.generate_eras().await.map_err(insight_error)?;
    Ok(Json(ErasGeneratedResponse { count }))
}

/// Segment only the entries written since the last generation and prepend them.
#[utoipa::path(
    post,
    path = "/eras/extend",
    responses(
        (status = 200, description = "Eras prepended", body = ErasGeneratedResponse),
        (status = 409, description = "No eras to extend"),
        (status = 422, description = "Not enough new entries yet"),
        (status = 503, description = "Segmentation unavailable")
    )
)]
pub async fn extend_eras_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ErasGeneratedResponse>, HandlerError> {
    let count = state.journal.extend_eras().await.map_err(insight_error)?;
    Ok(Json(ErasGeneratedResponse { count }))
}

#[utoipa::path(
    post,
    path = "/eras/{index}/toggle",
    params(("index" = usize, Path, description = "Position in the era list")),
    responses(
        (status = 200, description = "New expanded flag", body = EraToggleResponse),
        (status = 404, description = "Index out of range")
    )
)]
pub async fn toggle_era_handler(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Result<Json<EraToggleResponse>, HandlerError> {
    state
        .store()
        .toggle_era_expanded(index)
        .map(|expanded| Json(EraToggleResponse { expanded }))
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("No era at index {}", index)))
}

//=========================================================================================
// Reports & Notices
//=========================================================================================

/// The monthly check-up, generated on first request and cached afterwards.
#[utoipa::path(
    get,
    path = "/reports/{month}",
    params(("month" = String, Path, description = "Month, YYYY-MM")),
    responses(
        (status = 200, description = "The report"),
        (status = 404, description = "No entries that month"),
        (status = 503, description = "Report generation unavailable")
    )
)]
pub async fn monthly_report_handler(
    State(state): State<Arc<AppState>>,
    Path(month): Path<MonthKey>,
) -> Result<impl IntoResponse, HandlerError> {
    let report = state
        .journal
        .monthly_report(month)
        .await
        .map_err(insight_error)?;
    Ok(Json(report))
}

/// The latest undismissed notice, or `null`.
#[utoipa::path(
    get,
    path = "/notices",
    responses((status = 200, description = "Latest notice or null"))
)]
pub async fn get_notice_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store().latest_notice())
}

#[utoipa::path(
    delete,
    path = "/notices",
    responses((status = 204, description = "Notice dismissed"))
)]
pub async fn dismiss_notice_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    state.store().dismiss_notice();
    StatusCode::NO_CONTENT
}


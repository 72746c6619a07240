use std::cmp;
use std::path::PathBuf;
use std::str::FromStr;

use axum::Json;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::*;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{instrument, warn};

use crate::entity::{company_profile, measurement, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::imaging;
use crate::models::measurement::{
    CreateMeasurementResponse, MeasurementListQuery, MeasurementListResponse, MeasurementResponse,
};
use crate::models::shared::Pagination;
use crate::state::AppState;
use crate::storage::MediaStorage;

/// Body limit for measurement uploads: photo cap plus headroom for the
/// multipart framing and text fields.
pub fn measurement_body_limit(max_photo_size: u64) -> DefaultBodyLimit {
    DefaultBodyLimit::max(max_photo_size as usize + 64 * 1024)
}

/// Check the per-user submission interval.
///
/// Optimistic (non-locking): two submissions racing within the same interval
/// may both pass, which is an accepted trade-off against locking on every
/// upload.
async fn check_submission_interval(
    db: &DatabaseConnection,
    user_id: i32,
    interval_secs: u64,
) -> Result<(), AppError> {
    if interval_secs == 0 {
        return Ok(()); // Rate limiting disabled
    }

    let window_start = Utc::now() - Duration::seconds(interval_secs as i64);

    let latest = measurement::Entity::find()
        .filter(measurement::Column::UserId.eq(user_id))
        .filter(measurement::Column::CreatedAt.gt(window_start))
        .order_by_desc(measurement::Column::CreatedAt)
        .one(db)
        .await?;

    if let Some(latest) = latest {
        let expires = latest.created_at + Duration::seconds(interval_secs as i64);
        let retry_after = cmp::max((expires - Utc::now()).num_seconds(), 1) as u64;
        return Err(AppError::RateLimited { retry_after });
    }

    Ok(())
}

/// Parsed multipart payload for a measurement upload.
struct UploadPayload {
    value: Decimal,
    observation: Option<String>,
    /// Temp file holding the raw uploaded photo, when one was sent.
    photo_temp: Option<PathBuf>,
}

/// Read the multipart form, streaming the photo to a temp file with a size cap.
/// The temp file is cleaned up when parsing fails.
async fn read_upload(
    multipart: Multipart,
    storage: &MediaStorage,
    user_id: i32,
    max_photo_size: u64,
) -> Result<UploadPayload, AppError> {
    let mut photo_temp: Option<PathBuf> = None;

    match parse_upload_fields(multipart, storage, user_id, max_photo_size, &mut photo_temp).await {
        Ok((value, observation)) => Ok(UploadPayload {
            value,
            observation,
            photo_temp,
        }),
        Err(e) => {
            if let Some(temp) = &photo_temp {
                let _ = tokio::fs::remove_file(temp).await;
            }
            Err(e)
        }
    }
}

async fn parse_upload_fields(
    mut multipart: Multipart,
    storage: &MediaStorage,
    user_id: i32,
    max_photo_size: u64,
    photo_temp: &mut Option<PathBuf>,
) -> Result<(Decimal, Option<String>), AppError> {
    let mut raw_value: Option<String> = None;
    let mut observation: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        match field.name() {
            Some("value") => {
                raw_value = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::Validation(format!("Failed to read value: {e}")))?,
                );
            }
            Some("observation") => {
                let text = field.text().await.map_err(|e| {
                    AppError::Validation(format!("Failed to read observation: {e}"))
                })?;
                observation = Some(text).filter(|t| !t.trim().is_empty());
            }
            Some("photo") => {
                let temp = storage.temp_path(user_id);
                stream_field_to_file(field, &temp, max_photo_size).await?;
                *photo_temp = Some(temp);
            }
            _ => {} // Ignore unknown fields.
        }
    }

    let raw_value = raw_value.ok_or_else(|| AppError::Validation("Missing 'value' field".into()))?;
    let value = Decimal::from_str(raw_value.trim())
        .map_err(|_| AppError::Validation("Flow value must be a decimal number".into()))?;
    if value.is_sign_negative() {
        return Err(AppError::Validation("Flow value must not be negative".into()));
    }

    Ok((value.round_dp(2), observation))
}

/// Stream a multipart field to a file, enforcing `max_size`.
async fn stream_field_to_file(
    mut field: axum::extract::multipart::Field<'_>,
    path: &std::path::Path,
    max_size: u64,
) -> Result<(), AppError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create temp file: {e}")))?;

    let mut total_size: u64 = 0;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::Validation(format!("Upload read error: {e}")))?
    {
        total_size += chunk.len() as u64;
        if total_size > max_size {
            return Err(AppError::Validation(format!(
                "Photo exceeds maximum size of {max_size} bytes"
            )));
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| AppError::Internal(format!("Temp file write failed: {e}")))?;
    }

    file.flush()
        .await
        .map_err(|e| AppError::Internal(format!("Temp file flush failed: {e}")))?;

    Ok(())
}

/// Extract EXIF metadata and store the compressed photo, updating the row.
async fn finalize_photo(
    state: &AppState,
    row: measurement::Model,
    temp: &std::path::Path,
) -> Result<measurement::Model, AppError> {
    let bytes = tokio::fs::read(temp)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read uploaded photo: {e}")))?;

    let metadata = imaging::extract_exif_metadata(&bytes);

    let captured_at = match metadata.captured_at {
        Some(ts) if ts > Utc::now() => {
            warn!(measurement_id = row.id, captured_at = %ts, "Discarding future EXIF timestamp");
            None
        }
        other => other,
    };

    let max_dimension = state.config.upload.photo_max_dimension;
    let quality = state.config.upload.photo_jpeg_quality;
    let stored_bytes = tokio::task::spawn_blocking(move || {
        imaging::compress_photo(&bytes, max_dimension, quality).unwrap_or(bytes)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Photo compression task failed: {e}")))?;

    let rel_path = MediaStorage::evidence_path(row.user_id.unwrap_or(0), row.created_at);
    state
        .storage
        .write(&rel_path, &stored_bytes)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store photo: {e}")))?;

    let mut active: measurement::ActiveModel = row.into();
    active.photo_path = Set(Some(rel_path.clone()));
    active.captured_at = Set(captured_at);
    active.captured_latitude = Set(metadata.latitude);
    active.captured_longitude = Set(metadata.longitude);
    match active.update(&state.db).await {
        Ok(updated) => Ok(updated),
        Err(e) => {
            // The caller rolls the row back; the stored file must go too.
            state.storage.remove(&rel_path).await;
            Err(e.into())
        }
    }
}

/// Submit a flow-meter reading.
#[utoipa::path(
    post,
    path = "/",
    tag = "Measurements",
    operation_id = "createMeasurement",
    summary = "Submit a flow-meter reading",
    description = "Multipart form with a `value` field (decimal, m³/h), an optional \
        `observation` text field, and an optional `photo` file. GPS coordinates and the \
        capture timestamp are extracted from the photo's EXIF metadata and the photo is \
        recompressed before storage. Requires `measurement:submit` permission.",
    request_body(content_type = "multipart/form-data", description = "Reading with evidence photo"),
    responses(
        (status = 201, description = "Measurement created", body = CreateMeasurementResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 429, description = "Submitted too soon after the previous reading (RATE_LIMITED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(user_id = auth_user.user_id))]
pub async fn create_measurement(
    auth_user: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("measurement:submit")?;

    let payload = read_upload(
        multipart,
        &state.storage,
        auth_user.user_id,
        state.config.storage.max_photo_size,
    )
    .await?;

    let result = create_from_payload(&state, &auth_user, &payload).await;

    // The temp file never outlives the request, whatever the outcome.
    if let Some(temp) = &payload.photo_temp {
        let _ = tokio::fs::remove_file(temp).await;
    }

    let (model, warning) = result?;

    let response = CreateMeasurementResponse {
        measurement: MeasurementResponse::from_model(model, Some(auth_user.username.clone())),
        warning,
    };

    Ok((StatusCode::CREATED, Json(response)))
}

async fn create_from_payload(
    state: &AppState,
    auth_user: &AuthUser,
    payload: &UploadPayload,
) -> Result<(measurement::Model, Option<String>), AppError> {
    check_submission_interval(
        &state.db,
        auth_user.user_id,
        state.config.upload.min_submission_interval_secs,
    )
    .await?;

    let profile = company_profile::Entity::find()
        .filter(company_profile::Column::UserId.eq(auth_user.user_id))
        .one(&state.db)
        .await?;

    let manual_location = profile
        .as_ref()
        .and_then(|p| p.location.clone())
        .unwrap_or_else(|| format!("Ubicación de {}", auth_user.username));

    let (target_latitude, target_longitude) = profile
        .as_ref()
        .and_then(|p| p.latitude.zip(p.longitude))
        .map_or((None, None), |(lat, lon)| (Some(lat), Some(lon)));

    let warning = regression_warning(&state.db, auth_user.user_id, payload.value).await?;

    let row = measurement::ActiveModel {
        user_id: Set(Some(auth_user.user_id)),
        value: Set(payload.value),
        manual_location: Set(Some(manual_location)),
        observation: Set(payload.observation.clone()),
        target_latitude: Set(target_latitude),
        target_longitude: Set(target_longitude),
        is_valid: Set(false),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    let model = if let Some(temp) = &payload.photo_temp {
        match finalize_photo(state, row.clone(), temp).await {
            Ok(updated) => updated,
            Err(e) => {
                // Keep the row and the photo consistent: no photo, no row.
                let _ = measurement::Entity::delete_by_id(row.id).exec(&state.db).await;
                return Err(e);
            }
        }
    } else {
        row
    };

    Ok((model, warning))
}

/// Compare the new value against the submitter's last validated reading.
/// A drop is flagged but never rejected; field flow genuinely fluctuates.
async fn regression_warning(
    db: &DatabaseConnection,
    user_id: i32,
    value: Decimal,
) -> Result<Option<String>, AppError> {
    let last_validated = measurement::Entity::find()
        .filter(measurement::Column::UserId.eq(user_id))
        .filter(measurement::Column::IsValid.eq(true))
        .order_by_desc(measurement::Column::CreatedAt)
        .one(db)
        .await?;

    Ok(last_validated.filter(|m| value < m.value).map(|m| {
        format!(
            "El valor {} es menor que la última lectura validada ({})",
            value, m.value
        )
    }))
}

/// List measurements.
#[utoipa::path(
    get,
    path = "/",
    tag = "Measurements",
    operation_id = "listMeasurements",
    summary = "List measurements",
    description = "Paginated, newest first. Users see their own readings; users with \
        `measurement:view_all` permission see every user's and may filter by `user_id`.",
    params(MeasurementListQuery),
    responses(
        (status = 200, description = "List of measurements", body = MeasurementListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query))]
pub async fn list_measurements(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<MeasurementListQuery>,
) -> Result<Json<MeasurementListResponse>, AppError> {
    let can_view_all = auth_user.has_permission("measurement:view_all");

    let page = cmp::max(query.page.unwrap_or(1), 1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);

    let mut base_select = measurement::Entity::find();

    if !can_view_all {
        base_select = base_select.filter(measurement::Column::UserId.eq(auth_user.user_id));
    } else if let Some(uid) = query.user_id {
        base_select = base_select.filter(measurement::Column::UserId.eq(uid));
    }

    let total = base_select.clone().count(&state.db).await?;

    let rows = base_select
        .find_also_related(user::Entity)
        .order_by_desc(measurement::Column::CreatedAt)
        .offset(Some((page - 1) * per_page))
        .limit(Some(per_page))
        .all(&state.db)
        .await?;

    let data = rows
        .into_iter()
        .map(|(m, u)| MeasurementResponse::from_model(m, u.map(|u| u.username)))
        .collect();

    let total_pages = total.div_ceil(per_page);

    Ok(Json(MeasurementListResponse {
        data,
        pagination: Pagination {
            page,
            per_page,
            total,
            total_pages,
        },
    }))
}

/// Download the evidence photo for a measurement.
#[utoipa::path(
    get,
    path = "/{id}/photo",
    tag = "Measurements",
    operation_id = "downloadMeasurementPhoto",
    summary = "Download a measurement's evidence photo",
    description = "Streams the stored JPEG. Supports ETag-based caching via If-None-Match. \
        Owners and users with `measurement:view_all` permission only.",
    params(("id" = i32, Path, description = "Measurement ID")),
    responses(
        (status = 200, description = "Photo content"),
        (status = 304, description = "Not Modified (ETag match)"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Measurement or photo not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, headers), fields(measurement_id = %id))]
pub async fn download_photo(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let row = measurement::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Measurement not found".into()))?;

    let is_owner = row.user_id == Some(auth_user.user_id);
    if !is_owner && !auth_user.has_permission("measurement:view_all") {
        return Err(AppError::NotFound("Measurement not found".into())); // Prevent enumeration
    }

    let photo_path = row
        .photo_path
        .as_deref()
        .ok_or_else(|| AppError::NotFound("Measurement has no photo".into()))?;

    // Stored paths embed a UUID, so the path itself is a stable ETag.
    let etag_value = format!("\"{}\"", photo_path);
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH)
        && let Ok(val) = if_none_match.to_str()
        && (val == etag_value || val == "*")
    {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let abs = state.storage.absolute(photo_path);
    let file = tokio::fs::File::open(&abs)
        .await
        .map_err(|_| AppError::NotFound("Photo file missing from storage".into()))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to stat photo: {e}")))?
        .len();

    let body = Body::from_stream(ReaderStream::new(file));

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/jpeg")
        .header(header::CONTENT_LENGTH, size.to_string())
        .header(header::ETAG, &etag_value)
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))?;

    Ok(response)
}

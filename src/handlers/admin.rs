use std::collections::HashMap;

use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::prelude::DateTimeUtc;
use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::*;
use tracing::{info, instrument};

use crate::entity::{company_profile, measurement, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::imaging;
use crate::models::admin::{
    ChartPoint, CompanyDossierResponse, CompanyStats, CompanySummary, CreateUserRequest,
    ProfileResponse, UpdateProfileRequest, UpdateUserRequest, UserSummary,
    validate_create_user_request, validate_update_profile_request, validate_update_user_request,
};
use crate::state::AppState;
use crate::storage::MediaStorage;
use crate::utils::hash;

async fn find_user<C: ConnectionTrait>(db: &C, id: i32) -> Result<user::Model, AppError> {
    user::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

/// Latest measurement timestamp per user, for annotating listings.
async fn latest_measurement_times(
    db: &DatabaseConnection,
) -> Result<HashMap<i32, DateTimeUtc>, AppError> {
    let rows: Vec<(Option<i32>, Option<DateTimeUtc>)> = measurement::Entity::find()
        .select_only()
        .column(measurement::Column::UserId)
        .column_as(measurement::Column::CreatedAt.max(), "latest")
        .filter(measurement::Column::UserId.is_not_null())
        .group_by(measurement::Column::UserId)
        .into_tuple()
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(uid, latest)| uid.zip(latest))
        .collect())
}

/// List all user accounts.
#[utoipa::path(
    get,
    path = "/users",
    tag = "Admin",
    operation_id = "listUsers",
    summary = "List user accounts",
    description = "Every account with its role and latest measurement time. Requires \
        `user:list` permission.",
    responses(
        (status = 200, description = "User list", body = Vec<UserSummary>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn list_users(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    auth_user.require_permission("user:list")?;

    let users = user::Entity::find()
        .order_by_asc(user::Column::Id)
        .all(&state.db)
        .await?;

    let latest = latest_measurement_times(&state.db).await?;

    let summaries = users
        .into_iter()
        .map(|u| UserSummary {
            latest_measurement_at: latest.get(&u.id).copied(),
            id: u.id,
            username: u.username,
            email: u.email,
            role: u.role,
            created_at: u.created_at,
        })
        .collect();

    Ok(Json(summaries))
}

/// Create a staff or operator account.
#[utoipa::path(
    post,
    path = "/users",
    tag = "Admin",
    operation_id = "createUser",
    summary = "Create a user account",
    description = "Creates an account with the `staff` or `operator` role. Requires \
        `user:manage` permission.",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserSummary),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 409, description = "Username taken (USERNAME_TAKEN)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(username = %payload.username))]
pub async fn create_user(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("user:manage")?;
    validate_create_user_request(&payload)?;

    let password_hash = hash::hash_password(&payload.password)
        .map_err(|e| AppError::Internal(format!("Password hash error: {}", e)))?;

    let created = user::ActiveModel {
        username: Set(payload.username.trim().to_string()),
        password: Set(password_hash),
        email: Set(payload.email.filter(|e| !e.trim().is_empty())),
        role: Set(payload.role),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(|e| match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::UsernameTaken,
        _ => AppError::from(e),
    })?;

    info!(user_id = created.id, role = %created.role, "User created by admin");

    Ok((
        StatusCode::CREATED,
        Json(UserSummary {
            id: created.id,
            username: created.username,
            email: created.email,
            role: created.role,
            created_at: created.created_at,
            latest_measurement_at: None,
        }),
    ))
}

/// Update a user account.
#[utoipa::path(
    patch,
    path = "/users/{id}",
    tag = "Admin",
    operation_id = "updateUser",
    summary = "Update a user account",
    description = "Changes username, email, password, or role. Admin accounts cannot be \
        modified through this endpoint. Requires `user:manage` permission.",
    params(("id" = i32, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserSummary),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "User not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Admin account or username taken (CONFLICT, USERNAME_TAKEN)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = %id))]
pub async fn update_user(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateUserRequest>,
) -> Result<Json<UserSummary>, AppError> {
    auth_user.require_permission("user:manage")?;
    validate_update_user_request(&payload)?;

    let target = find_user(&state.db, id).await?;
    if target.role == "admin" {
        return Err(AppError::Conflict("Admin accounts cannot be modified".into()));
    }

    let mut active: user::ActiveModel = target.into();
    if let Some(username) = payload.username {
        active.username = Set(username.trim().to_string());
    }
    if let Some(password) = payload.password {
        let password_hash = hash::hash_password(&password)
            .map_err(|e| AppError::Internal(format!("Password hash error: {}", e)))?;
        active.password = Set(password_hash);
    }
    if let Some(email) = payload.email {
        active.email = Set(Some(email).filter(|e| !e.trim().is_empty()));
    }
    if let Some(role) = payload.role {
        active.role = Set(role);
    }

    let updated = active.update(&state.db).await.map_err(|e| match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::UsernameTaken,
        _ => AppError::from(e),
    })?;

    let latest = measurement::Entity::find()
        .filter(measurement::Column::UserId.eq(updated.id))
        .order_by_desc(measurement::Column::CreatedAt)
        .one(&state.db)
        .await?
        .map(|m| m.created_at);

    Ok(Json(UserSummary {
        id: updated.id,
        username: updated.username,
        email: updated.email,
        role: updated.role,
        created_at: updated.created_at,
        latest_measurement_at: latest,
    }))
}

/// Delete a user account.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "Admin",
    operation_id = "deleteUser",
    summary = "Delete a user account",
    description = "Deletes the account and its company profile. The user's measurements \
        are kept with a NULL submitter. Admin accounts cannot be deleted. Requires \
        `user:manage` permission.",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "User not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Admin account (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = %id))]
pub async fn delete_user(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("user:manage")?;

    let target = find_user(&state.db, id).await?;
    if target.role == "admin" {
        return Err(AppError::Conflict("Admin accounts cannot be deleted".into()));
    }

    let txn = state.db.begin().await?;

    // Readings are audit data and outlive the account.
    measurement::Entity::update_many()
        .col_expr(measurement::Column::UserId, Expr::value(Option::<i32>::None))
        .filter(measurement::Column::UserId.eq(id))
        .exec(&txn)
        .await?;

    company_profile::Entity::delete_many()
        .filter(company_profile::Column::UserId.eq(id))
        .exec(&txn)
        .await?;

    user::Entity::delete_by_id(id).exec(&txn).await?;

    txn.commit().await?;

    info!(user_id = id, username = %target.username, "User deleted");

    Ok(StatusCode::NO_CONTENT)
}

fn profile_response(u: &user::Model, profile: Option<&company_profile::Model>) -> ProfileResponse {
    ProfileResponse {
        user_id: u.id,
        username: u.username.clone(),
        location: profile.and_then(|p| p.location.clone()),
        description: profile.and_then(|p| p.description.clone()),
        latitude: profile.and_then(|p| p.latitude),
        longitude: profile.and_then(|p| p.longitude),
        has_icon: profile.is_some_and(|p| p.icon_path.is_some()),
        updated_at: profile.map(|p| p.updated_at),
    }
}

/// List operator companies.
#[utoipa::path(
    get,
    path = "/companies",
    tag = "Admin",
    operation_id = "listCompanies",
    summary = "List operator companies",
    description = "Operator accounts with profile location and submission activity. \
        Requires `user:list` permission.",
    responses(
        (status = 200, description = "Company list", body = Vec<CompanySummary>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn list_companies(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<CompanySummary>>, AppError> {
    auth_user.require_permission("user:list")?;

    let operators = user::Entity::find()
        .filter(user::Column::Role.eq("operator"))
        .order_by_asc(user::Column::Username)
        .all(&state.db)
        .await?;

    let profiles: HashMap<i32, company_profile::Model> = company_profile::Entity::find()
        .all(&state.db)
        .await?
        .into_iter()
        .map(|p| (p.user_id, p))
        .collect();

    let counts: Vec<(Option<i32>, i64)> = measurement::Entity::find()
        .select_only()
        .column(measurement::Column::UserId)
        .column_as(measurement::Column::Id.count(), "count")
        .filter(measurement::Column::UserId.is_not_null())
        .group_by(measurement::Column::UserId)
        .into_tuple()
        .all(&state.db)
        .await?;
    let counts: HashMap<i32, u64> = counts
        .into_iter()
        .filter_map(|(uid, count)| uid.map(|uid| (uid, Ord::max(count, 0) as u64)))
        .collect();

    let latest = latest_measurement_times(&state.db).await?;

    let summaries = operators
        .into_iter()
        .map(|u| {
            let profile = profiles.get(&u.id);
            CompanySummary {
                user_id: u.id,
                location: profile.and_then(|p| p.location.clone()),
                latitude: profile.and_then(|p| p.latitude),
                longitude: profile.and_then(|p| p.longitude),
                has_icon: profile.is_some_and(|p| p.icon_path.is_some()),
                measurement_count: counts.get(&u.id).copied().unwrap_or(0),
                latest_measurement_at: latest.get(&u.id).copied(),
                username: u.username,
            }
        })
        .collect();

    Ok(Json(summaries))
}

/// Per-company dossier with aggregate statistics and chart data.
#[utoipa::path(
    get,
    path = "/companies/{id}/dossier",
    tag = "Admin",
    operation_id = "companyDossier",
    summary = "Company dossier",
    description = "Profile, aggregate reading statistics, and the last 20 readings in \
        chronological order. Requires `measurement:view_all` permission.",
    params(("id" = i32, Path, description = "Company user ID")),
    responses(
        (status = 200, description = "Company dossier", body = CompanyDossierResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "User not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(company_id = %id))]
pub async fn company_dossier(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<CompanyDossierResponse>, AppError> {
    auth_user.require_permission("measurement:view_all")?;

    let target = find_user(&state.db, id).await?;

    let profile = company_profile::Entity::find()
        .filter(company_profile::Column::UserId.eq(id))
        .one(&state.db)
        .await?;

    let total = measurement::Entity::find()
        .filter(measurement::Column::UserId.eq(id))
        .count(&state.db)
        .await?;
    let validated = measurement::Entity::find()
        .filter(measurement::Column::UserId.eq(id))
        .filter(measurement::Column::IsValid.eq(true))
        .count(&state.db)
        .await?;

    #[derive(FromQueryResult)]
    struct AggRow {
        avg_value: Option<Decimal>,
        min_value: Option<Decimal>,
        max_value: Option<Decimal>,
        first_at: Option<DateTimeUtc>,
        last_at: Option<DateTimeUtc>,
    }

    let agg = measurement::Entity::find()
        .select_only()
        .column_as(
            SimpleExpr::from(Func::avg(Expr::col(measurement::Column::Value))),
            "avg_value",
        )
        .column_as(measurement::Column::Value.min(), "min_value")
        .column_as(measurement::Column::Value.max(), "max_value")
        .column_as(measurement::Column::CreatedAt.min(), "first_at")
        .column_as(measurement::Column::CreatedAt.max(), "last_at")
        .filter(measurement::Column::UserId.eq(id))
        .into_model::<AggRow>()
        .one(&state.db)
        .await?;

    let validated_pct = if total > 0 {
        (validated as f64 / total as f64 * 10_000.0).round() / 100.0
    } else {
        0.0
    };

    let stats = match agg {
        Some(agg) => CompanyStats {
            total,
            validated,
            pending: total - validated,
            validated_pct,
            avg_value: agg.avg_value.map(|v| v.round_dp(2)),
            min_value: agg.min_value,
            max_value: agg.max_value,
            first_measurement_at: agg.first_at,
            last_measurement_at: agg.last_at,
        },
        None => CompanyStats {
            total,
            validated,
            pending: total - validated,
            validated_pct,
            avg_value: None,
            min_value: None,
            max_value: None,
            first_measurement_at: None,
            last_measurement_at: None,
        },
    };

    let mut recent = measurement::Entity::find()
        .filter(measurement::Column::UserId.eq(id))
        .order_by_desc(measurement::Column::CreatedAt)
        .limit(20)
        .all(&state.db)
        .await?;
    recent.reverse();

    let chart = recent
        .into_iter()
        .map(|m| ChartPoint {
            created_at: m.created_at,
            value: m.value,
            is_valid: m.is_valid,
        })
        .collect();

    Ok(Json(CompanyDossierResponse {
        profile: profile_response(&target, profile.as_ref()),
        stats,
        chart,
    }))
}

/// Fetch a user's profile, creating an empty one if missing.
async fn get_or_create_profile(
    db: &DatabaseConnection,
    user_id: i32,
) -> Result<company_profile::Model, AppError> {
    if let Some(profile) = company_profile::Entity::find()
        .filter(company_profile::Column::UserId.eq(user_id))
        .one(db)
        .await?
    {
        return Ok(profile);
    }

    let now = Utc::now();
    let created = company_profile::ActiveModel {
        user_id: Set(user_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(created)
}

/// Edit a company profile.
#[utoipa::path(
    patch,
    path = "/companies/{id}/profile",
    tag = "Admin",
    operation_id = "updateCompanyProfile",
    summary = "Edit a company profile",
    description = "Updates location, description, or well coordinates. Coordinates must \
        come as a pair and (0, 0) is rejected. The profile is created on first edit. \
        Requires `profile:edit` permission.",
    params(("id" = i32, Path, description = "Company user ID")),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = ProfileResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "User not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(company_id = %id))]
pub async fn update_company_profile(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    auth_user.require_permission("profile:edit")?;
    validate_update_profile_request(&payload)?;

    let target = find_user(&state.db, id).await?;
    let profile = get_or_create_profile(&state.db, id).await?;

    let mut active: company_profile::ActiveModel = profile.into();
    if let Some(location) = payload.location {
        active.location = Set(Some(location).filter(|l| !l.trim().is_empty()));
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description).filter(|d| !d.trim().is_empty()));
    }
    if let (Some(lat), Some(lon)) = (payload.latitude, payload.longitude) {
        active.latitude = Set(Some(lat));
        active.longitude = Set(Some(lon));
    }
    active.updated_at = Set(Utc::now());

    let updated = active.update(&state.db).await?;

    Ok(Json(profile_response(&target, Some(&updated))))
}

/// Upload a company profile icon.
#[utoipa::path(
    post,
    path = "/companies/{id}/icon",
    tag = "Admin",
    operation_id = "uploadCompanyIcon",
    summary = "Upload a company icon",
    description = "Multipart form with an `icon` image field. The image is recompressed \
        like evidence photos. Requires `profile:edit` permission.",
    params(("id" = i32, Path, description = "Company user ID")),
    request_body(content_type = "multipart/form-data", description = "Icon image upload"),
    responses(
        (status = 200, description = "Icon stored", body = ProfileResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "User not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(company_id = %id))]
pub async fn upload_company_icon(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    mut multipart: Multipart,
) -> Result<Json<ProfileResponse>, AppError> {
    auth_user.require_permission("profile:edit")?;

    let target = find_user(&state.db, id).await?;
    let profile = get_or_create_profile(&state.db, id).await?;

    let mut icon_bytes: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        if field.name() == Some("icon") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Upload read error: {e}")))?;
            if bytes.len() as u64 > state.config.storage.max_photo_size {
                return Err(AppError::Validation(format!(
                    "Icon exceeds maximum size of {} bytes",
                    state.config.storage.max_photo_size
                )));
            }
            icon_bytes = Some(bytes.to_vec());
        }
    }
    let icon_bytes =
        icon_bytes.ok_or_else(|| AppError::Validation("Missing 'icon' field".into()))?;

    let max_dimension = state.config.upload.photo_max_dimension;
    let quality = state.config.upload.photo_jpeg_quality;
    let stored = tokio::task::spawn_blocking(move || {
        imaging::compress_photo(&icon_bytes, max_dimension, quality)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Icon compression task failed: {e}")))?
    .ok_or_else(|| AppError::Validation("Icon is not a readable image".into()))?;

    let rel_path = MediaStorage::icon_path(id);
    state
        .storage
        .write(&rel_path, &stored)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store icon: {e}")))?;

    let old_icon = profile.icon_path.clone();

    let mut active: company_profile::ActiveModel = profile.into();
    active.icon_path = Set(Some(rel_path));
    active.updated_at = Set(Utc::now());
    let updated = active.update(&state.db).await?;

    if let Some(old) = old_icon {
        state.storage.remove(&old).await;
    }

    Ok(Json(profile_response(&target, Some(&updated))))
}

/// Mark a measurement as validated.
#[utoipa::path(
    post,
    path = "/measurements/{id}/validate",
    tag = "Admin",
    operation_id = "validateMeasurement",
    summary = "Validate a measurement",
    description = "Marks the reading as reviewed and correct. Requires \
        `measurement:validate` permission.",
    params(("id" = i32, Path, description = "Measurement ID")),
    responses(
        (status = 204, description = "Measurement validated"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Measurement not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(measurement_id = %id))]
pub async fn validate_measurement(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("measurement:validate")?;

    let row = measurement::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Measurement not found".into()))?;

    let mut active: measurement::ActiveModel = row.into();
    active.is_valid = Set(true);
    active.update(&state.db).await?;

    info!(measurement_id = id, validated_by = auth_user.user_id, "Measurement validated");

    Ok(StatusCode::NO_CONTENT)
}

/// Delete a measurement.
#[utoipa::path(
    delete,
    path = "/measurements/{id}",
    tag = "Admin",
    operation_id = "deleteMeasurement",
    summary = "Delete a measurement",
    description = "Removes the reading and its stored photo. Requires \
        `measurement:delete` permission.",
    params(("id" = i32, Path, description = "Measurement ID")),
    responses(
        (status = 204, description = "Measurement deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Measurement not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(measurement_id = %id))]
pub async fn delete_measurement(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("measurement:delete")?;

    let row = measurement::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Measurement not found".into()))?;

    measurement::Entity::delete_by_id(id).exec(&state.db).await?;

    if let Some(photo_path) = &row.photo_path {
        state.storage.remove(photo_path).await;
    }

    info!(measurement_id = id, deleted_by = auth_user.user_id, "Measurement deleted");

    Ok(StatusCode::NO_CONTENT)
}

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use chrono::Utc;
use sea_orm::*;
use tracing::instrument;

use crate::entity::{measurement, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::models::measurement::ExportQuery;
use crate::state::AppState;

/// Byte-order mark so Excel opens the file as UTF-8.
const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

const CSV_HEADERS: [&str; 8] = [
    "Timestamp",
    "Usuario (Empresa)",
    "Ubicación Manual",
    "Valor (m³/h)",
    "Foto",
    "Estado",
    "Ubicación GPS",
    "Observaciones",
];

/// Export measurements as CSV.
#[utoipa::path(
    get,
    path = "/csv",
    tag = "Export",
    operation_id = "exportCsv",
    summary = "Download measurements as CSV",
    description = "Spanish column headers, UTF-8 with BOM for Excel compatibility. Users \
        export their own readings; users with `export:all` permission export everything or \
        a single user via `?user_id=`.",
    params(ExportQuery),
    responses(
        (status = 200, description = "CSV file", content_type = "text/csv"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Requested user not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query))]
pub async fn export_csv(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let can_export_all = auth_user.has_permission("export:all");

    // Scope and the filename suffix are decided together.
    let (select, suffix) = match query.user_id {
        Some(uid) if uid != auth_user.user_id => {
            if !can_export_all {
                return Err(AppError::PermissionDenied);
            }
            let target = user::Entity::find_by_id(uid)
                .one(&state.db)
                .await?
                .ok_or_else(|| AppError::NotFound("User not found".into()))?;
            (
                measurement::Entity::find().filter(measurement::Column::UserId.eq(uid)),
                format!("_{}", target.username),
            )
        }
        Some(_) => (
            measurement::Entity::find()
                .filter(measurement::Column::UserId.eq(auth_user.user_id)),
            format!("_{}", auth_user.username),
        ),
        None if can_export_all => (
            measurement::Entity::find(),
            "_sistema_completo".to_string(),
        ),
        None => (
            measurement::Entity::find()
                .filter(measurement::Column::UserId.eq(auth_user.user_id)),
            format!("_{}", auth_user.username),
        ),
    };

    let rows = select
        .find_also_related(user::Entity)
        .order_by_desc(measurement::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let csv_bytes = write_csv(&rows)
        .map_err(|e| AppError::Internal(format!("CSV serialization failed: {e}")))?;

    let mut body = Vec::with_capacity(UTF8_BOM.len() + csv_bytes.len());
    body.extend_from_slice(UTF8_BOM);
    body.extend_from_slice(&csv_bytes);

    let filename = format!(
        "mediciones{}_{}.csv",
        suffix,
        Utc::now().format("%d%m%Y_%H%M%S")
    );

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(body.into())
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))?;

    Ok(response)
}

fn write_csv(
    rows: &[(measurement::Model, Option<user::Model>)],
) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(CSV_HEADERS)?;

    for (m, u) in rows {
        let gps = m
            .captured_latitude
            .zip(m.captured_longitude)
            .map(|(lat, lon)| format!("{lat}, {lon}"))
            .unwrap_or_default();

        writer.write_record([
            m.created_at.format("%d/%m/%Y %H:%M:%S").to_string(),
            u.as_ref()
                .map(|u| u.username.clone())
                .unwrap_or_else(|| "(usuario eliminado)".to_string()),
            m.manual_location.clone().unwrap_or_default(),
            m.value.to_string(),
            m.photo_path.clone().unwrap_or_default(),
            if m.is_valid { "Validado" } else { "Pendiente" }.to_string(),
            gps,
            m.observation.clone().unwrap_or_default(),
        ])?;
    }

    writer.into_inner().map_err(|e| e.into_error().into())
}

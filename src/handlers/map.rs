use axum::Json;
use axum::extract::{Query, State};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use sea_orm::*;
use tracing::instrument;

use crate::entity::{measurement, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::models::measurement::WeeklyMapQuery;
use crate::state::AppState;

/// Parse a `YYYY-MM-DD` query value, falling back to `default` when absent
/// or malformed.
fn parse_date_or(raw: Option<&str>, default: NaiveDate) -> NaiveDate {
    raw.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
        .unwrap_or(default)
}

/// Monday of the ISO week containing `date`.
fn week_start_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Weekly measurement map.
#[utoipa::path(
    get,
    path = "/weekly",
    tag = "Map",
    operation_id = "weeklyMap",
    summary = "Geotagged measurements as GeoJSON",
    description = "Returns a GeoJSON FeatureCollection of measurements with EXIF GPS \
        coordinates inside the requested date range, defaulting to the current ISO week \
        (Monday through Sunday). Invalid `start_date`/`end_date` values fall back to the \
        defaults. Users with `measurement:view_all` permission see every user's points; \
        everyone else only their own. Points without coordinates are excluded.",
    params(WeeklyMapQuery),
    responses(
        (status = 200, description = "GeoJSON FeatureCollection"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query))]
pub async fn weekly_map(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<WeeklyMapQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let today = Utc::now().date_naive();
    let default_start = week_start_of(today);
    let default_end = default_start + Duration::days(6);

    let start = parse_date_or(query.start_date.as_deref(), default_start);
    let end = parse_date_or(query.end_date.as_deref(), default_end);

    let range_start = start.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    let range_end = (end + Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc();

    let mut select = measurement::Entity::find()
        .filter(measurement::Column::CreatedAt.gte(range_start))
        .filter(measurement::Column::CreatedAt.lt(range_end))
        .filter(measurement::Column::CapturedLatitude.is_not_null())
        .filter(measurement::Column::CapturedLongitude.is_not_null());

    if !auth_user.has_permission("measurement:view_all") {
        select = select.filter(measurement::Column::UserId.eq(auth_user.user_id));
    }

    let rows = select
        .find_also_related(user::Entity)
        .order_by_asc(measurement::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let features: Vec<serde_json::Value> = rows
        .into_iter()
        .filter_map(|(m, u)| {
            let (lat, lon) = m.captured_latitude.zip(m.captured_longitude)?;
            // Storage rejects (0, 0), but older rows may predate that rule.
            if lat == 0.0 && lon == 0.0 {
                return None;
            }
            Some(serde_json::json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": [lon, lat],
                },
                "properties": {
                    "id": m.id,
                    "username": u.map(|u| u.username),
                    "value": m.value.to_string(),
                    "manual_location": m.manual_location,
                    "is_valid": m.is_valid,
                    "captured_at": m.captured_at,
                    "created_at": m.created_at,
                },
            }))
        })
        .collect();

    Ok(Json(serde_json::json!({
        "type": "FeatureCollection",
        "properties": {
            "week_start": start.to_string(),
            "week_end": end.to_string(),
            "count": features.len(),
        },
        "features": features,
    })))
}

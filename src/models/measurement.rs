use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entity::measurement;
use crate::models::shared::Pagination;

/// A single flow-meter reading.
#[derive(Serialize, utoipa::ToSchema)]
pub struct MeasurementResponse {
    #[schema(example = 101)]
    pub id: i32,
    /// Submitting user's ID. Null when the user was deleted.
    pub user_id: Option<i32>,
    /// Submitting user's username. Null when the user was deleted.
    #[schema(example = "ypf_norte")]
    pub username: Option<String>,
    /// Flow value in m³/h.
    #[schema(value_type = String, example = "1520.75")]
    pub value: Decimal,
    /// Well or battery name the operator typed or inherited from their profile.
    #[schema(example = "Batería Loma Campana 3")]
    pub manual_location: Option<String>,
    /// Whether a photo is attached.
    pub has_photo: bool,
    #[schema(example = "Caudal estable")]
    pub observation: Option<String>,
    /// Timestamp extracted from the photo's EXIF metadata, when present.
    pub captured_at: Option<DateTime<Utc>>,
    /// GPS latitude extracted from the photo's EXIF metadata.
    pub captured_latitude: Option<f64>,
    pub captured_longitude: Option<f64>,
    /// Coordinates of the well as recorded in the company profile at submit time.
    pub target_latitude: Option<f64>,
    pub target_longitude: Option<f64>,
    /// Whether a staff member has validated this reading.
    pub is_valid: bool,
    pub created_at: DateTime<Utc>,
}

impl MeasurementResponse {
    pub fn from_model(model: measurement::Model, username: Option<String>) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            username,
            value: model.value,
            manual_location: model.manual_location,
            has_photo: model.photo_path.is_some(),
            observation: model.observation,
            captured_at: model.captured_at,
            captured_latitude: model.captured_latitude,
            captured_longitude: model.captured_longitude,
            target_latitude: model.target_latitude,
            target_longitude: model.target_longitude,
            is_valid: model.is_valid,
            created_at: model.created_at,
        }
    }
}

/// Response for a newly submitted measurement.
#[derive(Serialize, utoipa::ToSchema)]
pub struct CreateMeasurementResponse {
    #[serde(flatten)]
    pub measurement: MeasurementResponse,
    /// Soft advisory set when the value is lower than the last validated reading.
    /// The measurement is stored regardless.
    #[schema(example = "El valor 900.00 es menor que la última lectura validada (1520.75)")]
    pub warning: Option<String>,
}

/// Query parameters for listing measurements.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct MeasurementListQuery {
    /// Page number (1-based, default 1).
    pub page: Option<u64>,
    /// Items per page (default 20, max 100).
    pub per_page: Option<u64>,
    /// Filter by submitting user. Requires `measurement:view_all`.
    pub user_id: Option<i32>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct MeasurementListResponse {
    pub data: Vec<MeasurementResponse>,
    pub pagination: Pagination,
}

/// Query parameters for the weekly map view.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct WeeklyMapQuery {
    /// Start of the window, ISO date (YYYY-MM-DD). Defaults to the current ISO week's Monday.
    pub start_date: Option<String>,
    /// End of the window, ISO date (YYYY-MM-DD). Defaults to the current ISO week's Sunday.
    pub end_date: Option<String>,
}

/// Query parameters for the CSV export.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct ExportQuery {
    /// Restrict the export to a single user.
    pub user_id: Option<i32>,
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::shared::{validate_coordinates, validate_password, validate_username};

/// Request body for creating a user through the admin API.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateUserRequest {
    #[schema(example = "shell_cuenca")]
    pub username: String,
    #[schema(example = "s3cure_P@ss!")]
    pub password: String,
    pub email: Option<String>,
    /// Role to assign, `staff` or `operator`.
    #[schema(example = "operator")]
    pub role: String,
}

pub fn validate_create_user_request(payload: &CreateUserRequest) -> Result<(), AppError> {
    validate_username(&payload.username)?;
    validate_password(&payload.password)?;
    if payload.role != "staff" && payload.role != "operator" {
        return Err(AppError::Validation(
            "Role must be 'staff' or 'operator'".into(),
        ));
    }
    Ok(())
}

/// Request body for updating a user. All fields optional.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    /// New role, `staff` or `operator`.
    pub role: Option<String>,
}

pub fn validate_update_user_request(payload: &UpdateUserRequest) -> Result<(), AppError> {
    if let Some(username) = &payload.username {
        validate_username(username)?;
    }
    if let Some(password) = &payload.password {
        validate_password(password)?;
    }
    if let Some(role) = &payload.role {
        if role != "staff" && role != "operator" {
            return Err(AppError::Validation(
                "Role must be 'staff' or 'operator'".into(),
            ));
        }
    }
    Ok(())
}

/// One row in the admin user listing.
#[derive(Serialize, utoipa::ToSchema)]
pub struct UserSummary {
    #[schema(example = 42)]
    pub id: i32,
    #[schema(example = "ypf_norte")]
    pub username: String,
    pub email: Option<String>,
    #[schema(example = "operator")]
    pub role: String,
    pub created_at: DateTime<Utc>,
    /// When the user last submitted a measurement.
    pub latest_measurement_at: Option<DateTime<Utc>>,
}

/// One row in the company (operator) listing.
#[derive(Serialize, utoipa::ToSchema)]
pub struct CompanySummary {
    #[schema(example = 42)]
    pub user_id: i32,
    #[schema(example = "ypf_norte")]
    pub username: String,
    /// Well or battery the company reports from.
    #[schema(example = "Batería Loma Campana 3")]
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub has_icon: bool,
    /// Total readings submitted by this company.
    #[schema(example = 120)]
    pub measurement_count: u64,
    pub latest_measurement_at: Option<DateTime<Utc>>,
}

/// Aggregate statistics for one company.
#[derive(Serialize, utoipa::ToSchema)]
pub struct CompanyStats {
    pub total: u64,
    pub validated: u64,
    pub pending: u64,
    /// Share of validated readings, 0-100 with two decimals.
    #[schema(example = 87.5)]
    pub validated_pct: f64,
    #[schema(value_type = Option<String>, example = "1480.25")]
    pub avg_value: Option<Decimal>,
    #[schema(value_type = Option<String>, example = "900.00")]
    pub min_value: Option<Decimal>,
    #[schema(value_type = Option<String>, example = "2100.00")]
    pub max_value: Option<Decimal>,
    pub first_measurement_at: Option<DateTime<Utc>>,
    pub last_measurement_at: Option<DateTime<Utc>>,
}

/// One point of the dossier chart, oldest first.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ChartPoint {
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, example = "1520.75")]
    pub value: Decimal,
    pub is_valid: bool,
}

/// Full per-company dossier: profile, stats, and the last 20 readings for charting.
#[derive(Serialize, utoipa::ToSchema)]
pub struct CompanyDossierResponse {
    pub profile: ProfileResponse,
    pub stats: CompanyStats,
    /// Up to the 20 most recent readings, in chronological order.
    pub chart: Vec<ChartPoint>,
}

/// Request body for editing a company profile. All fields optional;
/// latitude and longitude must be provided together.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct UpdateProfileRequest {
    #[schema(example = "Batería Loma Campana 3")]
    pub location: Option<String>,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

pub fn validate_update_profile_request(payload: &UpdateProfileRequest) -> Result<(), AppError> {
    match (payload.latitude, payload.longitude) {
        (Some(lat), Some(lon)) => validate_coordinates(lat, lon),
        (None, None) => Ok(()),
        _ => Err(AppError::Validation(
            "Latitude and longitude must be provided together".into(),
        )),
    }
}

/// A company profile as returned by the API.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ProfileResponse {
    #[schema(example = 42)]
    pub user_id: i32,
    #[schema(example = "ypf_norte")]
    pub username: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub has_icon: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

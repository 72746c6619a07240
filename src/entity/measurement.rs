use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A single flow-meter reading submitted by an operator.
///
/// Created once by an upload and never edited by the submitter; staff may
/// validate or delete it.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "measurement")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// NULL after the submitting account is deleted.
    pub user_id: Option<i32>,
    #[sea_orm(belongs_to, from = "user_id", to = "id")]
    pub user: BelongsTo<Option<super::user::Entity>>,

    /// Flow-meter reading in m³/h. Never negative.
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub value: Decimal,

    /// Operator-facing location label, defaulted from the company profile.
    pub manual_location: Option<String>,

    /// Stored evidence photo, relative to the media root.
    pub photo_path: Option<String>,

    pub observation: Option<String>,

    /// Capture timestamp from photo EXIF, when present and not in the future.
    pub captured_at: Option<DateTimeUtc>,

    /// GPS coordinates from photo EXIF. Never exactly (0, 0).
    pub captured_latitude: Option<f64>,
    pub captured_longitude: Option<f64>,

    /// Expected coordinates of the target well.
    pub target_latitude: Option<f64>,
    pub target_longitude: Option<f64>,

    /// Set by staff review; never at creation time.
    pub is_valid: bool,

    /// Upload timestamp (server clock).
    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-company operator profile with location metadata.
/// At most one profile per user account.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "company_profile")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub user_id: i32,
    #[sea_orm(belongs_to, from = "user_id", to = "id")]
    pub user: HasOne<super::user::Entity>,

    /// Free-text location of the company / well.
    pub location: Option<String>,
    pub description: Option<String>,

    /// Reference coordinates of the well, set by staff.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    /// Stored icon image, relative to the media root.
    pub icon_path: Option<String>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

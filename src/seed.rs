use sea_orm::sea_query::{Index, OnConflict, PostgresQueryBuilder};
use sea_orm::*;
use tracing::{info, warn};

use crate::entity::{measurement, role, role_permission};

/// Roles known to the service.
const DEFAULT_ROLES: &[&str] = &["admin", "staff", "operator"];

/// Role-permission grants seeded on startup.
///
/// Admins run the whole system, staff review and report but cannot manage
/// accounts, operators only submit readings from the field.
const DEFAULT_MAPPINGS: &[(&str, &str)] = &[
    ("admin", "measurement:submit"),
    ("admin", "measurement:view_all"),
    ("admin", "measurement:validate"),
    ("admin", "measurement:delete"),
    ("admin", "export:all"),
    ("admin", "user:list"),
    ("admin", "user:manage"),
    ("admin", "profile:edit"),
    ("staff", "measurement:view_all"),
    ("staff", "measurement:validate"),
    ("staff", "measurement:delete"),
    ("staff", "export:all"),
    ("staff", "user:list"),
    ("staff", "profile:edit"),
    ("operator", "measurement:submit"),
];

/// Idempotently seed the `role` and `role_permission` tables.
pub async fn seed_role_permissions(db: &DatabaseConnection) -> Result<(), DbErr> {
    let mut inserted = 0u32;

    for &name in DEFAULT_ROLES {
        let outcome = role::Entity::insert(role::ActiveModel {
            name: Set(name.to_string()),
        })
        .on_conflict(OnConflict::column(role::Column::Name).do_nothing().to_owned())
        .exec_without_returning(db)
        .await;

        inserted += count_insert(outcome)?;
    }

    for &(role, permission) in DEFAULT_MAPPINGS {
        let outcome = role_permission::Entity::insert(role_permission::ActiveModel {
            role: Set(role.to_string()),
            permission: Set(permission.to_string()),
        })
        .on_conflict(
            OnConflict::columns([
                role_permission::Column::Role,
                role_permission::Column::Permission,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(db)
        .await;

        inserted += count_insert(outcome)?;
    }

    if inserted > 0 {
        info!(inserted, "Seeded roles and permission grants");
    }

    Ok(())
}

/// `do_nothing` conflicts report as `RecordNotInserted`; that is the
/// idempotent path, not a failure.
fn count_insert(outcome: Result<u64, DbErr>) -> Result<u32, DbErr> {
    match outcome {
        Ok(rows) => Ok(rows as u32),
        Err(DbErr::RecordNotInserted) => Ok(0),
        Err(e) => Err(e),
    }
}

/// Ensure the indexes the hot queries rely on.
///
/// Schema sync covers tables and unique constraints; composite non-unique
/// indexes are created here by hand.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Submission-interval check: WHERE user_id = ? AND created_at > ?
    let user_created = Index::create()
        .if_not_exists()
        .name("idx_measurement_user_created")
        .table(measurement::Entity)
        .col(measurement::Column::UserId)
        .col(measurement::Column::CreatedAt)
        .to_string(PostgresQueryBuilder);

    // Listings, the weekly map, and exports sort or range on created_at.
    let created = Index::create()
        .if_not_exists()
        .name("idx_measurement_created")
        .table(measurement::Entity)
        .col(measurement::Column::CreatedAt)
        .to_string(PostgresQueryBuilder);

    for stmt in [user_created, created] {
        if let Err(e) = db.execute_unprepared(&stmt).await {
            warn!(error = %e, statement = %stmt, "Index creation failed");
        }
    }

    Ok(())
}

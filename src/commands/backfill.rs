//! Backfill measurement coordinates from company profiles.
//!
//! Early deployments stored readings before profiles carried well
//! coordinates; this fills the gaps retroactively.

use std::collections::HashMap;

use anyhow::Result;
use sea_orm::*;
use tracing::info;

use crate::entity::{company_profile, measurement};

/// Fill missing captured/target coordinates from the owner's profile.
///
/// Runs in a single transaction; with `dry_run` the changes are reported
/// and rolled back.
pub async fn run(db: &DatabaseConnection, dry_run: bool) -> Result<()> {
    let profiles: HashMap<i32, (f64, f64)> = company_profile::Entity::find()
        .all(db)
        .await?
        .into_iter()
        .filter_map(|p| Some((p.user_id, (p.latitude?, p.longitude?))))
        .collect();

    let candidates = measurement::Entity::find()
        .filter(measurement::Column::UserId.is_not_null())
        .filter(
            Condition::any()
                .add(measurement::Column::CapturedLatitude.is_null())
                .add(measurement::Column::TargetLatitude.is_null()),
        )
        .order_by_asc(measurement::Column::Id)
        .all(db)
        .await?;

    let txn = db.begin().await?;

    let mut updated = 0usize;
    let mut skipped = 0usize;

    for row in candidates {
        let Some((lat, lon)) = row.user_id.and_then(|uid| profiles.get(&uid).copied()) else {
            info!(measurement_id = row.id, "Skipped: owner has no profile coordinates");
            skipped += 1;
            continue;
        };

        let fill_captured = row.captured_latitude.is_none() || row.captured_longitude.is_none();
        let fill_target = row.target_latitude.is_none() || row.target_longitude.is_none();

        info!(
            measurement_id = row.id,
            fill_captured,
            fill_target,
            latitude = lat,
            longitude = lon,
            "Backfilling coordinates"
        );

        if !dry_run {
            let mut active: measurement::ActiveModel = row.into();
            if fill_captured {
                active.captured_latitude = Set(Some(lat));
                active.captured_longitude = Set(Some(lon));
            }
            if fill_target {
                active.target_latitude = Set(Some(lat));
                active.target_longitude = Set(Some(lon));
            }
            active.update(&txn).await?;
        }

        updated += 1;
    }

    if dry_run {
        txn.rollback().await?;
        info!(would_update = updated, skipped, "Dry run complete, no changes written");
    } else {
        txn.commit().await?;
        info!(updated, skipped, "Coordinate backfill complete");
    }

    Ok(())
}

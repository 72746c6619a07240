//! Demo fixture seeding for staging environments and UI work.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use image::{DynamicImage, Rgb, RgbImage};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use sea_orm::*;
use tracing::info;

use crate::entity::{company_profile, measurement, user};
use crate::storage::MediaStorage;
use crate::utils::hash;

/// All demo accounts share this password.
const DEMO_PASSWORD: &str = "demo123";

/// Fixture company names; `--companies` caps how many are used.
const COMPANY_POOL: &[(&str, &str)] = &[
    ("ypf_loma_campana", "Batería Loma Campana 3"),
    ("shell_sierras_blancas", "Pozo Sierras Blancas Norte"),
    ("pae_cerro_dragon", "Batería Cerro Dragón 12"),
    ("vista_bajada_palo", "Pozo Bajada del Palo Oeste"),
    ("tecpetrol_fortin", "Batería Fortín de Piedra 7"),
    ("pluspetrol_centenario", "Pozo Centenario Sur"),
    ("capsa_diadema", "Batería Diadema Argentina 2"),
    ("cgc_santa_cruz", "Pozo Santa Cruz I Norte"),
];

/// Approximate center of the Vaca Muerta shale play.
const BASE_LAT: f64 = -38.65;
const BASE_LON: f64 = -68.85;

/// Create demo operator accounts with profiles and randomized readings.
pub async fn run(
    db: &DatabaseConnection,
    storage: &MediaStorage,
    companies: usize,
    measurements_per_company: usize,
) -> Result<()> {
    let companies = companies.min(COMPANY_POOL.len());
    let password_hash =
        hash::hash_password(DEMO_PASSWORD).map_err(|e| anyhow::anyhow!("Hash error: {e}"))?;

    let mut rng = rand::rng();
    let mut created_users = 0usize;
    let mut created_measurements = 0usize;

    for (i, &(username, location)) in COMPANY_POOL.iter().take(companies).enumerate() {
        let existing = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(db)
            .await?;
        if existing.is_some() {
            info!(username, "Demo company already exists, skipping");
            continue;
        }

        let account = user::ActiveModel {
            username: Set(username.to_string()),
            password: Set(password_hash.clone()),
            email: Set(Some(format!("{username}@demo.example"))),
            role: Set("operator".to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await?;

        // Spread the wells around the basin, with per-company jitter.
        let latitude = BASE_LAT + (i as f64) * 0.07 + rng.random_range(-0.02..0.02);
        let longitude = BASE_LON + (i as f64) * 0.05 + rng.random_range(-0.02..0.02);

        company_profile::ActiveModel {
            user_id: Set(account.id),
            location: Set(Some(location.to_string())),
            description: Set(Some(format!("Cuenta de demostración: {location}"))),
            latitude: Set(Some(latitude)),
            longitude: Set(Some(longitude)),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await?;

        created_users += 1;

        for _ in 0..measurements_per_company {
            let created_at = Utc::now()
                - Duration::minutes(rng.random_range(0..30 * 24 * 60));
            let value = Decimal::from_f64(rng.random_range(500.0..2500.0))
                .unwrap_or_default()
                .round_dp(2);

            let row = measurement::ActiveModel {
                user_id: Set(Some(account.id)),
                value: Set(value),
                manual_location: Set(Some(location.to_string())),
                observation: Set(None),
                captured_at: Set(Some(created_at)),
                captured_latitude: Set(Some(latitude + rng.random_range(-0.001..0.001))),
                captured_longitude: Set(Some(longitude + rng.random_range(-0.001..0.001))),
                target_latitude: Set(Some(latitude)),
                target_longitude: Set(Some(longitude)),
                is_valid: Set(rng.random_bool(0.6)),
                created_at: Set(created_at),
                ..Default::default()
            }
            .insert(db)
            .await?;

            let rel_path = MediaStorage::evidence_path(account.id, created_at);
            storage
                .write(&rel_path, &synthetic_photo(row.id))
                .await
                .context("Failed to write demo photo")?;

            let mut active: measurement::ActiveModel = row.into();
            active.photo_path = Set(Some(rel_path));
            active.update(db).await?;

            created_measurements += 1;
        }

        info!(username, measurements = measurements_per_company, "Seeded demo company");
    }

    info!(
        users = created_users,
        measurements = created_measurements,
        "Demo seeding complete (password: {DEMO_PASSWORD})"
    );

    Ok(())
}

/// A small solid-color JPEG, tinted per measurement so they are tellable apart.
fn synthetic_photo(seed: i32) -> Vec<u8> {
    let tint = Rgb([
        80u8.wrapping_add((seed as u8).wrapping_mul(37)),
        120,
        160u8.wrapping_add((seed as u8).wrapping_mul(53)),
    ]);
    let img = RgbImage::from_pixel(320, 240, tint);

    let mut out = Vec::new();
    // Infallible for an in-memory RGB image.
    let _ = DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Jpeg);
    out
}

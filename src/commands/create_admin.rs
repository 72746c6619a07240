//! Bootstrap an admin account from the command line.

use anyhow::{Result, bail};
use chrono::Utc;
use sea_orm::*;
use tracing::info;

use crate::entity::user;
use crate::models::shared::{validate_password, validate_username};
use crate::utils::hash;

pub async fn run(db: &DatabaseConnection, username: &str, password: &str) -> Result<()> {
    let username = validate_username(username).map_err(|e| anyhow::anyhow!("{e:?}"))?;
    validate_password(password).map_err(|e| anyhow::anyhow!("{e:?}"))?;

    let password_hash =
        hash::hash_password(password).map_err(|e| anyhow::anyhow!("Hash error: {e}"))?;

    let result = user::ActiveModel {
        username: Set(username.to_string()),
        password: Set(password_hash),
        role: Set("admin".to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await;

    match result {
        Ok(created) => {
            info!(user_id = created.id, username, "Admin account created");
            Ok(())
        }
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            bail!("Username '{username}' is already taken")
        }
        Err(e) => Err(e.into()),
    }
}

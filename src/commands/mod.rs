pub mod backfill;
pub mod backup;
pub mod create_admin;
pub mod seed_demo;

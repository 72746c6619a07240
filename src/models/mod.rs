pub mod admin;
pub mod auth;
pub mod measurement;
pub mod shared;

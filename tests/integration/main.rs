mod common;

mod auth;
mod export;
mod measurement;

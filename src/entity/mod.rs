pub mod company_profile;
pub mod measurement;
pub mod role;
pub mod role_permission;
pub mod user;

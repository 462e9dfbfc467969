pub mod account;
pub mod cache;
pub mod image;
pub mod sqlx_repo;
pub mod storage;
pub mod throttle;
pub mod token;

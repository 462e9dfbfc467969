pub mod auth;
pub mod cache;
pub mod db;
pub mod imaging;
pub mod limiter;
pub mod storage;

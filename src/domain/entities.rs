pub mod account;
pub mod image;
pub mod image_url;
pub mod preset;
pub mod token;

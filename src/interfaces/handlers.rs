pub mod home;
pub mod image_urls;
pub mod images;
pub mod json_error;
pub mod system;
pub mod users;

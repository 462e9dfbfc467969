pub mod extractors;
pub mod images;
pub mod resolver;

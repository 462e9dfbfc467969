use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A named target size. With neither `height` nor `width` set the preset
/// serves the original image.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ImagePreset {
    pub id: Uuid,
    pub name: String,
    pub height: Option<i32>,
    pub width: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImagePreset {
    pub fn new(name: &str, height: Option<i32>, width: Option<i32>) -> Self {
        let now = Utc::now();
        ImagePreset {
            id: Uuid::new_v4(),
            name: name.to_string(),
            height,
            width,
            created_at: now,
            updated_at: now,
        }
    }
}

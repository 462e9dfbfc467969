use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::entities::image_url::ImageLinks;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UploadedImage {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Storage key, `{user_id}/{image_id}/{file name}`
    pub image_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadedImage {
    pub fn new(user_id: Uuid, file_name: &str) -> Self {
        let id = Uuid::new_v4();
        let now = Utc::now();
        UploadedImage {
            id,
            user_id,
            image_path: format!("{}/{}/{}", user_id, id, file_name),
            created_at: now,
            updated_at: now,
        }
    }

    /// Final path segment of the stored image.
    pub fn filename(&self) -> &str {
        self.image_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.image_path)
    }
}

/// A removed image with the ids of the links that went with it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedImage {
    pub image: UploadedImage,
    pub link_ids: Vec<Uuid>,
}

/// A multipart upload after the form has been read.
#[derive(Debug, Validate)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    #[validate(range(
        min = 300,
        max = 30000,
        message = "Ensure this value is between 300 and 30000 seconds"
    ))]
    pub expire: Option<i64>,
}

/// Body of a partial update: only a new expiry may be set.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ExpireUpdate {
    #[validate(range(
        min = 300,
        max = 30000,
        message = "Ensure this value is between 300 and 30000 seconds"
    ))]
    pub expire: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub id: Uuid,
    pub image_links: ImageLinks,
    pub created_at: DateTime<Utc>,
}

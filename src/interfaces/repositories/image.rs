use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::{
    entities::{
        image::{DeletedImage, UploadedImage},
        image_url::{ImageUrl, PresetLink, ResolvableLink},
        preset::ImagePreset,
    },
    errors::AppError,
    repositories::sqlx_repo::SqlxImageRepo,
};

#[async_trait]
pub trait ImageRepository: Send + Sync {
    async fn check_connection(&self) -> Result<(), AppError>;

    /// Inserts the image row and its first link batch as one unit.
    async fn create_image(&self, image: &UploadedImage, links: &[ImageUrl]) -> Result<(), AppError>;

    /// Adds a link batch to an existing image as one unit and bumps its `updated_at`.
    async fn add_links(&self, image_id: &Uuid, links: &[ImageUrl]) -> Result<(), AppError>;

    async fn list_images_by_owner(&self, owner: &Uuid) -> Result<Vec<UploadedImage>, AppError>;
    async fn get_image_for_owner(&self, id: &Uuid, owner: &Uuid) -> Result<Option<UploadedImage>, AppError>;

    /// Links of the given images, oldest first.
    async fn list_links(&self, image_ids: &[Uuid]) -> Result<Vec<PresetLink>, AppError>;

    /// Deletes the image and its links as one unit. Returns the deleted row
    /// and the removed link ids, or `None` when the caller does not own it.
    async fn delete_image(&self, id: &Uuid, owner: &Uuid) -> Result<Option<DeletedImage>, AppError>;

    async fn find_link(&self, id: &Uuid) -> Result<Option<ResolvableLink>, AppError>;
}

impl SqlxImageRepo {
    pub fn new(pool: sqlx::PgPool) -> Self {
        SqlxImageRepo { pool }
    }
}

async fn insert_links(tx: &mut Transaction<'_, Postgres>, links: &[ImageUrl]) -> Result<(), AppError> {
    if links.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO image_urls (id, preset_id, image_id, expire, created_at) "
    );
    builder.push_values(links, |mut row, link| {
        row.push_bind(link.id)
            .push_bind(link.preset_id)
            .push_bind(link.image_id)
            .push_bind(link.expire)
            .push_bind(link.created_at);
    });

    builder.build().execute(&mut **tx).await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct PresetLinkRow {
    #[sqlx(flatten)]
    link: ImageUrl,
    preset_name: String,
}

#[derive(sqlx::FromRow)]
struct ResolvableLinkRow {
    #[sqlx(flatten)]
    link: ImageUrl,
    preset_name: String,
    preset_height: Option<i32>,
    preset_width: Option<i32>,
    preset_created_at: DateTime<Utc>,
    preset_updated_at: DateTime<Utc>,
    image_user_id: Uuid,
    image_path: String,
    image_created_at: DateTime<Utc>,
    image_updated_at: DateTime<Utc>,
}

impl From<ResolvableLinkRow> for ResolvableLink {
    fn from(row: ResolvableLinkRow) -> Self {
        ResolvableLink {
            preset: ImagePreset {
                id: row.link.preset_id,
                name: row.preset_name,
                height: row.preset_height,
                width: row.preset_width,
                created_at: row.preset_created_at,
                updated_at: row.preset_updated_at,
            },
            image: UploadedImage {
                id: row.link.image_id,
                user_id: row.image_user_id,
                image_path: row.image_path,
                created_at: row.image_created_at,
                updated_at: row.image_updated_at,
            },
            link: row.link,
        }
    }
}

#[async_trait]
impl ImageRepository for SqlxImageRepo {
    async fn check_connection(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(AppError::from)
    }

    async fn create_image(&self, image: &UploadedImage, links: &[ImageUrl]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO uploaded_images (id, user_id, image_path, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#
        )
        .bind(image.id)
        .bind(image.user_id)
        .bind(&image.image_path)
        .bind(image.created_at)
        .bind(image.updated_at)
        .execute(&mut *tx)
        .await?;

        insert_links(&mut tx, links).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn add_links(&self, image_id: &Uuid, links: &[ImageUrl]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE uploaded_images SET updated_at = NOW() WHERE id = $1")
            .bind(image_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Image not found".to_string()));
        }

        insert_links(&mut tx, links).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_images_by_owner(&self, owner: &Uuid) -> Result<Vec<UploadedImage>, AppError> {
        sqlx::query_as::<_, UploadedImage>(
            "SELECT * FROM uploaded_images WHERE user_id = $1 ORDER BY created_at DESC"
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)
    }

    async fn get_image_for_owner(&self, id: &Uuid, owner: &Uuid) -> Result<Option<UploadedImage>, AppError> {
        sqlx::query_as::<_, UploadedImage>(
            "SELECT * FROM uploaded_images WHERE id = $1 AND user_id = $2"
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)
    }

    async fn list_links(&self, image_ids: &[Uuid]) -> Result<Vec<PresetLink>, AppError> {
        if image_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, PresetLinkRow>(
            r#"
            SELECT u.id, u.preset_id, u.image_id, u.expire, u.created_at, p.name AS preset_name
            FROM image_urls u
            JOIN image_presets p ON p.id = u.preset_id
            WHERE u.image_id = ANY($1)
            ORDER BY u.created_at, p.name
            "#
        )
        .bind(image_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PresetLink { preset_name: row.preset_name, link: row.link })
            .collect())
    }

    async fn delete_image(&self, id: &Uuid, owner: &Uuid) -> Result<Option<DeletedImage>, AppError> {
        let mut tx = self.pool.begin().await?;

        // Row lock keeps a concurrent add_links from slipping a batch in.
        let owned: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM uploaded_images WHERE id = $1 AND user_id = $2 FOR UPDATE"
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *tx)
        .await?;

        if owned.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let link_ids: Vec<Uuid> = sqlx::query_scalar("DELETE FROM image_urls WHERE image_id = $1 RETURNING id")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

        let image = sqlx::query_as::<_, UploadedImage>(
            "DELETE FROM uploaded_images WHERE id = $1 AND user_id = $2 RETURNING *"
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(image) = image else {
            tx.rollback().await?;
            return Ok(None);
        };

        tx.commit().await?;
        Ok(Some(DeletedImage { image, link_ids }))
    }

    async fn find_link(&self, id: &Uuid) -> Result<Option<ResolvableLink>, AppError> {
        let row = sqlx::query_as::<_, ResolvableLinkRow>(
            r#"
            SELECT
                u.id, u.preset_id, u.image_id, u.expire, u.created_at,
                p.name AS preset_name,
                p.height AS preset_height,
                p.width AS preset_width,
                p.created_at AS preset_created_at,
                p.updated_at AS preset_updated_at,
                i.user_id AS image_user_id,
                i.image_path,
                i.created_at AS image_created_at,
                i.updated_at AS image_updated_at
            FROM image_urls u
            JOIN image_presets p ON p.id = u.preset_id
            JOIN uploaded_images i ON i.id = u.image_id
            WHERE u.id = $1
            "#
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ResolvableLink::from))
    }
}

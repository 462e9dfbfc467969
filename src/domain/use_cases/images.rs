use std::{collections::HashMap, io::Cursor, sync::Arc};

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        account::{Account, AccountResponse},
        image::{DeletedImage, ExpireUpdate, ImageResponse, ImageUpload, UploadedImage},
        image_url::{group_links, ImageUrl, PresetLink},
        preset::ImagePreset,
    },
    errors::{AppError, FieldError},
    repositories::{
        account::AccountRepository, cache::ImageCache, image::ImageRepository, storage::ImageStorage,
    },
};

pub const EXPIRING_LINKS_NOT_ALLOWED: &str = "User is not allowed to create expiring links";
pub const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

/// An image with all of its links.
#[derive(Debug, Clone)]
pub struct ImageWithLinks {
    pub image: UploadedImage,
    pub links: Vec<PresetLink>,
}

impl ImageWithLinks {
    pub fn to_response<F>(&self, url_for: F) -> ImageResponse
    where
        F: Fn(&Uuid) -> String,
    {
        ImageResponse {
            id: self.image.id,
            image_links: group_links(&self.links, Utc::now(), url_for),
            created_at: self.image.created_at,
        }
    }
}

pub struct ImageHandler {
    pub images: Arc<dyn ImageRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub storage: Arc<dyn ImageStorage>,
    pub cache: Arc<dyn ImageCache>,
}

impl ImageHandler {
    pub fn new(
        images: Arc<dyn ImageRepository>,
        accounts: Arc<dyn AccountRepository>,
        storage: Arc<dyn ImageStorage>,
        cache: Arc<dyn ImageCache>,
    ) -> Self {
        ImageHandler { images, accounts, storage, cache }
    }

    /// Stores the file, then creates the image row and one link per plan
    /// preset in a single transaction. The file is removed again if the
    /// transaction fails.
    ///
    /// Every field problem is reported at once: a bad `expire` and a bad
    /// `image` come back in the same validation error.
    pub async fn upload(&self, user_id: &Uuid, upload: ImageUpload) -> Result<ImageWithLinks, AppError> {
        let mut errors = Vec::new();
        collect_field_errors(&mut errors, upload.validate().map_err(AppError::from))?;

        let account = self.account_for(user_id).await?;
        if !errors.iter().any(|e| e.field == "expire") {
            collect_field_errors(&mut errors, ensure_expiry_allowed(&account, upload.expire))?;
        }

        let checked = collect_field_errors(&mut errors, verify_image(upload.bytes).await)?;
        let Some((format, bytes)) = checked.filter(|_| errors.is_empty()) else {
            return Err(AppError::ValidationError(errors));
        };
        let file_name = sanitize_file_name(&upload.file_name, format);

        let image = UploadedImage::new(*user_id, &file_name);
        self.storage.save(&image.image_path, &bytes).await?;

        let links = ImageUrl::batch(&account.presets, image.id, upload.expire);
        if let Err(e) = self.images.create_image(&image, &links).await {
            if let Err(cleanup) = self.storage.delete(&image.image_path).await {
                tracing::warn!(path = %image.image_path, "failed to remove orphaned upload: {:#}", cleanup);
            }
            return Err(e);
        }

        tracing::info!(
            image_id = %image.id,
            user_id = %user_id,
            links = links.len(),
            expire = ?upload.expire,
            "image uploaded"
        );

        let links = with_preset_names(&account.presets, links);
        Ok(ImageWithLinks { image, links })
    }

    /// The caller's images, newest first.
    pub async fn list(&self, user_id: &Uuid) -> Result<Vec<ImageWithLinks>, AppError> {
        let images = self.images.list_images_by_owner(user_id).await?;
        let ids: Vec<Uuid> = images.iter().map(|image| image.id).collect();

        let mut links_by_image: HashMap<Uuid, Vec<PresetLink>> = HashMap::new();
        for link in self.images.list_links(&ids).await? {
            links_by_image.entry(link.link.image_id).or_default().push(link);
        }

        Ok(images
            .into_iter()
            .map(|image| {
                let links = links_by_image.remove(&image.id).unwrap_or_default();
                ImageWithLinks { image, links }
            })
            .collect())
    }

    pub async fn get(&self, user_id: &Uuid, image_id: &Uuid) -> Result<ImageWithLinks, AppError> {
        let image = self.owned_image(user_id, image_id).await?;
        let links = self.images.list_links(&[image.id]).await?;
        Ok(ImageWithLinks { image, links })
    }

    /// Adds a new batch of links to an existing image, one per plan preset,
    /// all with the requested expiry. Existing links are left untouched.
    pub async fn update_expire(
        &self,
        user_id: &Uuid,
        image_id: &Uuid,
        update: ExpireUpdate,
    ) -> Result<ImageWithLinks, AppError> {
        let image = self.owned_image(user_id, image_id).await?;
        update.validate()?;

        let account = self.account_for(user_id).await?;
        ensure_expiry_allowed(&account, update.expire)?;

        let links = ImageUrl::batch(&account.presets, image.id, update.expire);
        self.images.add_links(&image.id, &links).await?;

        tracing::info!(
            image_id = %image.id,
            links = links.len(),
            expire = ?update.expire,
            "link batch added"
        );

        self.get(user_id, image_id).await
    }

    /// Removes the image, its links, the stored file and any cached renditions.
    /// File and cache cleanup failures are logged, the rows are already gone.
    pub async fn delete(&self, user_id: &Uuid, image_id: &Uuid) -> Result<(), AppError> {
        let DeletedImage { image, link_ids } = self
            .images
            .delete_image(image_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;

        if let Err(e) = self.storage.delete(&image.image_path).await {
            tracing::warn!(image_id = %image.id, "failed to remove stored file: {:#}", e);
        }

        for link_id in &link_ids {
            if let Err(e) = self.cache.delete(&link_id.to_string()).await {
                tracing::warn!(link_id = %link_id, "failed to evict cached image: {:#}", e);
            }
        }

        tracing::info!(image_id = %image.id, links = link_ids.len(), "image deleted");
        Ok(())
    }

    pub async fn account(&self, user_id: &Uuid) -> Result<AccountResponse, AppError> {
        self.account_for(user_id).await.map(AccountResponse::from)
    }

    async fn account_for(&self, user_id: &Uuid) -> Result<Account, AppError> {
        self.accounts
            .get_account(user_id)
            .await?
            .ok_or(AppError::UnauthorizedAccess)
    }

    async fn owned_image(&self, user_id: &Uuid, image_id: &Uuid) -> Result<UploadedImage, AppError> {
        self.images
            .get_image_for_owner(image_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Image not found".to_string()))
    }
}

fn ensure_expiry_allowed(account: &Account, expire: Option<i64>) -> Result<(), AppError> {
    if expire.is_some() && !account.can_generate_expiring_links() {
        return Err(AppError::field("expire", EXPIRING_LINKS_NOT_ALLOWED));
    }
    Ok(())
}

fn with_preset_names(presets: &[ImagePreset], links: Vec<ImageUrl>) -> Vec<PresetLink> {
    links
        .into_iter()
        .filter_map(|link| {
            presets
                .iter()
                .find(|preset| preset.id == link.preset_id)
                .map(|preset| PresetLink { preset_name: preset.name.clone(), link })
        })
        .collect()
}

/// Moves field errors into `errors` and yields `None`; other errors propagate.
fn collect_field_errors<T>(
    errors: &mut Vec<FieldError>,
    result: Result<T, AppError>,
) -> Result<Option<T>, AppError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(AppError::ValidationError(found)) => {
            errors.extend(found);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Decoding is CPU bound, so it runs on the blocking pool. The bytes are
/// handed back with the detected format.
async fn verify_image(bytes: Vec<u8>) -> Result<(image::ImageFormat, Vec<u8>), AppError> {
    tokio::task::spawn_blocking(move || detect_image_format(&bytes).map(|format| (format, bytes)))
        .await
        .map_err(|e| AppError::InternalError(format!("Image check task failed: {}", e)))?
}

/// Sniffs and fully decodes the bytes; the declared file name and content
/// type are not trusted.
fn detect_image_format(bytes: &[u8]) -> Result<image::ImageFormat, AppError> {
    if bytes.is_empty() {
        return Err(AppError::field("image", "The submitted file is empty."));
    }

    let invalid = || AppError::field("image", INVALID_IMAGE);

    let is_image = infer::get(bytes)
        .is_some_and(|kind| kind.matcher_type() == infer::MatcherType::Image);
    if !is_image {
        return Err(invalid());
    }

    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|_| invalid())?;
    let format = reader.format().ok_or_else(invalid)?;
    reader.decode().map_err(|_| invalid())?;

    Ok(format)
}

/// Slugified stem plus an extension matching the detected format.
fn sanitize_file_name(name: &str, format: image::ImageFormat) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext.to_ascii_lowercase())),
        _ => (base, None),
    };

    let stem = match slug::slugify(stem) {
        s if s.is_empty() => "image".to_string(),
        s => s,
    };

    let known = format.extensions_str();
    let ext = ext
        .filter(|ext| known.contains(&ext.as_str()))
        .or_else(|| known.first().map(|ext| ext.to_string()))
        .unwrap_or_else(|| "img".to_string());

    format!("{}.{}", stem, ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;

    #[test]
    fn file_names_are_slugified_and_keep_known_extensions() {
        assert_eq!(sanitize_file_name("Sample Image.PNG", ImageFormat::Png), "sample-image.png");
        assert_eq!(sanitize_file_name("../../etc/cat.jpeg", ImageFormat::Jpeg), "cat.jpeg");
        assert_eq!(sanitize_file_name("C:\\photos\\dog.jpg", ImageFormat::Jpeg), "dog.jpg");
    }

    #[test]
    fn extension_follows_detected_format() {
        assert_eq!(sanitize_file_name("noext", ImageFormat::Png), "noext.png");
        assert_eq!(sanitize_file_name("fake.exe", ImageFormat::Gif), "fake.gif");
        assert_eq!(sanitize_file_name(".png", ImageFormat::Png), "png.png");
        assert_eq!(sanitize_file_name("???", ImageFormat::Png), "image.png");
    }

    #[test]
    fn non_images_are_rejected() {
        assert!(matches!(
            detect_image_format(b"%PDF-1.4 not an image"),
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(detect_image_format(b""), Err(AppError::ValidationError(_))));
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image::RgbImage::new(width, height)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn complete_images_report_their_format() {
        assert_eq!(detect_image_format(&png(8, 8)).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn truncated_images_are_rejected() {
        let mut bytes = png(50, 50);
        bytes.truncate(40);
        bytes.extend_from_slice(&[0u8; 200]);

        match detect_image_format(&bytes) {
            Err(AppError::ValidationError(errors)) => {
                assert_eq!(errors[0].field, "image");
                assert_eq!(errors[0].message, INVALID_IMAGE);
            }
            other => panic!("expected a field error, got {:?}", other),
        }
    }

    #[test]
    fn field_errors_are_collected_and_others_propagate() {
        let mut errors = Vec::new();
        let first = collect_field_errors::<()>(&mut errors, Err(AppError::field("expire", "bad")));
        let second = collect_field_errors::<()>(&mut errors, Err(AppError::field("image", "bad")));
        assert!(matches!(first, Ok(None)));
        assert!(matches!(second, Ok(None)));
        assert_eq!(errors.len(), 2);

        let other = collect_field_errors::<()>(&mut errors, Err(AppError::UnauthorizedAccess));
        assert!(matches!(other, Err(AppError::UnauthorizedAccess)));
        assert_eq!(collect_field_errors(&mut errors, Ok(3)).unwrap(), Some(3));
    }
}

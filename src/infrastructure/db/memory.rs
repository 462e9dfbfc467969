use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::{
    entities::{
        account::{Account, Plan, User},
        image::{DeletedImage, UploadedImage},
        image_url::{ImageUrl, PresetLink, ResolvableLink},
        preset::ImagePreset,
    },
    errors::AppError,
    repositories::{account::AccountRepository, image::ImageRepository},
};

#[derive(Default)]
struct Tables {
    presets: HashMap<Uuid, ImagePreset>,
    plans: HashMap<Uuid, Plan>,
    plan_presets: HashMap<Uuid, Vec<Uuid>>,
    users: HashMap<Uuid, User>,
    images: HashMap<Uuid, UploadedImage>,
    links: Vec<ImageUrl>,
}

impl Tables {
    fn check_links(&self, links: &[ImageUrl]) -> Result<(), AppError> {
        for link in links {
            if !self.presets.contains_key(&link.preset_id) {
                return Err(AppError::InternalError(format!(
                    "Foreign key violation: preset {} does not exist",
                    link.preset_id
                )));
            }
        }
        Ok(())
    }
}

/// In-memory implementation of the persistence ports. Every write takes one
/// lock and validates before mutating, so a failed write leaves nothing behind.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_preset(&self, preset: ImagePreset) -> ImagePreset {
        self.tables.write().presets.insert(preset.id, preset.clone());
        preset
    }

    pub fn add_plan(&self, plan: Plan, preset_ids: &[Uuid]) -> Plan {
        let mut tables = self.tables.write();
        tables.plan_presets.insert(plan.id, preset_ids.to_vec());
        tables.plans.insert(plan.id, plan.clone());
        plan
    }

    pub fn add_user(&self, user: User) -> User {
        self.tables.write().users.insert(user.id, user.clone());
        user
    }

    /// Makes every following write fail until switched off again.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn links_for_image(&self, image_id: &Uuid) -> Vec<ImageUrl> {
        self.tables
            .read()
            .links
            .iter()
            .filter(|link| link.image_id == *image_id)
            .cloned()
            .collect()
    }

    pub fn link_count(&self) -> usize {
        self.tables.read().links.len()
    }

    pub fn image_count(&self) -> usize {
        self.tables.read().images.len()
    }

    fn check_writable(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::InternalError("Database error: writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ImageRepository for MemoryStore {
    async fn check_connection(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn create_image(&self, image: &UploadedImage, links: &[ImageUrl]) -> Result<(), AppError> {
        self.check_writable()?;
        let mut tables = self.tables.write();

        if !tables.users.contains_key(&image.user_id) {
            return Err(AppError::InternalError(format!(
                "Foreign key violation: user {} does not exist",
                image.user_id
            )));
        }
        tables.check_links(links)?;

        tables.images.insert(image.id, image.clone());
        tables.links.extend_from_slice(links);
        Ok(())
    }

    async fn add_links(&self, image_id: &Uuid, links: &[ImageUrl]) -> Result<(), AppError> {
        self.check_writable()?;
        let mut tables = self.tables.write();

        tables.check_links(links)?;
        let image = tables
            .images
            .get_mut(image_id)
            .ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;
        image.updated_at = Utc::now();

        tables.links.extend_from_slice(links);
        Ok(())
    }

    async fn list_images_by_owner(&self, owner: &Uuid) -> Result<Vec<UploadedImage>, AppError> {
        let tables = self.tables.read();
        let mut images: Vec<UploadedImage> = tables
            .images
            .values()
            .filter(|image| image.user_id == *owner)
            .cloned()
            .collect();
        images.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(images)
    }

    async fn get_image_for_owner(&self, id: &Uuid, owner: &Uuid) -> Result<Option<UploadedImage>, AppError> {
        Ok(self
            .tables
            .read()
            .images
            .get(id)
            .filter(|image| image.user_id == *owner)
            .cloned())
    }

    async fn list_links(&self, image_ids: &[Uuid]) -> Result<Vec<PresetLink>, AppError> {
        let tables = self.tables.read();
        let mut links: Vec<PresetLink> = tables
            .links
            .iter()
            .filter(|link| image_ids.contains(&link.image_id))
            .filter_map(|link| {
                tables.presets.get(&link.preset_id).map(|preset| PresetLink {
                    preset_name: preset.name.clone(),
                    link: link.clone(),
                })
            })
            .collect();
        links.sort_by(|a, b| {
            a.link
                .created_at
                .cmp(&b.link.created_at)
                .then_with(|| a.preset_name.cmp(&b.preset_name))
        });
        Ok(links)
    }

    async fn delete_image(&self, id: &Uuid, owner: &Uuid) -> Result<Option<DeletedImage>, AppError> {
        self.check_writable()?;
        let mut tables = self.tables.write();

        let owned = tables.images.get(id).is_some_and(|image| image.user_id == *owner);
        if !owned {
            return Ok(None);
        }

        let link_ids = tables
            .links
            .iter()
            .filter(|link| link.image_id == *id)
            .map(|link| link.id)
            .collect();
        tables.links.retain(|link| link.image_id != *id);

        Ok(tables
            .images
            .remove(id)
            .map(|image| DeletedImage { image, link_ids }))
    }

    async fn find_link(&self, id: &Uuid) -> Result<Option<ResolvableLink>, AppError> {
        let tables = self.tables.read();
        let Some(link) = tables.links.iter().find(|link| link.id == *id) else {
            return Ok(None);
        };

        let preset = tables.presets.get(&link.preset_id).cloned();
        let image = tables.images.get(&link.image_id).cloned();

        Ok(preset.zip(image).map(|(preset, image)| ResolvableLink {
            link: link.clone(),
            preset,
            image,
        }))
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn get_account(&self, user_id: &Uuid) -> Result<Option<Account>, AppError> {
        let tables = self.tables.read();
        let Some(user) = tables.users.get(user_id).cloned() else {
            return Ok(None);
        };

        let plan = user.plan_id.and_then(|id| tables.plans.get(&id).cloned());
        let mut presets: Vec<ImagePreset> = plan
            .as_ref()
            .and_then(|plan| tables.plan_presets.get(&plan.id))
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| tables.presets.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        presets.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Some(Account { user, plan, presets }))
    }
}

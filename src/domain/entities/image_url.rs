use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::{image::UploadedImage, preset::ImagePreset};

/// Binds one uploaded image to one preset, optionally time-boxed.
///
/// The id is both the public resolution key and the cache key. Several links
/// may exist for the same (preset, image) pair: every upload or expiry update
/// adds a new batch holding exactly one link per preset on the owner's plan,
/// and older links stay alive until they expire on their own.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ImageUrl {
    pub id: Uuid,
    pub preset_id: Uuid,
    pub image_id: Uuid,
    /// Lifetime in seconds, `None` for links that never expire.
    pub expire: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl ImageUrl {
    pub fn new(preset_id: Uuid, image_id: Uuid, expire: Option<i64>) -> Self {
        ImageUrl {
            id: Uuid::new_v4(),
            preset_id,
            image_id,
            expire,
            created_at: Utc::now(),
        }
    }

    /// One link per preset, all sharing the image and expiry.
    pub fn batch(presets: &[ImagePreset], image_id: Uuid, expire: Option<i64>) -> Vec<ImageUrl> {
        presets
            .iter()
            .map(|preset| ImageUrl::new(preset.id, image_id, expire))
            .collect()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expire.map(|secs| self.created_at + Duration::seconds(secs))
    }

    /// A link with no time left is expired, so `expire = 0` is expired from
    /// the moment it is created.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|deadline| now >= deadline)
    }

    /// Whole seconds left, floored at zero. `None` when the link never expires.
    pub fn expire_in_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at()
            .map(|deadline| (deadline - now).num_seconds().max(0))
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn expire_in(&self) -> Option<i64> {
        self.expire_in_at(Utc::now())
    }
}

/// A link joined with the preset name it belongs to, as listed on an image.
#[derive(Debug, Clone)]
pub struct PresetLink {
    pub preset_name: String,
    pub link: ImageUrl,
}

/// Everything needed to serve a link.
#[derive(Debug, Clone)]
pub struct ResolvableLink {
    pub link: ImageUrl,
    pub preset: ImagePreset,
    pub image: UploadedImage,
}

impl ResolvableLink {
    /// `{preset}_{file name of the stored image}`
    pub fn suggested_filename(&self) -> String {
        format!("{}_{}", self.preset.name, self.image.filename())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LinkView {
    pub url: String,
    pub expired: bool,
    pub expire_in: Option<i64>,
}

pub type ImageLinks = BTreeMap<String, Vec<LinkView>>;

/// Groups links by preset name, rendering each one through `url_for`.
pub fn group_links<F>(links: &[PresetLink], now: DateTime<Utc>, url_for: F) -> ImageLinks
where
    F: Fn(&Uuid) -> String,
{
    let mut grouped = ImageLinks::new();
    for entry in links {
        grouped
            .entry(entry.preset_name.clone())
            .or_default()
            .push(LinkView {
                url: url_for(&entry.link.id),
                expired: entry.link.is_expired_at(now),
                expire_in: entry.link.expire_in_at(now),
            });
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link_created_at(created_at: DateTime<Utc>, expire: Option<i64>) -> ImageUrl {
        ImageUrl {
            created_at,
            ..ImageUrl::new(Uuid::new_v4(), Uuid::new_v4(), expire)
        }
    }

    #[test]
    fn zero_expiry_is_expired_immediately() {
        let link = ImageUrl::new(Uuid::new_v4(), Uuid::new_v4(), Some(0));
        assert!(link.is_expired());
        assert_eq!(link.expire_in(), Some(0));
    }

    #[test]
    fn links_without_expiry_never_expire() {
        let created = Utc::now() - Duration::days(3650);
        let link = link_created_at(created, None);
        assert!(!link.is_expired());
        assert!(!link.is_expired_at(created + Duration::days(100_000)));
        assert_eq!(link.expire_in(), None);
    }

    #[test]
    fn expire_in_counts_down_and_floors_at_zero() {
        let created = Utc::now();
        let link = link_created_at(created, Some(300));

        let mut previous = i64::MAX;
        for elapsed in [0, 1, 150, 299, 300, 301, 10_000] {
            let remaining = link
                .expire_in_at(created + Duration::seconds(elapsed))
                .unwrap();
            assert!(remaining <= previous);
            assert!(remaining >= 0);
            previous = remaining;
        }

        assert_eq!(link.expire_in_at(created), Some(300));
        assert_eq!(link.expire_in_at(created + Duration::seconds(10_000)), Some(0));
    }

    #[test]
    fn expiry_boundary() {
        let created = Utc::now();
        let link = link_created_at(created, Some(3));
        assert!(!link.is_expired_at(created + Duration::milliseconds(2999)));
        assert!(link.is_expired_at(created + Duration::seconds(3)));
    }

    #[test]
    fn group_links_by_preset_name() {
        let now = Utc::now();
        let image_id = Uuid::new_v4();
        let links = vec![
            PresetLink {
                preset_name: "Thumbnail 200px".into(),
                link: link_created_at(now, None),
            },
            PresetLink {
                preset_name: "Original".into(),
                link: link_created_at(now, Some(600)),
            },
            PresetLink {
                preset_name: "Thumbnail 200px".into(),
                link: ImageUrl { image_id, ..link_created_at(now, Some(0)) },
            },
        ];

        let grouped = group_links(&links, now, |id| format!("http://test/image-urls/{id}"));

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["Thumbnail 200px"].len(), 2);
        assert!(!grouped["Thumbnail 200px"][0].expired);
        assert_eq!(grouped["Thumbnail 200px"][0].expire_in, None);
        assert!(grouped["Thumbnail 200px"][1].expired);
        assert_eq!(grouped["Original"][0].expire_in, Some(600));
        assert_eq!(
            grouped["Original"][0].url,
            format!("http://test/image-urls/{}", links[1].link.id)
        );
    }
}

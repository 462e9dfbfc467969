
use chrono::{Duration, Utc};
use image_links::{
    entities::{image::UploadedImage, image_url::ImageUrl, preset::ImagePreset},
    errors::AppError,
    repositories::{
        account::AccountRepository,
        image::ImageRepository,
        sqlx_repo::{SqlxAccountRepo, SqlxImageRepo},
    },
};
use sqlx::PgPool;
use test_utils::pg_pool;
use uuid::{uuid, Uuid};

// Seeded by the initial migration.
const PREMIUM_PLAN: Uuid = uuid!("0b7e5d1c-5a38-4a8e-8f0e-6c1d2b000002");
const ENTERPRISE_PLAN: Uuid = uuid!("0b7e5d1c-5a38-4a8e-8f0e-6c1d2b000003");
const THUMBNAIL_200: Uuid = uuid!("6f2d3c0a-0d1e-4c36-9d0a-2a1f1c000200");

async fn insert_user(pool: &PgPool, plan_id: Option<Uuid>) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, username, plan_id) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(format!("pg-{}", id))
        .bind(plan_id)
        .execute(pool)
        .await
        .expect("Failed to insert user");
    id
}

async fn premium_presets(pool: &PgPool) -> Vec<ImagePreset> {
    let accounts = SqlxAccountRepo::new(pool.clone());
    let user_id = insert_user(pool, Some(PREMIUM_PLAN)).await;
    accounts.get_account(&user_id).await.unwrap().unwrap().presets
}

async fn count_images(pool: &PgPool, id: &Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM uploaded_images WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[actix_rt::test]
async fn premium_account_has_three_presets_sorted_by_name() {
    let Some(pool) = pg_pool().await else { return };
    let accounts = SqlxAccountRepo::new(pool.clone());
    let user_id = insert_user(&pool, Some(PREMIUM_PLAN)).await;

    let account = accounts.get_account(&user_id).await.unwrap().unwrap();

    assert_eq!(account.user.id, user_id);
    assert_eq!(account.plan.as_ref().unwrap().name, "Premium");
    assert!(!account.can_generate_expiring_links());
    let names: Vec<&str> = account.presets.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Original", "Thumbnail 200px", "Thumbnail 400px"]);
}

#[actix_rt::test]
async fn enterprise_and_planless_accounts() {
    let Some(pool) = pg_pool().await else { return };
    let accounts = SqlxAccountRepo::new(pool.clone());

    let enterprise = insert_user(&pool, Some(ENTERPRISE_PLAN)).await;
    let account = accounts.get_account(&enterprise).await.unwrap().unwrap();
    assert!(account.can_generate_expiring_links());
    assert_eq!(account.presets.len(), 3);

    let planless = insert_user(&pool, None).await;
    let account = accounts.get_account(&planless).await.unwrap().unwrap();
    assert!(account.plan.is_none());
    assert!(account.presets.is_empty());

    assert!(accounts.get_account(&Uuid::new_v4()).await.unwrap().is_none());
}

#[actix_rt::test]
async fn create_image_rolls_back_when_a_preset_is_unknown() {
    let Some(pool) = pg_pool().await else { return };
    let images = SqlxImageRepo::new(pool.clone());
    let user_id = insert_user(&pool, Some(PREMIUM_PLAN)).await;

    let image = UploadedImage::new(user_id, "a.png");
    let links = vec![
        ImageUrl::new(THUMBNAIL_200, image.id, None),
        ImageUrl::new(Uuid::new_v4(), image.id, None),
    ];

    assert!(images.create_image(&image, &links).await.is_err());
    assert_eq!(count_images(&pool, &image.id).await, 0);
    assert!(images.find_link(&links[0].id).await.unwrap().is_none());
}

#[actix_rt::test]
async fn find_link_joins_preset_and_image() {
    let Some(pool) = pg_pool().await else { return };
    let images = SqlxImageRepo::new(pool.clone());
    let user_id = insert_user(&pool, Some(PREMIUM_PLAN)).await;

    let image = UploadedImage::new(user_id, "cat.png");
    let link = ImageUrl::new(THUMBNAIL_200, image.id, Some(300));
    images.create_image(&image, std::slice::from_ref(&link)).await.unwrap();

    let found = images.find_link(&link.id).await.unwrap().unwrap();
    assert_eq!(found.link.id, link.id);
    assert_eq!(found.link.expire, Some(300));
    assert_eq!(found.preset.id, THUMBNAIL_200);
    assert_eq!(found.preset.name, "Thumbnail 200px");
    assert_eq!(found.preset.height, Some(200));
    assert_eq!(found.preset.width, None);
    assert_eq!(found.image.id, image.id);
    assert_eq!(found.image.user_id, user_id);
    assert_eq!(found.image.image_path, image.image_path);

    assert!(images.find_link(&Uuid::new_v4()).await.unwrap().is_none());
}

#[actix_rt::test]
async fn list_links_orders_batches_then_preset_names() {
    let Some(pool) = pg_pool().await else { return };
    let images = SqlxImageRepo::new(pool.clone());
    let presets = premium_presets(&pool).await;
    let user_id = insert_user(&pool, Some(PREMIUM_PLAN)).await;

    let base = Utc::now() - Duration::minutes(5);
    let image = UploadedImage::new(user_id, "a.png");

    let mut first = ImageUrl::batch(&presets, image.id, None);
    first.reverse();
    first.iter_mut().for_each(|link| link.created_at = base);
    let mut second = ImageUrl::batch(&presets, image.id, Some(600));
    second.iter_mut().for_each(|link| link.created_at = base + Duration::seconds(1));

    images.create_image(&image, &first).await.unwrap();
    images.add_links(&image.id, &second).await.unwrap();

    let listed = images.list_links(&[image.id]).await.unwrap();
    let order: Vec<(&str, Option<i64>)> = listed
        .iter()
        .map(|l| (l.preset_name.as_str(), l.link.expire))
        .collect();
    assert_eq!(
        order,
        [
            ("Original", None),
            ("Thumbnail 200px", None),
            ("Thumbnail 400px", None),
            ("Original", Some(600)),
            ("Thumbnail 200px", Some(600)),
            ("Thumbnail 400px", Some(600)),
        ]
    );
}

#[actix_rt::test]
async fn add_links_to_unknown_image_is_not_found() {
    let Some(pool) = pg_pool().await else { return };
    let images = SqlxImageRepo::new(pool.clone());

    let missing = Uuid::new_v4();
    let links = vec![ImageUrl::new(THUMBNAIL_200, missing, None)];

    assert!(matches!(
        images.add_links(&missing, &links).await,
        Err(AppError::NotFound(_))
    ));
}

#[actix_rt::test]
async fn delete_image_removes_links_and_reports_their_ids() {
    let Some(pool) = pg_pool().await else { return };
    let images = SqlxImageRepo::new(pool.clone());
    let presets = premium_presets(&pool).await;
    let user_id = insert_user(&pool, Some(PREMIUM_PLAN)).await;

    let image = UploadedImage::new(user_id, "a.png");
    let links = ImageUrl::batch(&presets, image.id, None);
    images.create_image(&image, &links).await.unwrap();

    let stranger = insert_user(&pool, None).await;
    assert!(images.delete_image(&image.id, &stranger).await.unwrap().is_none());
    assert_eq!(count_images(&pool, &image.id).await, 1);
    assert_eq!(images.list_links(&[image.id]).await.unwrap().len(), 3);

    let deleted = images.delete_image(&image.id, &user_id).await.unwrap().unwrap();
    assert_eq!(deleted.image.id, image.id);
    let mut expected: Vec<Uuid> = links.iter().map(|link| link.id).collect();
    let mut removed = deleted.link_ids.clone();
    expected.sort();
    removed.sort();
    assert_eq!(removed, expected);

    assert_eq!(count_images(&pool, &image.id).await, 0);
    assert!(images.list_links(&[image.id]).await.unwrap().is_empty());
    assert!(images.find_link(&links[0].id).await.unwrap().is_none());
}

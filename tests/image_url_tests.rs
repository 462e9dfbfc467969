
use std::time::Duration;

use image::{GenericImageView, ImageFormat};
use image_links::{
    entities::image_url::ImageUrl,
    repositories::{image::ImageRepository, storage::ImageStorage},
};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use test_utils::*;
use uuid::Uuid;

async fn uploaded_image(app: &TestApp, tier: Tier) -> (TestUser, Value) {
    let user = app.create_user(tier);
    let body = app.upload_png(&user, None).await;
    (user, body)
}

fn image_id(body: &Value) -> Uuid {
    Uuid::parse_str(body["id"].as_str().unwrap()).unwrap()
}

/// Adds a link with the given expiry next to the image's existing "Original" link.
async fn add_link(app: &TestApp, body: &Value, expire: Option<i64>) -> Uuid {
    let image_id = image_id(body);
    let original = link_id(&link_urls(body, "Original")[0]);
    let preset_id = app
        .store
        .links_for_image(&image_id)
        .into_iter()
        .find(|link| link.id == original)
        .map(|link| link.preset_id)
        .unwrap();

    let link = ImageUrl::new(preset_id, image_id, expire);
    app.store.add_links(&image_id, std::slice::from_ref(&link)).await.unwrap();
    link.id
}

#[actix_rt::test]
async fn thumbnail_is_resized_and_cached() {
    let app = TestApp::spawn().await;
    let (_, body) = uploaded_image(&app, Tier::Premium).await;
    let url = link_urls(&body, "Thumbnail 200px").remove(0);

    let first = app.client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["content-type"], "image/png");
    assert_eq!(first.headers()["x-cache"], "MISS");
    let disposition = first.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.starts_with("inline"), "{disposition}");
    assert!(disposition.contains("Thumbnail 200px_sample.png"), "{disposition}");
    let first_bytes = first.bytes().await.unwrap();

    let thumbnail = image::load_from_memory_with_format(&first_bytes, ImageFormat::Png).unwrap();
    assert_eq!(thumbnail.dimensions(), (200, 200));
    assert_eq!(app.cache.len(), 1);

    let second = app.client.get(&url).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(second.bytes().await.unwrap(), first_bytes);
}

#[actix_rt::test]
async fn original_preset_serves_the_uploaded_bytes() {
    let app = TestApp::spawn().await;
    let user = app.create_user(Tier::Premium);
    let source = png_bytes(120, 80);
    let response = app.upload(&user, source.clone(), None).await;
    let body: Value = response.json().await.unwrap();
    let url = link_urls(&body, "Original").remove(0);

    let resolved = app.client.get(&url).send().await.unwrap();

    assert_eq!(resolved.status(), StatusCode::OK);
    assert_eq!(resolved.bytes().await.unwrap().to_vec(), source);
}

#[actix_rt::test]
async fn jpeg_thumbnail_keeps_its_format() {
    let app = TestApp::spawn().await;
    let user = app.create_user(Tier::Premium);
    let response = app.upload_named(&user, "photo.jpg", jpeg_bytes(600, 300), None).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    let url = link_urls(&body, "Thumbnail 400px").remove(0);

    let resolved = app.client.get(&url).send().await.unwrap();

    assert_eq!(resolved.status(), StatusCode::OK);
    assert_eq!(resolved.headers()["content-type"], "image/jpeg");
    let bytes = resolved.bytes().await.unwrap();
    let thumbnail = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg).unwrap();
    assert_eq!(thumbnail.dimensions(), (800, 400));
}

#[actix_rt::test]
async fn zero_second_link_is_never_served() {
    let app = TestApp::spawn().await;
    let (_, body) = uploaded_image(&app, Tier::Enterprise).await;
    let link = add_link(&app, &body, Some(0)).await;

    let response = app.client.get(app.url(&format!("/image-urls/{link}"))).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app.cache.is_empty());
}

#[actix_rt::test]
async fn link_stops_resolving_once_expired() {
    let app = TestApp::spawn().await;
    let (_, body) = uploaded_image(&app, Tier::Enterprise).await;
    let link = add_link(&app, &body, Some(3)).await;
    let url = app.url(&format!("/image-urls/{link}"));

    let live = app.client.get(&url).send().await.unwrap();
    assert_eq!(live.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(3100)).await;

    let expired = app.client.get(&url).send().await.unwrap();
    assert_eq!(expired.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn expired_link_is_reported_in_image_detail() {
    let app = TestApp::spawn().await;
    let (user, body) = uploaded_image(&app, Tier::Enterprise).await;
    add_link(&app, &body, Some(0)).await;

    let detail: Value = app
        .client
        .get(app.url(&format!("/api/v1/images/{}", image_id(&body))))
        .bearer_auth(&user.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let originals = detail["image_links"]["Original"].as_array().unwrap();
    assert_eq!(originals.len(), 2);
    let expired: Vec<&Value> = originals.iter().filter(|link| link["expired"] == true).collect();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0]["expire_in"], 0);
}

#[actix_rt::test]
async fn unknown_and_malformed_links_are_not_found() {
    let app = TestApp::spawn().await;

    let unknown = app
        .client
        .get(app.url(&format!("/image-urls/{}", Uuid::new_v4())))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let malformed = app.client.get(app.url("/image-urls/1")).send().await.unwrap();
    assert_eq!(malformed.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn resolution_only_answers_get() {
    let app = TestApp::spawn().await;
    let (_, body) = uploaded_image(&app, Tier::Premium).await;
    let url = link_urls(&body, "Original").remove(0);

    for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::HEAD, Method::OPTIONS] {
        let response = app.client.request(method.clone(), &url).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
        assert_eq!(response.headers()["allow"], "GET");
    }

    let malformed = app.client.post(app.url("/image-urls/1")).send().await.unwrap();
    assert_eq!(malformed.status(), StatusCode::METHOD_NOT_ALLOWED);

    assert_eq!(app.store.link_count(), 3);
}

#[actix_rt::test]
async fn missing_source_file_is_a_server_error() {
    let app = TestApp::spawn().await;
    let (user, body) = uploaded_image(&app, Tier::Premium).await;
    let path = format!("{}/{}/sample.png", user.id, image_id(&body));
    assert!(app.storage.contains(&path));
    app.storage.delete(&path).await.unwrap();

    let url = link_urls(&body, "Thumbnail 200px").remove(0);
    let response = app.client.get(&url).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Internal server error");
}

#[actix_rt::test]
async fn resolution_ignores_authorization_header() {
    let app = TestApp::spawn().await;
    let (_, body) = uploaded_image(&app, Tier::Basic).await;
    let url = link_urls(&body, "Thumbnail 200px").remove(0);

    let response = app
        .client
        .get(&url)
        .bearer_auth("garbage-token")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use futures_util::TryStreamExt;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::image::{ExpireUpdate, ImageResponse, ImageUpload},
    errors::AppError,
    use_cases::extractors::ThrottledUser,
    AppState,
};

/// Absolute resolution URLs, built from the host the request came in on.
pub fn link_url_builder(req: &HttpRequest) -> impl Fn(&Uuid) -> String + use<> {
    let info = req.connection_info();
    let base = format!("{}://{}", info.scheme(), info.host());
    move |id| format!("{}/image-urls/{}", base, id)
}

#[instrument(skip(user, state, req, payload), fields(user_id = %user.0))]
pub async fn upload_image(
    user: ThrottledUser,
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: Multipart,
) -> Result<impl Responder, AppError> {
    let upload = read_upload_form(payload, state.max_upload_bytes).await?;

    let created = state.image_handler.upload(&user.0, upload).await?;

    Ok(HttpResponse::Created().json(created.to_response(link_url_builder(&req))))
}

#[instrument(skip(user, state, req), fields(user_id = %user.0))]
pub async fn list_images(
    user: ThrottledUser,
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<impl Responder, AppError> {
    let url_for = link_url_builder(&req);
    let images: Vec<ImageResponse> = state
        .image_handler
        .list(&user.0)
        .await?
        .iter()
        .map(|image| image.to_response(&url_for))
        .collect();

    Ok(HttpResponse::Ok().json(images))
}

#[instrument(skip(user, state, req), fields(user_id = %user.0))]
pub async fn get_image(
    user: ThrottledUser,
    image_id: web::Path<Uuid>,
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<impl Responder, AppError> {
    let image = state.image_handler.get(&user.0, &image_id).await?;
    Ok(HttpResponse::Ok().json(image.to_response(link_url_builder(&req))))
}

#[instrument(skip(user, state, req, data), fields(user_id = %user.0))]
pub async fn update_image(
    user: ThrottledUser,
    image_id: web::Path<Uuid>,
    state: web::Data<AppState>,
    req: HttpRequest,
    data: web::Json<ExpireUpdate>,
) -> Result<impl Responder, AppError> {
    let image = state
        .image_handler
        .update_expire(&user.0, &image_id, data.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(image.to_response(link_url_builder(&req))))
}

#[instrument(skip(user, state), fields(user_id = %user.0))]
pub async fn delete_image(
    user: ThrottledUser,
    image_id: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<impl Responder, AppError> {
    state.image_handler.delete(&user.0, &image_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Reads the `image` file and optional `expire` field. Other fields are drained.
async fn read_upload_form(mut payload: Multipart, max_bytes: usize) -> Result<ImageUpload, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut expire: Option<i64> = None;

    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("image") => {
                let file_name = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .unwrap_or("image")
                    .to_string();
                let bytes = read_field(&mut field, max_bytes).await?;
                file = Some((file_name, bytes));
            }
            Some("expire") => {
                let raw = read_field(&mut field, 64).await?;
                let text = String::from_utf8_lossy(&raw);
                let text = text.trim();
                if !text.is_empty() {
                    let value = text
                        .parse::<i64>()
                        .map_err(|_| AppError::field("expire", "A valid integer is required."))?;
                    expire = Some(value);
                }
            }
            _ => {
                while field.try_next().await?.is_some() {}
            }
        }
    }

    let (file_name, bytes) = file.ok_or_else(|| AppError::field("image", "No file was submitted."))?;

    Ok(ImageUpload { file_name, bytes, expire })
}

async fn read_field(field: &mut Field, max_bytes: usize) -> Result<Vec<u8>, AppError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await? {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "Field exceeds the {} byte limit",
                max_bytes
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

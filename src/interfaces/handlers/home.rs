use actix_web::{get, HttpResponse, Responder};

#[get("/")]
pub async fn home() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "message": "Image links API",
        "status": "Ok",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "images": "/api/v1/images",
            "account": "/api/v1/users/me",
            "image_urls": "/image-urls/{id}",
            "health": "/health"
        }
    }))
}

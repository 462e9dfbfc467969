use actix_web::web;
use crate::handlers::image_urls;

/// Resolution is read-only: anything but GET answers 405.
pub fn config_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/image-urls/{link_id}")
            .name("image_url")
            .route(web::get().to(image_urls::resolve_link))
            .default_service(web::to(image_urls::method_not_allowed))
    );
}

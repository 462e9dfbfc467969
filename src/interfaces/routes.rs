use actix_web::web;

use crate::handlers::{home::home, system::health_check};

mod image_urls;
mod images;
mod users;
mod json_error;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(home);
    cfg.service(health_check);

    cfg.service(
        web::scope("/api/v1")
            .configure(images::config_routes)
            .configure(users::config_routes)
    );

    cfg.configure(image_urls::config_routes);
    cfg.configure(json_error::config_routes);
}

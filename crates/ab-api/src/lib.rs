//! # ab-api
//!
//! The web routing layer for anon-board.

pub mod handlers;
pub mod middleware;

use actix_web::web;

/// Registers every route on the given service config.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(handlers::index))
        .route("/post/{title}/{content}", web::get().to(handlers::post_root))
        .service(
            web::resource("/comment/{id}")
                .route(web::get().to(handlers::view_comment))
                .route(web::post().to(handlers::post_comment)),
        )
        .route("/like/{id}", web::get().to(handlers::like))
        .route("/dislike/{id}", web::get().to(handlers::dislike))
        .route("/api/tree/{id}", web::get().to(handlers::api_tree));
}

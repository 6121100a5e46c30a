//! HTTP surface: actix-web handlers wired onto [`state::AppState`], grounded
//! on the teacher's `agent_control::http_server` idiom -- one `App::new()`
//! closure in `main.rs`, handlers here take their dependency via `web::Data`.

pub mod components;
pub mod configurations;
pub mod error;
pub mod health;
pub mod meta;
pub mod options;
pub mod sessions;
pub mod sources;
pub mod state;
pub mod util;

use std::sync::Arc;

use actix_web::web;

pub use error::ApiError;
pub use state::AppState;

use crate::options::middleware::OptionsRefresh;
use crate::options::OptionsCache;

/// Registers every route named in spec.md §6's endpoint table. `/healthz`
/// sits outside the `/v2`/`/v3` scopes and is never wrapped by
/// [`OptionsRefresh`] -- spec.md §4.11 requires it to report a store outage
/// rather than mask it behind a failed refresh.
pub fn configure(cfg: &mut web::ServiceConfig, options: Arc<OptionsCache>) {
    cfg.route("/healthz", web::get().to(health::healthz))
        .route("/versions", web::get().to(meta::versions))
        .route("/v2", web::get().to(meta::v2))
        .route("/v3", web::get().to(meta::v3));

    cfg.service(
        web::scope("/v2")
            .wrap(OptionsRefresh { cache: options.clone() })
            .route("/options", web::get().to(options::get_v2))
            .route("/options", web::patch().to(options::patch_v2))
            .route("/components", web::get().to(components::list_v2))
            .route("/components/{id}", web::get().to(components::get_one_v2))
            .route("/components/{id}", web::put().to(components::put_v2))
            .route("/components", web::patch().to(components::patch_v2))
            .route("/components/{id}", web::delete().to(components::delete))
            .route("/configurations", web::get().to(configurations::list_v2))
            .route("/configurations/{name}", web::get().to(configurations::get_one_v2))
            .route("/configurations/{name}", web::put().to(configurations::put_v2))
            .route("/configurations/{name}", web::patch().to(configurations::patch_v2))
            .route("/configurations/{name}", web::delete().to(configurations::delete_v2))
            .route("/sessions", web::get().to(sessions::list))
            .route("/sessions", web::post().to(sessions::create_v2))
            .route("/sessions", web::delete().to(sessions::delete_bulk))
            .route("/sessions/{name}", web::get().to(sessions::get_one))
            .route("/sessions/{name}", web::patch().to(sessions::patch))
            .route("/sessions/{name}", web::delete().to(sessions::delete)),
    );

    cfg.service(
        web::scope("/v3")
            .wrap(OptionsRefresh { cache: options })
            .route("/options", web::get().to(options::get_v3))
            .route("/options", web::patch().to(options::patch_v3))
            .route("/components", web::get().to(components::list_v3))
            .route("/components/{id}", web::get().to(components::get_one_v3))
            .route("/components/{id}", web::put().to(components::put_v3))
            .route("/components", web::patch().to(components::patch_v3))
            .route("/components/{id}", web::delete().to(components::delete))
            .route("/configurations", web::get().to(configurations::list_v3))
            .route("/configurations/{name}", web::get().to(configurations::get_one_v3))
            .route("/configurations/{name}", web::put().to(configurations::put_v3))
            .route("/configurations/{name}", web::patch().to(configurations::patch_v3))
            .route("/configurations/{name}", web::delete().to(configurations::delete_v3))
            .route("/sources", web::get().to(sources::list))
            .route("/sources", web::post().to(sources::create))
            .route("/sources/{name}", web::get().to(sources::get_one))
            .route("/sources/{name}", web::patch().to(sources::patch))
            .route("/sources/{name}", web::delete().to(sources::delete))
            .route("/sessions", web::get().to(sessions::list))
            .route("/sessions", web::post().to(sessions::create_v3))
            .route("/sessions", web::delete().to(sessions::delete_bulk))
            .route("/sessions/{name}", web::get().to(sessions::get_one))
            .route("/sessions/{name}", web::patch().to(sessions::patch))
            .route("/sessions/{name}", web::delete().to(sessions::delete)),
    );
}

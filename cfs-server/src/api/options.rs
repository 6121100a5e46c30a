use actix_web::{web, HttpResponse};

use super::error::ApiError;
use super::state::AppState;
use super::util::ApiVersion;
use crate::schema::descriptor::{Direction, OPTIONS_FIELDS};
use crate::schema::translate::translate;

fn render(snapshot: &crate::options::OptionsSnapshot, version: ApiVersion) -> HttpResponse {
    let value = serde_json::to_value(snapshot).expect("Options serializes");
    match version {
        ApiVersion::V3 => HttpResponse::Ok().json(value),
        ApiVersion::V2 => HttpResponse::Ok().json(translate(&value, OPTIONS_FIELDS, Direction::V3ToV2)),
    }
}

pub async fn get_v2(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(render(&state.options.current(), ApiVersion::V2))
}

pub async fn get_v3(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(render(&state.options.current(), ApiVersion::V3))
}

async fn patch(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
    version: ApiVersion,
) -> Result<HttpResponse, ApiError> {
    let patch = match version {
        ApiVersion::V3 => body.into_inner(),
        ApiVersion::V2 => translate(&body.into_inner(), OPTIONS_FIELDS, Direction::V2ToV3),
    };
    let snapshot = web::block(move || state.options.patch(patch)).await.map_err(|_| {
        ApiError::Internal("options patch task panicked".to_string())
    })??;
    Ok(render(&snapshot, version))
}

pub async fn patch_v2(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, ApiError> {
    patch(state, body, ApiVersion::V2).await
}

pub async fn patch_v3(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, ApiError> {
    patch(state, body, ApiVersion::V3).await
}

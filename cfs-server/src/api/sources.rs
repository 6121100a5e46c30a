use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::Value;

use super::error::ApiError;
use super::state::AppState;
use crate::model::source::Source;

fn paging(req: &HttpRequest) -> (usize, Option<String>) {
    let mut limit = 100usize;
    let mut after = None;
    for (key, value) in url::form_urlencoded::parse(req.query_string().as_bytes()) {
        match key.as_ref() {
            "limit" => limit = value.parse().unwrap_or(limit),
            "after_id" => after = Some(value.to_string()),
            _ => {}
        }
    }
    (limit, after)
}

pub async fn get_one(state: web::Data<AppState>, name: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let source = web::block(move || state.sources.get(&name))
        .await
        .map_err(|_| ApiError::Internal("source get task panicked".to_string()))??;
    Ok(HttpResponse::Ok().json(source))
}

pub async fn list(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let (limit, after_id) = paging(&req);
    let (sources, has_more) = web::block(move || state.sources.list(limit, after_id.as_deref()))
        .await
        .map_err(|_| ApiError::Internal("source list task panicked".to_string()))??;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "sources": sources,
        "next_page_exists": has_more,
    })))
}

pub async fn create(state: web::Data<AppState>, body: web::Json<Source>) -> Result<HttpResponse, ApiError> {
    let source = body.into_inner();
    let saved = web::block(move || state.sources.create(source))
        .await
        .map_err(|_| ApiError::Internal("source create task panicked".to_string()))??;
    Ok(HttpResponse::Created().json(saved))
}

pub async fn patch(
    state: web::Data<AppState>,
    name: web::Path<String>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let patch = body.into_inner();
    let saved = web::block(move || state.sources.patch(&name, patch))
        .await
        .map_err(|_| ApiError::Internal("source patch task panicked".to_string()))??;
    Ok(HttpResponse::Ok().json(saved))
}

pub async fn delete(state: web::Data<AppState>, name: web::Path<String>) -> Result<HttpResponse, ApiError> {
    web::block(move || state.sources.delete(&name))
        .await
        .map_err(|_| ApiError::Internal("source delete task panicked".to_string()))??;
    Ok(HttpResponse::NoContent().finish())
}

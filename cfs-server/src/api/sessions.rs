use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::Value;

use super::error::ApiError;
use super::state::AppState;
use super::util::{parse_tag_list, ApiVersion};
use crate::model::session::{Session, Succeeded};
use crate::session::SessionFilters;

/// No legacy descriptor table exists for sessions -- v2 and v3 share the
/// same wire shape here, unlike components/configurations/sources/options.
fn parse_succeeded(raw: &str) -> Option<Succeeded> {
    match raw {
        "none" => Some(Succeeded::None),
        "unknown" => Some(Succeeded::Unknown),
        "false" => Some(Succeeded::False),
        "true" => Some(Succeeded::True),
        _ => None,
    }
}

fn filters_from_query(req: &HttpRequest) -> SessionFilters {
    let mut filters = SessionFilters::default();
    for (key, value) in url::form_urlencoded::parse(req.query_string().as_bytes()) {
        match key.as_ref() {
            "min_age" => filters.min_age = Some(value.to_string()),
            "max_age" => filters.max_age = Some(value.to_string()),
            "status" => filters.status = Some(value.to_string()),
            "succeeded" => filters.succeeded = parse_succeeded(&value),
            "name_contains" => filters.name_contains = Some(value.to_string()),
            "tags" => filters.tags = parse_tag_list(&value),
            _ => {}
        }
    }
    filters
}

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
    let session = web::block(move || state.sessions.get(&name))
        .await
        .map_err(|_| ApiError::Internal("session get task panicked".to_string()))??;
    Ok(HttpResponse::Ok().json(session))
}

pub async fn list(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let filters = filters_from_query(&req);
    let (limit, after_id) = paging(&req);
    let sessions = web::block(move || state.sessions.list(&filters, limit, after_id.as_deref()))
        .await
        .map_err(|_| ApiError::Internal("session list task panicked".to_string()))??;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "sessions": sessions })))
}

async fn create(state: web::Data<AppState>, body: web::Json<Session>, version: ApiVersion) -> Result<HttpResponse, ApiError> {
    let session = body.into_inner();
    let is_v3 = version == ApiVersion::V3;
    let default_ansible_config = state.options.current().default_ansible_config.clone();
    let saved = web::block(move || {
        let configurations = state.configurations.clone();
        state.sessions.create(
            session,
            |name| configurations.get(name).is_ok(),
            is_v3,
            &default_ansible_config,
        )
    })
    .await
    .map_err(|_| ApiError::Internal("session create task panicked".to_string()))??;
    Ok(HttpResponse::Created().json(saved))
}

pub async fn create_v2(state: web::Data<AppState>, body: web::Json<Session>) -> Result<HttpResponse, ApiError> {
    create(state, body, ApiVersion::V2).await
}

pub async fn create_v3(state: web::Data<AppState>, body: web::Json<Session>) -> Result<HttpResponse, ApiError> {
    create(state, body, ApiVersion::V3).await
}

pub async fn patch(
    state: web::Data<AppState>,
    name: web::Path<String>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let status_patch = body.into_inner();
    let saved = web::block(move || state.sessions.patch_status(&name, status_patch))
        .await
        .map_err(|_| ApiError::Internal("session patch task panicked".to_string()))??;
    Ok(HttpResponse::Ok().json(saved))
}

pub async fn delete(state: web::Data<AppState>, name: web::Path<String>) -> Result<HttpResponse, ApiError> {
    web::block(move || state.sessions.delete(&name))
        .await
        .map_err(|_| ApiError::Internal("session delete task panicked".to_string()))??;
    Ok(HttpResponse::NoContent().finish())
}

/// Bulk delete over the same filter set GET uses, per spec.md §6's session
/// query surface doubling as the delete-by-filter contract.
pub async fn delete_bulk(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let filters = filters_from_query(&req);
    let deleted = web::block(move || state.sessions.bulk_delete(&filters))
        .await
        .map_err(|_| ApiError::Internal("session bulk delete task panicked".to_string()))??;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "deleted": deleted })))
}

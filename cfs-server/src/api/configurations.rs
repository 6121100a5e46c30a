use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::Value;

use super::error::ApiError;
use super::state::AppState;
use super::util::{tenancy_context, ApiVersion};
use crate::model::configuration::Configuration;
use crate::schema::descriptor::{Direction, CONFIGURATION_FIELDS};
use crate::schema::translate::translate;

fn render(configuration: &Configuration, version: ApiVersion) -> Value {
    let value = serde_json::to_value(configuration).expect("Configuration serializes");
    match version {
        ApiVersion::V3 => value,
        ApiVersion::V2 => translate(&value, CONFIGURATION_FIELDS, Direction::V3ToV2),
    }
}

fn paging(req: &HttpRequest) -> (usize, Option<String>, Option<bool>) {
    let mut limit = 100usize;
    let mut after = None;
    let mut in_use = None;
    for (key, value) in url::form_urlencoded::parse(req.query_string().as_bytes()) {
        match key.as_ref() {
            "limit" => limit = value.parse().unwrap_or(limit),
            "after_id" => after = Some(value.to_string()),
            "in_use" => in_use = value.parse().ok(),
            _ => {}
        }
    }
    (limit, after, in_use)
}

/// Tenancy applies to v3 only, per spec.md §4.9 -- v2 callers are always
/// treated as admin regardless of the `Cray-Tenant-Name` header.
fn effective_context(req: &HttpRequest, version: ApiVersion) -> crate::tenancy::TenancyContext {
    match version {
        ApiVersion::V3 => tenancy_context(req),
        ApiVersion::V2 => crate::tenancy::TenancyContext::Admin,
    }
}

/// Confirms a named tenant actually exists before the registry call runs;
/// a no-op for the admin context.
async fn check_tenant(
    state: &web::Data<AppState>,
    context: &crate::tenancy::TenancyContext,
) -> Result<(), ApiError> {
    let tenancy = state.tenancy.clone();
    let context = context.clone();
    web::block(move || tenancy.reject_invalid_tenant(&context))
        .await
        .map_err(|_| ApiError::Internal("tenancy check task panicked".to_string()))??;
    Ok(())
}

async fn get_one(
    state: web::Data<AppState>,
    name: web::Path<String>,
    version: ApiVersion,
) -> Result<HttpResponse, ApiError> {
    let configuration = web::block(move || state.configurations.get(&name))
        .await
        .map_err(|_| ApiError::Internal("configuration get task panicked".to_string()))??;
    Ok(HttpResponse::Ok().json(render(&configuration, version)))
}

pub async fn get_one_v2(state: web::Data<AppState>, name: web::Path<String>) -> Result<HttpResponse, ApiError> {
    get_one(state, name, ApiVersion::V2).await
}

pub async fn get_one_v3(state: web::Data<AppState>, name: web::Path<String>) -> Result<HttpResponse, ApiError> {
    get_one(state, name, ApiVersion::V3).await
}

async fn list(state: web::Data<AppState>, req: HttpRequest, version: ApiVersion) -> Result<HttpResponse, ApiError> {
    let (limit, after_id, in_use) = paging(&req);
    let (configurations, has_more) = web::block(move || state.configurations.list(in_use, limit, after_id.as_deref()))
        .await
        .map_err(|_| ApiError::Internal("configuration list task panicked".to_string()))??;
    let entries: Vec<Value> = configurations.iter().map(|c| render(c, version)).collect();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "configurations": entries,
        "next_page_exists": has_more,
    })))
}

pub async fn list_v2(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    list(state, req, ApiVersion::V2).await
}

pub async fn list_v3(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    list(state, req, ApiVersion::V3).await
}

async fn put(
    state: web::Data<AppState>,
    name: web::Path<String>,
    req: HttpRequest,
    body: web::Json<Value>,
    version: ApiVersion,
) -> Result<HttpResponse, ApiError> {
    let drop_branches = url::form_urlencoded::parse(req.query_string().as_bytes())
        .any(|(k, v)| k == "drop_branches" && v == "true");
    let context = effective_context(&req, version);
    check_tenant(&state, &context).await?;

    let mut value = match version {
        ApiVersion::V3 => body.into_inner(),
        ApiVersion::V2 => translate(&body.into_inner(), CONFIGURATION_FIELDS, Direction::V2ToV3),
    };
    if let Value::Object(obj) = &mut value {
        obj.insert("name".to_string(), Value::String(name.into_inner()));
    }
    let configuration: Configuration =
        serde_json::from_value(value).map_err(|e| ApiError::Validation(e.to_string()))?;

    let saved = web::block(move || {
        state
            .configurations
            .put(configuration, drop_branches, context.name(), context.is_admin())
    })
    .await
    .map_err(|_| ApiError::Internal("configuration put task panicked".to_string()))??;
    Ok(HttpResponse::Ok().json(render(&saved, version)))
}

pub async fn put_v2(
    state: web::Data<AppState>,
    name: web::Path<String>,
    req: HttpRequest,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    put(state, name, req, body, ApiVersion::V2).await
}

pub async fn put_v3(
    state: web::Data<AppState>,
    name: web::Path<String>,
    req: HttpRequest,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    put(state, name, req, body, ApiVersion::V3).await
}

async fn patch(
    state: web::Data<AppState>,
    name: web::Path<String>,
    req: HttpRequest,
    version: ApiVersion,
) -> Result<HttpResponse, ApiError> {
    let context = effective_context(&req, version);
    check_tenant(&state, &context).await?;
    let saved = web::block(move || state.configurations.patch(&name, context.name(), context.is_admin()))
        .await
        .map_err(|_| ApiError::Internal("configuration patch task panicked".to_string()))??;
    Ok(HttpResponse::Ok().json(render(&saved, version)))
}

pub async fn patch_v2(
    state: web::Data<AppState>,
    name: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    patch(state, name, req, ApiVersion::V2).await
}

pub async fn patch_v3(
    state: web::Data<AppState>,
    name: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    patch(state, name, req, ApiVersion::V3).await
}

async fn delete(
    state: web::Data<AppState>,
    name: web::Path<String>,
    req: HttpRequest,
    version: ApiVersion,
) -> Result<HttpResponse, ApiError> {
    let context = effective_context(&req, version);
    check_tenant(&state, &context).await?;
    web::block(move || state.configurations.delete(&name, context.name(), context.is_admin()))
        .await
        .map_err(|_| ApiError::Internal("configuration delete task panicked".to_string()))??;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn delete_v2(
    state: web::Data<AppState>,
    name: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    delete(state, name, req, ApiVersion::V2).await
}

pub async fn delete_v3(
    state: web::Data<AppState>,
    name: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    delete(state, name, req, ApiVersion::V3).await
}

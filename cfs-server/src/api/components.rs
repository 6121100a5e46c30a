use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::Value;

use super::error::ApiError;
use super::state::AppState;
use super::util::{parse_csv, parse_tag_list, ApiVersion};
use crate::component::ComponentFilters;
use crate::schema::descriptor::{Direction, COMPONENT_FIELDS};
use crate::schema::translate::{
    flatten_component_status_for_v2, translate, unflatten_component_status_from_v2,
};

fn filters_from_query(req: &HttpRequest) -> (ComponentFilters, bool, bool) {
    let mut filters = ComponentFilters::default();
    let mut config_details = false;
    let mut state_details = false;
    for (key, value) in url::form_urlencoded::parse(req.query_string().as_bytes()) {
        match key.as_ref() {
            "ids" => filters.ids = parse_csv(&value),
            "status" => filters.status = Some(value.to_string()),
            "enabled" => filters.enabled = value.parse().ok(),
            "config_name" => filters.config_name = Some(value.to_string()),
            "tags" => filters.tags = parse_tag_list(&value),
            "config_details" => config_details = value == "true",
            "state_details" => state_details = value == "true",
            _ => {}
        }
    }
    (filters, config_details, state_details)
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

/// v3 strips raw `state`/`desired_state` entries the handler wasn't asked
/// for; v2 always keeps `state` since legacy clients never learned the flag.
fn render_v3(mut value: Value, state_details: bool) -> Value {
    if !state_details {
        if let Value::Object(obj) = &mut value {
            obj.insert("state".to_string(), Value::Array(Vec::new()));
        }
    }
    value
}

fn render(component: &crate::model::component::Component, version: ApiVersion, state_details: bool) -> Value {
    let mut value = serde_json::to_value(component).expect("Component serializes");
    match version {
        ApiVersion::V3 => render_v3(value, state_details),
        ApiVersion::V2 => {
            // Bake `status` into `commit` on the v3-shaped entries first --
            // COMPONENT_LAYER_FIELDS has no `status` slot, so translate()
            // would silently drop it if this ran afterward.
            if let Some(Value::Array(states)) = value.get_mut("state") {
                for entry in states {
                    flatten_component_status_for_v2(entry);
                }
            }
            translate(&value, COMPONENT_FIELDS, Direction::V3ToV2)
        }
    }
}

fn version_patch_to_v3(body: Value, version: ApiVersion) -> Value {
    match version {
        ApiVersion::V3 => body,
        ApiVersion::V2 => {
            let mut v3 = translate(&body, COMPONENT_FIELDS, Direction::V2ToV3);
            if let Some(Value::Array(states)) = v3.get_mut("state") {
                for entry in states {
                    unflatten_component_status_from_v2(entry);
                }
            }
            if let Some(entry) = v3.get_mut("state_append") {
                unflatten_component_status_from_v2(entry);
            }
            v3
        }
    }
}

async fn get_one(
    state: web::Data<AppState>,
    id: web::Path<String>,
    req: HttpRequest,
    version: ApiVersion,
) -> Result<HttpResponse, ApiError> {
    let (_, config_details, state_details) = filters_from_query(&req);
    let options = state.options.current();
    let component = web::block(move || state.components.get(&id, &options, config_details)).await.map_err(
        |_| ApiError::Internal("component get task panicked".to_string()),
    )??;
    Ok(HttpResponse::Ok().json(render(&component, version, state_details)))
}

pub async fn get_one_v2(
    state: web::Data<AppState>,
    id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    get_one(state, id, req, ApiVersion::V2).await
}

pub async fn get_one_v3(
    state: web::Data<AppState>,
    id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    get_one(state, id, req, ApiVersion::V3).await
}

async fn list(state: web::Data<AppState>, req: HttpRequest, version: ApiVersion) -> Result<HttpResponse, ApiError> {
    let (filters, config_details, state_details) = filters_from_query(&req);
    let (limit, after_id) = paging(&req);
    let options = state.options.current();
    let (components, has_more) = web::block(move || {
        state
            .components
            .list(&filters, limit, after_id.as_deref(), &options, config_details)
    })
    .await
    .map_err(|_| ApiError::Internal("component list task panicked".to_string()))??;

    let entries: Vec<Value> = components
        .iter()
        .map(|c| render(c, version, state_details))
        .collect();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "components": entries,
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
    id: web::Path<String>,
    body: web::Json<Value>,
    version: ApiVersion,
) -> Result<HttpResponse, ApiError> {
    let mut value = version_patch_to_v3(body.into_inner(), version);
    if let Value::Object(obj) = &mut value {
        obj.insert("id".to_string(), Value::String(id.into_inner()));
    }
    let component: crate::model::component::Component = serde_json::from_value(value)
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let saved = web::block(move || state.components.put(component))
        .await
        .map_err(|_| ApiError::Internal("component put task panicked".to_string()))??;
    Ok(HttpResponse::Ok().json(render(&saved, version, true)))
}

pub async fn put_v2(
    state: web::Data<AppState>,
    id: web::Path<String>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    put(state, id, body, ApiVersion::V2).await
}

pub async fn put_v3(
    state: web::Data<AppState>,
    id: web::Path<String>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    put(state, id, body, ApiVersion::V3).await
}

/// Accepts either a list of `{id, ...}` patches or a `{filters, patch}` bulk
/// form, per spec.md §6's PATCH contract for `/components`.
async fn patch(
    state: web::Data<AppState>,
    body: web::Json<Value>,
    version: ApiVersion,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    if let Some(bulk_patch) = body.get("patch") {
        let filters = parse_bulk_filters(body.get("filters").cloned().unwrap_or(Value::Null));
        let patch = version_patch_to_v3(bulk_patch.clone(), version);
        let ids = web::block(move || state.components.patch_bulk(filters, patch))
            .await
            .map_err(|_| ApiError::Internal("component bulk patch task panicked".to_string()))??;
        return Ok(HttpResponse::Ok().json(serde_json::json!({ "patched": ids })));
    }

    let Value::Array(items) = body else {
        return Err(ApiError::Validation(
            "component PATCH body must be a list or a {filters, patch} object".to_string(),
        ));
    };

    let mut results = Vec::with_capacity(items.len());
    for item in items {
        let id = item
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::Validation("component patch entry missing `id`".to_string()))?
            .to_string();
        let patch = version_patch_to_v3(item, version);
        let state = state.clone();
        let id_clone = id.clone();
        let updated = web::block(move || state.components.patch(&id_clone, patch))
            .await
            .map_err(|_| ApiError::Internal("component patch task panicked".to_string()))??;
        results.push(render(&updated, version, true));
    }
    Ok(HttpResponse::Ok().json(results))
}

fn parse_bulk_filters(raw: Value) -> ComponentFilters {
    let mut filters = ComponentFilters::default();
    let Value::Object(obj) = raw else { return filters };
    if let Some(Value::String(s)) = obj.get("ids") {
        filters.ids = parse_csv(s);
    }
    if let Some(Value::String(s)) = obj.get("status") {
        filters.status = Some(s.clone());
    }
    if let Some(Value::Bool(b)) = obj.get("enabled") {
        filters.enabled = Some(*b);
    }
    if let Some(Value::String(s)) = obj.get("config_name") {
        filters.config_name = Some(s.clone());
    }
    if let Some(Value::String(s)) = obj.get("tags") {
        filters.tags = parse_tag_list(s);
    }
    filters
}

pub async fn patch_v2(state: web::Data<AppState>, body: web::Json<Value>) -> Result<HttpResponse, ApiError> {
    patch(state, body, ApiVersion::V2).await
}

pub async fn patch_v3(state: web::Data<AppState>, body: web::Json<Value>) -> Result<HttpResponse, ApiError> {
    patch(state, body, ApiVersion::V3).await
}

pub async fn delete(state: web::Data<AppState>, id: web::Path<String>) -> Result<HttpResponse, ApiError> {
    web::block(move || state.components.delete(&id))
        .await
        .map_err(|_| ApiError::Internal("component delete task panicked".to_string()))??;
    Ok(HttpResponse::NoContent().finish())
}

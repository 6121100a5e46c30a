use actix_web::HttpResponse;
use serde::Serialize;

#[derive(Serialize)]
struct VersionEntry {
    major: u32,
    minor: u32,
    version: &'static str,
    comment: &'static str,
}

const V2: VersionEntry = VersionEntry {
    major: 2,
    minor: 0,
    version: "v2",
    comment: "legacy camelCase wire shape",
};

const V3: VersionEntry = VersionEntry {
    major: 3,
    minor: 0,
    version: "v3",
    comment: "current",
};

/// `GET /versions` lists every revision the server accepts, per spec.md
/// §6's "semver from the packaged OpenAPI document" entry -- this crate
/// has no bundled document, so the two supported revisions are served
/// directly from the same descriptors the handlers themselves route on.
pub async fn versions() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "results": [V2, V3],
    }))
}

pub async fn v2() -> HttpResponse {
    HttpResponse::Ok().json(V2)
}

pub async fn v3() -> HttpResponse {
    HttpResponse::Ok().json(V3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::MessageBody;

    #[actix_web::test]
    async fn v3_reports_current() {
        let response = v3().await;
        let body = response.into_body().try_into_bytes().unwrap();
        assert!(String::from_utf8_lossy(&body).contains("\"v3\""));
    }
}

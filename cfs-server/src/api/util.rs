use actix_web::HttpRequest;

use crate::tenancy::{TenancyContext, TenancyGate, TENANT_HEADER};

/// Which externally visible revision a request came in on. Drives schema
/// translation (component/configuration bodies) and, for configurations,
/// whether the tenancy gate applies at all (spec.md §4.9: "applies to v3").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V2,
    V3,
}

pub fn tenancy_context(req: &HttpRequest) -> TenancyContext {
    let header = req.headers().get(TENANT_HEADER).and_then(|v| v.to_str().ok());
    TenancyGate::extract(header)
}

/// Splits a comma-separated `k=v,k2=v2` query parameter into a tag map,
/// silently skipping malformed pairs rather than failing the whole request.
pub fn parse_tag_list(raw: &str) -> std::collections::BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

pub fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_list_parses_multiple_pairs() {
        let tags = parse_tag_list("env=prod,team=sre");
        assert_eq!(tags.get("env"), Some(&"prod".to_string()));
        assert_eq!(tags.get("team"), Some(&"sre".to_string()));
    }

    #[test]
    fn csv_trims_and_drops_blanks() {
        assert_eq!(parse_csv("a, b ,,c"), vec!["a", "b", "c"]);
    }
}

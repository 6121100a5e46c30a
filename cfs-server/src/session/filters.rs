use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::age::parse_age;
use super::error::SessionError;
use crate::model::session::{Session, Succeeded};

#[derive(Debug, Clone, Default)]
pub struct SessionFilters {
    pub min_age: Option<String>,
    pub max_age: Option<String>,
    pub status: Option<String>,
    pub succeeded: Option<Succeeded>,
    pub name_contains: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl SessionFilters {
    pub fn matches(&self, session: &Session, now: DateTime<Utc>) -> Result<bool, SessionError> {
        if let Some(contains) = &self.name_contains {
            if !session.name.contains(contains.as_str()) {
                return Ok(false);
            }
        }

        if let Some(status) = &self.status {
            let actual = serde_json::to_value(&session.status.session.status)
                .unwrap_or_default()
                .as_str()
                .unwrap_or_default()
                .to_string();
            if &actual != status {
                return Ok(false);
            }
        }

        if let Some(succeeded) = self.succeeded {
            if session.status.session.succeeded != succeeded {
                return Ok(false);
            }
        }

        for (k, v) in &self.tags {
            if session.tags.get(k) != Some(v) {
                return Ok(false);
            }
        }

        let start_time = session
            .status
            .session
            .start_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc));

        if let Some(min_age) = &self.min_age {
            let cutoff = parse_age(min_age, now)?;
            match start_time {
                Some(t) if t > cutoff => return Ok(false),
                None => return Ok(false),
                _ => {}
            }
        }

        if let Some(max_age) = &self.max_age {
            let cutoff = parse_age(max_age, now)?;
            match start_time {
                Some(t) if t < cutoff => return Ok(false),
                None => return Ok(false),
                _ => {}
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::session::SessionStatusSession;
    use chrono::TimeZone;

    fn session_at(start: &str) -> Session {
        Session {
            name: "s1".into(),
            status: crate::model::session::SessionStatus {
                session: SessionStatusSession {
                    start_time: Some(start.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn min_age_excludes_sessions_newer_than_cutoff() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        let session = session_at("2026-07-28T11:59:00Z");
        let filters = SessionFilters {
            min_age: Some("1h".to_string()),
            ..Default::default()
        };
        assert!(!filters.matches(&session, now).unwrap());
    }

    #[test]
    fn name_contains_filters_substring() {
        let session = Session {
            name: "debug_foo".into(),
            ..Default::default()
        };
        let filters = SessionFilters {
            name_contains: Some("debug_".to_string()),
            ..Default::default()
        };
        assert!(filters.matches(&session, Utc::now()).unwrap());
    }
}

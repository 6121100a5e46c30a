use std::sync::Mutex;
use std::time::Duration;

use redis::Client;
use serde::{Deserialize, Serialize};

use super::error::EventBusError;

pub const TOPIC: &str = "cfs-session-events";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Create,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: serde_json::Value,
}

/// Transport behind [`super::bus::EventBus`]. Production implementations
/// resolve a broker endpoint lazily and reconnect on timeout; see
/// spec.md §4.10.
pub trait EventTransport: Send + Sync {
    fn publish(&self, topic: &str, envelope: &EventEnvelope) -> Result<(), EventBusError>;

    /// Verifies the broker is reachable without publishing application data.
    fn ping(&self) -> Result<(), EventBusError>;
}

/// Fake transport for tests, grounded on the teacher's
/// `event::broadcaster::unbounded` in-process channel module.
#[derive(Default)]
pub struct InMemoryEventTransport {
    published: Mutex<Vec<(String, EventEnvelope)>>,
}

impl InMemoryEventTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, EventEnvelope)> {
        self.published.lock().expect("mutex poisoned").clone()
    }
}

impl EventTransport for InMemoryEventTransport {
    fn publish(&self, topic: &str, envelope: &EventEnvelope) -> Result<(), EventBusError> {
        self.published
            .lock()
            .expect("mutex poisoned")
            .push((topic.to_string(), envelope.clone()));
        Ok(())
    }

    fn ping(&self) -> Result<(), EventBusError> {
        Ok(())
    }
}

/// Lazy PUBLISH-based transport, grounded on `kv::backend::RedisKvBackend`'s
/// connection handling. Resolves the broker on first use; on a timed-out
/// or dropped publish the connection is torn down and one fresh attempt is
/// made before giving up, per spec.md §4.10.
pub struct RedisEventTransport {
    url: String,
    connect_timeout: Duration,
    conn: Mutex<Option<redis::Connection>>,
}

impl RedisEventTransport {
    pub fn new(url: String, connect_timeout: Duration) -> Self {
        Self {
            url,
            connect_timeout,
            conn: Mutex::new(None),
        }
    }

    fn connect(&self) -> Result<redis::Connection, EventBusError> {
        let client = Client::open(self.url.clone()).map_err(|e| EventBusError::Connection(e.to_string()))?;
        client
            .get_connection_with_timeout(self.connect_timeout)
            .map_err(|e| EventBusError::Connection(e.to_string()))
    }

    fn ping_once(&self, conn: &mut redis::Connection) -> Result<(), EventBusError> {
        redis::cmd("PING")
            .query::<String>(conn)
            .map_err(|e| {
                if e.is_timeout() {
                    EventBusError::Timeout(e.to_string())
                } else {
                    EventBusError::Connection(e.to_string())
                }
            })
            .map(|_| ())
    }

    fn publish_once(&self, conn: &mut redis::Connection, topic: &str, envelope: &EventEnvelope) -> Result<(), EventBusError> {
        let payload = serde_json::to_string(envelope).map_err(|e| EventBusError::Connection(e.to_string()))?;
        redis::cmd("PUBLISH")
            .arg(topic)
            .arg(payload)
            .query::<i64>(conn)
            .map_err(|e| {
                if e.is_timeout() {
                    EventBusError::Timeout(e.to_string())
                } else {
                    EventBusError::Connection(e.to_string())
                }
            })
            .map(|_| ())
    }
}

impl EventTransport for RedisEventTransport {
    fn publish(&self, topic: &str, envelope: &EventEnvelope) -> Result<(), EventBusError> {
        let mut guard = self.conn.lock().expect("event transport mutex poisoned");
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        let conn = guard.as_mut().expect("just populated");
        if self.publish_once(conn, topic, envelope).is_ok() {
            return Ok(());
        }

        // Connection may have gone stale; reconnect once and retry.
        *guard = None;
        let mut fresh = self.connect()?;
        let result = self.publish_once(&mut fresh, topic, envelope);
        *guard = Some(fresh);
        result
    }

    fn ping(&self) -> Result<(), EventBusError> {
        let mut guard = self.conn.lock().expect("event transport mutex poisoned");
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        let conn = guard.as_mut().expect("just populated");
        if self.ping_once(conn).is_ok() {
            return Ok(());
        }

        *guard = None;
        let mut fresh = self.connect()?;
        let result = self.ping_once(&mut fresh);
        *guard = Some(fresh);
        result
    }
}

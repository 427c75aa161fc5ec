use agent_core::{Connection, Delivery, Error, Event, Monitor, Resource, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::streams::{StreamId, StreamReadReply};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client, ConnectionInfo};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info};

/// `connection_info` entry of a redis prefix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConnectionInfo {
    /// Redis connection URL (e.g., redis://localhost:6379)
    #[serde(default = "default_url")]
    pub url: String,

    /// Redis database number
    #[serde(default)]
    pub database: i64,

    /// Consumer group the agent reads streams with
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// Consumer name (unique per agent instance)
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,

    /// Maximum entries read per resource turn
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_consumer_group() -> String {
    "agent_group".to_string()
}

fn default_consumer_name() -> String {
    "agent".to_string()
}

fn default_count() -> usize {
    100
}

pub struct RedisConnection {
    info: RedisConnectionInfo,
    connection: MultiplexedConnection,
}

impl RedisConnection {
    pub async fn open(info: RedisConnectionInfo) -> Result<Self> {
        info!("Connecting to Redis: {} (db={})", info.url, info.database);

        let mut connection_info: ConnectionInfo = Client::open(info.url.as_str())
            .map_err(|e| Error::Connection(format!("Invalid Redis URL: {}", e)))?
            .get_connection_info()
            .clone();
        connection_info.redis.db = info.database;

        let client = Client::open(connection_info)
            .map_err(|e| Error::Connection(format!("Failed to create Redis client: {}", e)))?;
        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| Error::Connection(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self { info, connection })
    }

    pub fn info(&self) -> &RedisConnectionInfo {
        &self.info
    }
}

#[async_trait]
impl Connection for RedisConnection {
    async fn close(&mut self) -> Result<()> {
        // The multiplexed connection shuts down once dropped
        debug!("Releasing Redis connection to {}", self.info.url);
        Ok(())
    }
}

/// Reads the entries of one stream through a consumer group.
///
/// Entries are acknowledged only once their batch was delivered; entries left
/// pending by a failed turn are read again first on the next one.
pub struct RedisStreamMonitor {
    resource: Resource,
    stream_key: String,
}

impl RedisStreamMonitor {
    pub fn new(resource: Resource) -> Result<Self> {
        let stream_key = stream_key(&resource)?;
        Ok(Self {
            resource,
            stream_key,
        })
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    /// Ensure consumer group exists
    async fn ensure_consumer_group(&self, conn: &mut RedisConnection) -> Result<()> {
        let result: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream_key)
            .arg(&conn.info.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn.connection)
            .await;

        match result {
            Ok(_) => {
                info!(
                    "Created consumer group '{}' for stream '{}'",
                    conn.info.consumer_group, self.stream_key
                );
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => {
                error!("Failed to create consumer group: {}", e);
                Err(Error::Connection(format!(
                    "Failed to create consumer group: {}",
                    e
                )))
            }
        }
    }

    async fn read(&self, conn: &mut RedisConnection, from: &str) -> Result<Vec<StreamId>> {
        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&conn.info.consumer_group)
            .arg(&conn.info.consumer_name)
            .arg("COUNT")
            .arg(conn.info.count)
            .arg("STREAMS")
            .arg(&self.stream_key)
            .arg(from)
            .query_async(&mut conn.connection)
            .await
            .map_err(|e| Error::Monitor(format!("Failed to read from stream: {}", e)))?;

        Ok(reply
            .map(|reply| reply.keys.into_iter().flat_map(|key| key.ids).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Monitor<RedisConnection> for RedisStreamMonitor {
    async fn process(
        &mut self,
        connection: &mut RedisConnection,
        delivery: &mut dyn Delivery,
    ) -> Result<()> {
        self.ensure_consumer_group(connection).await?;

        // Pending entries of this consumer first, then new ones
        let mut entries = self.read(connection, "0").await?;
        if entries.is_empty() {
            entries = self.read(connection, ">").await?;
        }
        if entries.is_empty() {
            debug!("No new entries on stream '{}'", self.stream_key);
            return Ok(());
        }

        let ids: Vec<String> = entries.iter().map(|entry| entry.id.clone()).collect();
        let events = entries
            .iter()
            .map(|entry| {
                Event::new(
                    &self.resource,
                    entry_time(&entry.id).unwrap_or_else(Utc::now),
                    entry_payload(&self.stream_key, entry),
                )
            })
            .collect();

        delivery.deliver(events).await?;

        let acked: i64 = connection
            .connection
            .xack(&self.stream_key, &connection.info.consumer_group, ids.as_slice())
            .await
            .map_err(|e| Error::Monitor(format!("Failed to acknowledge entries: {}", e)))?;
        debug!(
            "Acknowledged {}/{} entries on stream '{}'",
            acked,
            ids.len(),
            self.stream_key
        );

        Ok(())
    }
}

/// Stream key of a resource: its `key` attribute, else the last segment of its uri
fn stream_key(resource: &Resource) -> Result<String> {
    if let Some(key) = resource.attribute("key").and_then(Value::as_str) {
        return Ok(key.to_string());
    }

    resource
        .uri
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .map(str::to_string)
        .ok_or_else(|| {
            Error::Monitor(format!("Cannot derive a stream key from '{}'", resource.uri))
        })
}

/// Entry ids are `<milliseconds>-<sequence>`
fn entry_time(id: &str) -> Option<DateTime<Utc>> {
    let millis = id.split('-').next()?.parse::<i64>().ok()?;
    DateTime::from_timestamp_millis(millis)
}

fn entry_payload(stream_key: &str, entry: &StreamId) -> Value {
    let fields: Map<String, Value> = entry
        .map
        .iter()
        .map(|(field, value)| {
            let value = match value {
                redis::Value::Data(bytes) => Value::String(String::from_utf8_lossy(bytes).into()),
                redis::Value::Int(n) => json!(n),
                redis::Value::Status(s) => Value::String(s.clone()),
                _ => Value::Null,
            };
            (field.clone(), value)
        })
        .collect();

    json!({
        "stream": stream_key,
        "id": entry.id,
        "fields": fields,
    })
}

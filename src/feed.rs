use std::time::Duration;

use log::{debug, error};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::config::Channel;
use crate::field::{FeedRecord, FieldReading};

const TIMEOUT: Duration = Duration::from_secs(10);

// ThingSpeak won't return more than this many entries per request
pub const MAX_RESULTS: u32 = 8000;

/// Ways the upstream can be unavailable. Never surfaced past this module:
/// they're logged and turned into an empty result.
#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned {0}")]
    Status(StatusCode),

    #[error("couldn't decode feeds: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct Feeds {
    #[serde(default)]
    feeds: Vec<FeedRecord>,
}

pub struct FeedClient {
    http: reqwest::Client,
    channel: Channel,
}

impl FeedClient {
    pub fn new(channel: Channel) -> reqwest::Result<Self> {
        Self::with_timeout(channel, TIMEOUT)
    }

    fn with_timeout(channel: Channel, timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { http, channel })
    }

    /// The `limit` most recent readings of a single field, oldest first.
    pub async fn fetch_field(&self, field: u32, limit: u32) -> Vec<FieldReading> {
        let path = format!("fields/{field}.json");

        match self.feeds(&path, limit).await {
            Ok(feeds) => feeds
                .iter()
                .map(|feed| FieldReading::from_feed(feed, field))
                .collect(),
            Err(e) => {
                error!("upstream fetch of field {field} failed: {e}");
                vec![]
            }
        }
    }

    /// The `limit` most recent records across all fields, oldest first.
    pub async fn fetch_latest(&self, limit: u32) -> Vec<FeedRecord> {
        self.feeds("feeds.json", limit).await.unwrap_or_else(|e| {
            error!("upstream fetch of latest feeds failed: {e}");
            vec![]
        })
    }

    async fn feeds(&self, path: &str, limit: u32) -> Result<Vec<FeedRecord>, Error> {
        let Channel {
            id,
            read_key,
            upstream,
        } = &self.channel;

        if id.is_empty() {
            debug!("no channel configured, skipping fetch of {path}");
            return Ok(vec![]);
        }

        let url = format!("{upstream}/channels/{id}/{path}");
        let limit = limit.min(MAX_RESULTS).to_string();

        let resp = self
            .http
            .get(&url)
            .query(&[("api_key", read_key.as_str()), ("results", limit.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status(status));
        }

        let body = resp.bytes().await?;
        let Feeds { feeds } = serde_json::from_slice(&body)?;

        debug!("{url}: {} feeds", feeds.len());
        Ok(feeds)
    }
}

#[cfg(test)]
pub mod test {
    use super::*;

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::{json, Value};
    use warp::{http, Filter};

    use crate::field::FieldValue;

    pub fn channel(upstream: String) -> Channel {
        Channel {
            id: "3117457".into(),
            read_key: "KEY".into(),
            upstream,
        }
    }

    /// Serves `body` for any channel path, counting the requests it gets.
    pub async fn upstream(status: u16, body: Value) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        let route = warp::path("channels")
            .and(warp::query::<HashMap<String, String>>())
            .map(move |query: HashMap<String, String>| {
                counter.fetch_add(1, Ordering::SeqCst);
                assert_eq!(query.get("api_key").map(String::as_str), Some("KEY"));
                assert!(query.contains_key("results"));

                warp::reply::with_status(
                    warp::reply::json(&body),
                    http::StatusCode::from_u16(status).unwrap(),
                )
            });

        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        (format!("http://{addr}"), hits)
    }

    async fn readings_for(body: Value, field: u32) -> Vec<FieldReading> {
        let (url, _) = upstream(200, body).await;
        let client = FeedClient::new(channel(url)).unwrap();
        client.fetch_field(field, 50).await
    }

    #[tokio::test]
    async fn empty_field_reads_as_null() {
        let readings = readings_for(json!({"feeds": [{"created_at": "t1", "field3": ""}]}), 3).await;

        assert_eq!(
            readings,
            [FieldReading {
                timestamp: Some("t1".into()),
                value: None,
            }]
        );
    }

    #[tokio::test]
    async fn numeric_field_reads_as_number() {
        let readings = readings_for(json!({"feeds": [{"created_at": "t2", "field6": "12.5"}]}), 6).await;

        assert_eq!(
            readings,
            [FieldReading {
                timestamp: Some("t2".into()),
                value: Some(FieldValue::Number(12.5)),
            }]
        );
    }

    #[tokio::test]
    async fn text_field_is_kept_as_is() {
        let readings =
            readings_for(json!({"feeds": [{"created_at": "t3", "field8": "Cleaning"}]}), 8).await;

        assert_eq!(
            readings,
            [FieldReading {
                timestamp: Some("t3".into()),
                value: Some(FieldValue::Raw(json!("Cleaning"))),
            }]
        );
    }

    #[tokio::test]
    async fn readings_keep_upstream_order() {
        let readings = readings_for(
            json!({"feeds": [
                {"created_at": "a", "field1": "1"},
                {"created_at": "b", "field1": "2"},
                {"created_at": "c"},
            ]}),
            1,
        )
        .await;

        let stamps: Vec<_> = readings.iter().filter_map(|r| r.timestamp.as_deref()).collect();
        assert_eq!(stamps, ["a", "b", "c"]);
        assert_eq!(readings[2].value, None);
    }

    #[tokio::test]
    async fn server_error_is_empty() {
        let (url, hits) = upstream(500, json!({"feeds": [{"created_at": "t", "field1": "1"}]})).await;
        let client = FeedClient::new(channel(url)).unwrap();

        assert!(client.fetch_field(1, 10).await.is_empty());
        assert!(client.fetch_latest(1).await.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn undecodable_body_is_empty() {
        // ThingSpeak answers a bad read key with a bare -1
        let (url, _) = upstream(200, json!(-1)).await;
        let client = FeedClient::new(channel(url)).unwrap();

        assert!(client.fetch_field(1, 10).await.is_empty());
    }

    #[tokio::test]
    async fn refused_connection_is_empty() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = FeedClient::new(channel(format!("http://127.0.0.1:{port}"))).unwrap();

        assert!(client.fetch_field(1, 10).await.is_empty());
        assert!(client.fetch_latest(1).await.is_empty());
    }

    #[tokio::test]
    async fn timeout_is_empty() {
        let route = warp::any().and_then(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, warp::Rejection>(warp::reply::json(&json!({"feeds": []})))
        });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let client =
            FeedClient::with_timeout(channel(format!("http://{addr}")), Duration::from_millis(100))
                .unwrap();

        assert!(client.fetch_field(1, 10).await.is_empty());
    }

    #[tokio::test]
    async fn latest_returns_raw_records() {
        let (url, _) = upstream(
            200,
            json!({"channel": {"id": 1}, "feeds": [{"created_at": "t", "entry_id": 7, "field8": "Idle"}]}),
        )
        .await;
        let client = FeedClient::new(channel(url)).unwrap();

        let latest = client.fetch_latest(1).await;
        let [ref record] = latest[..] else {
            panic!("expected single record")
        };
        assert_eq!(record.get("entry_id"), Some(&json!(7)));
        assert_eq!(record.get("field8"), Some(&json!("Idle")));
    }

    #[tokio::test]
    async fn no_channel_makes_no_request() {
        let (url, hits) = upstream(200, json!({"feeds": []})).await;
        let client = FeedClient::new(Channel {
            id: String::new(),
            ..channel(url)
        })
        .unwrap();

        assert!(client.fetch_field(1, 10).await.is_empty());
        assert!(client.fetch_latest(1).await.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}

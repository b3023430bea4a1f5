//! Common test utilities

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crawlcheck::api::models::ShardStatus;
use crawlcheck::api::ApiError;
use crawlcheck::config::TargetEnv;
use crawlcheck::error::{Error, Result};
use crawlcheck::fixture::FixtureObserver;
use crawlcheck::poller::QueueStatusSource;

/// Queue source replaying a scripted sequence of samples
///
/// The last sample is repeated once the script runs dry, so a poller can keep
/// sampling past the scripted prefix.
pub struct ScriptedQueueSource {
    samples: Mutex<VecDeque<Result<ShardStatus>>>,
    last: Mutex<Option<ShardStatus>>,
}

impl ScriptedQueueSource {
    pub fn new(samples: Vec<Result<ShardStatus>>) -> Self {
        Self {
            samples: Mutex::new(samples.into()),
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl QueueStatusSource for ScriptedQueueSource {
    async fn sample(&self) -> Result<ShardStatus> {
        let next = self.samples.lock().unwrap().pop_front();
        match next {
            Some(Ok(status)) => {
                *self.last.lock().unwrap() = Some(status.clone());
                Ok(status)
            }
            Some(Err(e)) => Err(e),
            None => match self.last.lock().unwrap().clone() {
                Some(status) => Ok(status),
                None => Err(Error::Api(ApiError::Status(503))),
            },
        }
    }
}

/// Observer answering with a fixed set of served URLs
pub struct StaticFixtureObserver {
    urls: HashSet<String>,
}

impl StaticFixtureObserver {
    pub fn new(urls: &[&str]) -> Self {
        Self {
            urls: urls.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl FixtureObserver for StaticFixtureObserver {
    async fn served_urls(&self) -> Result<HashSet<String>> {
        Ok(self.urls.clone())
    }
}

/// The default fixture substitution environment used across tests
pub fn test_env() -> TargetEnv {
    TargetEnv {
        scheme: "http".to_string(),
        domain: "fixture.test".to_string(),
        port: 28080,
    }
}

/// A quiet in-progress queue snapshot with no queued work
pub fn quiet_status() -> ShardStatus {
    serde_json::from_str(r#"{"statusCode": 7}"#).unwrap()
}

/// A busy in-progress queue snapshot
pub fn busy_status() -> ShardStatus {
    serde_json::from_str(r#"{"statusCode": 7, "doleIPCount": 1, "spiderCount": 2}"#).unwrap()
}

/// An initializing queue snapshot
pub fn initializing_status() -> ShardStatus {
    serde_json::from_str(r#"{"statusCode": 0}"#).unwrap()
}

/// A quiet snapshot with one queued task at the given epoch-ms time
pub fn pending_status(spider_time: i64) -> ShardStatus {
    serde_json::from_str(&format!(
        r#"{{"statusCode": 7, "waitingTreeCount": 1, "waitingTrees": [{{"spiderTime": {spider_time}}}]}}"#
    ))
    .unwrap()
}

//! Long-poll change feed.
//!
//! A background task keeps one request parked on `/changes` and rebroadcasts
//! whatever the server reports. The first poll carries no cursor and only
//! establishes the baseline; nothing is emitted for it.

use std::time::Duration;

use api_types::changes::{ChangeKind as ApiKind, ChangesResponse};
use reqwest::Url;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use store::{ChangeEvent, ChangeFeed, ChangeKind, RemoteError};

const FEED_CAPACITY: usize = 16;

/// The server parks a poll for up to 25s; leave headroom on top of that.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(40);

const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Change notices sourced from the server's long-poll endpoint.
///
/// Dropping the feed stops the polling task.
pub struct HttpFeed {
    tx: broadcast::Sender<ChangeEvent>,
    task: JoinHandle<()>,
}

impl HttpFeed {
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self, RemoteError> {
        let endpoint = Url::parse(base_url)
            .and_then(|url| url.join("changes"))
            .map_err(|err| RemoteError::Transport(format!("invalid base_url: {err}")))?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| RemoteError::Transport(err.to_string()))?;

        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        let task = tokio::spawn(poll_loop(
            http,
            endpoint,
            username.to_string(),
            password.to_string(),
            tx.clone(),
        ));

        Ok(Self { tx, task })
    }
}

impl ChangeFeed for HttpFeed {
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}

impl Drop for HttpFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll_loop(
    http: reqwest::Client,
    endpoint: Url,
    username: String,
    password: String,
    tx: broadcast::Sender<ChangeEvent>,
) {
    let mut cursor: Option<u64> = None;

    loop {
        let mut request = http
            .get(endpoint.clone())
            .basic_auth(&username, Some(&password));
        if let Some(after) = cursor {
            request = request.query(&[("after", after)]);
        }

        let response = match request.send().await {
            Ok(res) if res.status().is_success() => res.json::<ChangesResponse>().await,
            Ok(res) => {
                tracing::warn!(status = %res.status(), "changes poll rejected");
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            }
            Err(err) => {
                tracing::warn!("changes poll failed: {err}");
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            }
        };

        let changes = match response {
            Ok(changes) => changes,
            Err(err) => {
                tracing::warn!("changes poll returned garbage: {err}");
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            }
        };

        if let Some(after) = cursor {
            if changes.cursor > after {
                emit(&tx, &changes);
            }
        }
        cursor = Some(changes.cursor);
    }
}

fn emit(tx: &broadcast::Sender<ChangeEvent>, changes: &ChangesResponse) {
    if changes.kinds.is_empty() {
        // The cursor moved but the notices were missed. Any event triggers
        // a refetch; the kind is advisory.
        let _ = tx.send(ChangeEvent {
            kind: ChangeKind::Update,
        });
        return;
    }

    for kind in &changes.kinds {
        let _ = tx.send(ChangeEvent {
            kind: kind_from_api(*kind),
        });
    }
}

fn kind_from_api(kind: ApiKind) -> ChangeKind {
    match kind {
        ApiKind::Insert => ChangeKind::Insert,
        ApiKind::Update => ChangeKind::Update,
        ApiKind::Delete => ChangeKind::Delete,
    }
}

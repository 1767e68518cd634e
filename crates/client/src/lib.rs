//! HTTP access to the purchases server.
//!
//! [`HttpRemote`] implements the store's remote contract against the REST
//! API and [`HttpFeed`] turns the long-poll changes endpoint into a change
//! feed, so a [`store::SyncStore`] can run against a real server with no
//! extra glue.

use api_types::purchase::{PurchaseListResponse, PurchaseNew, PurchaseView};
use api_types::user::WhoAmI;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde::Deserialize;
use uuid::Uuid;

use store::{PurchaseDraft, PurchaseRecord, RemoteError, RemoteStore};

mod feed;

pub use feed::HttpFeed;

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Remote store backed by the purchases REST API.
///
/// The owner argument of the trait methods is informational here; the
/// server scopes every row by the authenticated user.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    base_url: Url,
    http: reqwest::Client,
    username: String,
    password: String,
}

impl HttpRemote {
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self, RemoteError> {
        let base_url = Url::parse(base_url)
            .map_err(|err| RemoteError::Transport(format!("invalid base_url: {err}")))?;
        Ok(Self {
            base_url,
            http: reqwest::Client::new(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Asks the server which identity the credentials belong to.
    ///
    /// The returned id is what a [`store::SyncStore`] gets bound to.
    pub async fn identity(&self) -> Result<WhoAmI, RemoteError> {
        let endpoint = self.join("user/me")?;

        let res = self
            .http
            .get(endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(transport)?;

        let res = check(res).await?;
        res.json::<WhoAmI>().await.map_err(transport)
    }

    fn join(&self, path: &str) -> Result<Url, RemoteError> {
        self.base_url
            .join(path)
            .map_err(|err| RemoteError::Transport(format!("invalid base_url: {err}")))
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn select(&self, owner: Uuid) -> Result<Vec<PurchaseRecord>, RemoteError> {
        let endpoint = self.join("purchases")?;

        let res = self
            .http
            .get(endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(transport)?;

        let res = check(res).await?;
        let list = res.json::<PurchaseListResponse>().await.map_err(transport)?;

        Ok(list
            .purchases
            .into_iter()
            .map(|view| record(view, owner))
            .collect())
    }

    async fn insert(
        &self,
        draft: PurchaseDraft,
        owner: Uuid,
    ) -> Result<PurchaseRecord, RemoteError> {
        let endpoint = self.join("purchases")?;
        let payload = PurchaseNew {
            name: draft.name().to_string(),
            price_minor: draft.price().minor_units(),
            date: draft.date(),
        };

        let res = self
            .http
            .post(endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .json(&payload)
            .send()
            .await
            .map_err(transport)?;

        let res = check(res).await?;
        let view = res.json::<PurchaseView>().await.map_err(transport)?;
        Ok(record(view, owner))
    }

    async fn delete(&self, id: Uuid, _owner: Uuid) -> Result<(), RemoteError> {
        let endpoint = self.join(&format!("purchases/{id}"))?;

        let res = self
            .http
            .delete(endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(transport)?;

        check(res).await?;
        Ok(())
    }
}

fn record(view: PurchaseView, owner: Uuid) -> PurchaseRecord {
    PurchaseRecord {
        id: view.id,
        name: view.name,
        price: store::Money::new(view.price_minor),
        date: view.date,
        created_at: view.created_at.with_timezone(&Utc),
        owner,
    }
}

fn transport(err: reqwest::Error) -> RemoteError {
    RemoteError::Transport(err.to_string())
}

async fn check(res: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    if res.status().is_success() {
        return Ok(res);
    }

    let status = res.status();
    let body = res
        .json::<ErrorResponse>()
        .await
        .map(|err| err.error)
        .unwrap_or_else(|_| "unknown error".to_string());

    Err(match status.as_u16() {
        401 | 403 => RemoteError::Unauthorized,
        404 => RemoteError::NotFound,
        409 | 422 => RemoteError::Constraint(body),
        _ => RemoteError::Transport(body),
    })
}

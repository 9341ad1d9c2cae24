use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::AppError;
use crate::models::DeliveryId;
use crate::models::delivery::{Delivery, DeliveryPatch, NewDelivery};
use crate::models::user::User;
use crate::store::query::DeliveryQuery;
use crate::store::{DataSource, SourceKind};

/// REST client for a `/users` + `/deliveries` backing store.
#[derive(Debug, Clone)]
pub struct RemoteSource {
    client: Client,
    base_url: String,
    probe_timeout: Duration,
}

impl RemoteSource {
    pub fn new(base_url: &str, probe_timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            probe_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn probe(&self) -> Result<(), AppError> {
        let response = self
            .client
            .get(self.url("/users"))
            .timeout(self.probe_timeout)
            .send()
            .await?;
        expect_success(response).await.map(|_| ())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn delivery_url(&self, id: DeliveryId) -> String {
        self.url(&format!("/deliveries/{id}"))
    }
}

async fn expect_success(response: Response) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| value.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or(body);

    Err(AppError::from_status(status, message))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, AppError> {
    Ok(expect_success(response).await?.json::<T>().await?)
}

#[async_trait]
impl DataSource for RemoteSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Remote
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let response = self.client.get(self.url("/users")).send().await?;
        read_json(response).await
    }

    async fn get_delivery(&self, id: DeliveryId) -> Result<Delivery, AppError> {
        let response = self.client.get(self.delivery_url(id)).send().await?;
        read_json(response).await
    }

    async fn list_deliveries(&self, query: &DeliveryQuery) -> Result<Vec<Delivery>, AppError> {
        let params = query.to_params();
        debug!(?params, "listing deliveries");

        let response = self
            .client
            .get(self.url("/deliveries"))
            .query(&params)
            .send()
            .await?;
        read_json(response).await
    }

    async fn create_delivery(&self, draft: NewDelivery) -> Result<Delivery, AppError> {
        let response = self
            .client
            .post(self.url("/deliveries"))
            .json(&draft)
            .send()
            .await?;
        read_json(response).await
    }

    async fn patch_delivery(
        &self,
        id: DeliveryId,
        patch: &DeliveryPatch,
    ) -> Result<Delivery, AppError> {
        let response = self
            .client
            .patch(self.delivery_url(id))
            .json(patch)
            .send()
            .await?;
        read_json(response).await
    }

    async fn delete_delivery(&self, id: DeliveryId) -> Result<(), AppError> {
        let response = self.client.delete(self.delivery_url(id)).send().await?;
        expect_success(response).await.map(|_| ())
    }
}

//! HTTP backend - speaks the budget server's JSON API with `reqwest`.

use super::{
    Backend, CategoryRecord, CategoryUpdate, CreateTenantRequest, CreateTenantResponse,
    ExpenseUpdate, LedgerData, NewExpense, SalaryRecord, SalaryUpdate, TenantList,
};
use crate::errors::{Error, Result};
use reqwest::{Client, Method, Response, Url};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Client for a budget server reachable at `base_url`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    /// Builds a client whose every request is bounded by `timeout`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Server root, optionally with a path prefix such as `http://host/api`
    /// * `timeout` - Upper bound for each request, connect included
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `base_url` is not an absolute http(s) URL
    /// or the TLS client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| Error::Config {
            message: format!("Invalid backend URL \"{base_url}\": {e}"),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config {
                message: format!("Backend URL \"{base_url}\" cannot hold a path"),
            });
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, base_url })
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends `segments` to the base path, percent-encoding each one, so a
    /// tenant called `Q1/2025` stays a single segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| Error::Config {
                message: format!("Backend URL \"{}\" cannot hold a path", self.base_url),
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    async fn ack(response: Response) -> Result<()> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::network(format!("server returned {status}: {body}")));
        }
        Ok(())
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.endpoint(segments)?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn send_json<B: Serialize + Sync>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<()> {
        let url = self.endpoint(segments)?;
        debug!(%method, path = url.path(), "sending request");
        let response = self.client.request(method, url).json(body).send().await?;
        Self::ack(response).await
    }

    async fn send_empty(&self, method: Method, segments: &[&str]) -> Result<()> {
        let url = self.endpoint(segments)?;
        debug!(%method, path = url.path(), "sending request");
        let response = self.client.request(method, url).send().await?;
        Self::ack(response).await
    }
}

impl Backend for HttpBackend {
    #[instrument(skip(self))]
    async fn load_data(&self) -> Result<LedgerData> {
        self.get(&["get_data"]).await
    }

    #[instrument(skip(self))]
    async fn load_salary(&self) -> Result<f64> {
        let record: SalaryRecord = self.get(&["get_salary"]).await?;
        Ok(record.salary)
    }

    async fn add_category(&self, category: &CategoryRecord) -> Result<()> {
        self.send_json(Method::POST, &["add_category"], category)
            .await
    }

    async fn update_category(&self, id: &str, update: &CategoryUpdate) -> Result<()> {
        self.send_json(Method::PUT, &["update_category", id], update)
            .await
    }

    async fn delete_category(&self, id: &str) -> Result<()> {
        self.send_empty(Method::DELETE, &["delete_category", id])
            .await
    }

    async fn add_expense(&self, expense: &NewExpense) -> Result<()> {
        self.send_json(Method::POST, &["add_expense"], expense)
            .await
    }

    async fn update_expense(&self, id: &str, update: &ExpenseUpdate) -> Result<()> {
        self.send_json(Method::PUT, &["update_expense", id], update)
            .await
    }

    async fn delete_expense(&self, id: &str) -> Result<()> {
        self.send_empty(Method::DELETE, &["delete_expense", id])
            .await
    }

    async fn update_salary(&self, amount: f64) -> Result<()> {
        self.send_json(Method::POST, &["update_salary"], &SalaryUpdate { amount })
            .await
    }

    #[instrument(skip(self))]
    async fn list_tenants(&self) -> Result<TenantList> {
        self.get(&["list_dbs"]).await
    }

    #[instrument(skip(self))]
    async fn create_tenant(&self, name: &str) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint(&["create_db"])?)
            .json(&CreateTenantRequest {
                dbname: name.to_string(),
            })
            .send()
            .await?;
        // The server reports a taken name as `{ error }`, sometimes with a 4xx status.
        let status = response.status();
        let body: CreateTenantResponse = response.json().await.unwrap_or_default();
        if let Some(error) = body.error {
            return Err(Error::validation(error));
        }
        if !status.is_success() {
            return Err(Error::network(format!("server returned {status}")));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn switch_tenant(&self, name: &str) -> Result<()> {
        self.send_empty(Method::POST, &["switch_db", name]).await
    }
}

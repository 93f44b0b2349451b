//! ERP data source
//!
//! The ERP is an opaque paged source: products are read "after cursor X, up to
//! N" ordered by reference, lookups and prices are read as the current set.
//! [`HttpErpSource`] is the JSON-over-HTTP adapter used in production.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::error::{SyncError, SyncResult};
use crate::config::ErpConfig;

/// Lookup tables mirrored before the product phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    Brand,
    Category,
    Collection,
    Supplier,
}

impl LookupKind {
    pub const ALL: [LookupKind; 4] = [
        LookupKind::Brand,
        LookupKind::Category,
        LookupKind::Collection,
        LookupKind::Supplier,
    ];

    /// Local table name, also the ERP resource path
    pub fn table(self) -> &'static str {
        match self {
            LookupKind::Brand => "brands",
            LookupKind::Category => "categories",
            LookupKind::Collection => "collections",
            LookupKind::Supplier => "suppliers",
        }
    }
}

impl std::fmt::Display for LookupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErpLookup {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErpVariant {
    pub code: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErpProduct {
    /// Unique external key, also the pagination cursor
    pub reference: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub brand_code: Option<String>,
    #[serde(default)]
    pub category_code: Option<String>,
    #[serde(default)]
    pub collection_code: Option<String>,
    #[serde(default)]
    pub supplier_code: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub variants: Vec<ErpVariant>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErpPrice {
    pub reference: String,
    pub price_cents: i64,
    #[serde(default)]
    pub promo_price_cents: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: i64,
}

/// Read access to the ERP
#[async_trait]
pub trait ErpSource: Send + Sync {
    async fn fetch_lookups(&self, kind: LookupKind) -> SyncResult<Vec<ErpLookup>>;

    /// Estimated number of products with reference greater than `after`,
    /// used for progress totals only
    async fn count_products(&self, after: Option<&str>) -> SyncResult<i64>;

    /// Up to `limit` products with reference strictly greater than `after`,
    /// ascending by reference
    async fn fetch_products(&self, after: Option<&str>, limit: usize) -> SyncResult<Vec<ErpProduct>>;

    async fn fetch_prices(&self) -> SyncResult<Vec<ErpPrice>>;
}

/// JSON-over-HTTP ERP adapter
#[derive(Clone)]
pub struct HttpErpSource {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpErpSource {
    pub fn new(config: &ErpConfig) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> SyncResult<T> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(url = %url, ?query, "ERP request");

        let mut request = self.client.get(&url).query(query);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ErpSource for HttpErpSource {
    async fn fetch_lookups(&self, kind: LookupKind) -> SyncResult<Vec<ErpLookup>> {
        self.get_json(kind.table(), &[]).await
    }

    async fn count_products(&self, after: Option<&str>) -> SyncResult<i64> {
        let query: Vec<(&str, String)> = after.map(|after| ("after", after.to_string())).into_iter().collect();
        let response: CountResponse = self.get_json("products/count", &query).await?;
        if response.count < 0 {
            return Err(SyncError::Erp(format!(
                "negative product count: {}",
                response.count
            )));
        }
        Ok(response.count)
    }

    async fn fetch_products(&self, after: Option<&str>, limit: usize) -> SyncResult<Vec<ErpProduct>> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }
        self.get_json("products", &query).await
    }

    async fn fetch_prices(&self) -> SyncResult<Vec<ErpPrice>> {
        self.get_json("prices", &[]).await
    }
}

pub mod normalize;
pub mod price;
pub mod session;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use normalize::{Normalizer, NormalizerConfig};
pub use session::HttpCatalogSession;

/// Loosely-typed record as delivered by the catalog. It never leaves the
/// normalizer boundary.
pub type RawRecord = Map<String, Value>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response body: {0}")]
    Body(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub page: usize,
    pub page_size: usize,
}

impl PageCursor {
    pub fn first(page_size: usize) -> Self {
        Self { page: 1, page_size }
    }

    pub fn next(self) -> Self {
        Self {
            page: self.page + 1,
            ..self
        }
    }
}

/// Classification of one page request.
#[derive(Debug)]
pub enum PageFetch {
    Items(Vec<RawRecord>),
    Exhausted,
    Unavailable(String),
    Rejected { code: Option<i64>, message: String },
}

/// Raw detail response before the enricher classifies it.
#[derive(Debug, Clone, Default)]
pub struct DetailResponse {
    pub code: Option<i64>,
    pub message: Option<String>,
    pub data: Option<Value>,
}

#[async_trait]
pub trait CatalogSource: Send {
    async fn fetch_page(&mut self, cursor: PageCursor) -> PageFetch;
}

/// Detail lookups share the session with pagination, so calls take `&mut self`
/// and are never issued concurrently.
#[async_trait]
pub trait DetailSource: Send {
    async fn fetch_detail(&mut self, identity: &str) -> Result<DetailResponse, TransportError>;
}

/// Pulls the item list out of the several envelope shapes the catalog uses.
pub fn extract_item_list(body: &Value) -> Option<Vec<RawRecord>> {
    let data = body.get("data")?;
    let list = match data {
        Value::Array(items) => items,
        Value::Object(obj) => ["list", "records", "items"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_array))?,
        _ => return None,
    };
    Some(
        list.iter()
            .filter_map(|item| item.as_object().cloned())
            .collect(),
    )
}

pub fn response_code(body: &Value) -> Option<i64> {
    match body.get("code")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

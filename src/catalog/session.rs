use crate::catalog::{
    CatalogSource, DetailResponse, DetailSource, PageCursor, PageFetch, TransportError,
    extract_item_list, response_code,
};
use crate::http::build_session_client;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// One logical session against the catalog service. Page and detail requests
/// go through the same cookie-carrying client.
pub struct HttpCatalogSession {
    http: Client,
    list_url: String,
    detail_url: Option<String>,
    device: Map<String, Value>,
    task_payload: Map<String, Value>,
    page_param: String,
    page_size_param: String,
    accepted_codes: Vec<i64>,
}

impl HttpCatalogSession {
    pub fn new(
        list_url: String,
        detail_url: Option<String>,
        device: Map<String, Value>,
        task_payload: Map<String, Value>,
    ) -> Self {
        Self {
            http: build_session_client(),
            list_url,
            detail_url,
            device,
            task_payload,
            page_param: "page".into(),
            page_size_param: "pageSize".into(),
            accepted_codes: vec![0, 200],
        }
    }

    pub fn with_page_params(mut self, page_param: &str, page_size_param: &str) -> Self {
        self.page_param = page_param.to_string();
        self.page_size_param = page_size_param.to_string();
        self
    }

    pub fn with_accepted_codes(mut self, codes: Vec<i64>) -> Self {
        self.accepted_codes = codes;
        self
    }

    /// Device parameters first, then timestamp, then request specifics.
    fn build_payload(&self, extra: Map<String, Value>) -> Map<String, Value> {
        let mut payload = self.device.clone();
        payload.insert(
            "ts".into(),
            Value::String(chrono::Utc::now().timestamp().to_string()),
        );
        payload.extend(extra);
        payload
    }

    async fn send_json(
        &self,
        url: &str,
        payload: &Map<String, Value>,
    ) -> Result<reqwest::Response, TransportError> {
        self.http
            .post(url)
            .header("Accept", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))
    }

    async fn post_json(&self, url: &str, payload: &Map<String, Value>) -> Result<Value, TransportError> {
        let response = self.send_json(url, payload).await?;
        if !response.status().is_success() {
            return Err(TransportError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| TransportError::Body(err.to_string()))
    }
}

/// A reply that arrived is never a transport failure: bad HTTP statuses and
/// unreadable bodies become responses without data.
fn detail_from_reply(status: StatusCode, body: Result<Value, String>) -> DetailResponse {
    if !status.is_success() {
        return DetailResponse {
            code: Some(i64::from(status.as_u16())),
            message: Some(format!("HTTP {status}")),
            data: None,
        };
    }
    match body {
        Ok(body) => DetailResponse {
            code: response_code(&body),
            message: body.get("msg").and_then(Value::as_str).map(str::to_string),
            data: body.get("data").cloned().filter(|data| !data.is_null()),
        },
        Err(err) => DetailResponse {
            code: None,
            message: Some(format!("unreadable body: {err}")),
            data: None,
        },
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSession {
    async fn fetch_page(&mut self, cursor: PageCursor) -> PageFetch {
        let mut extra = self.task_payload.clone();
        extra.insert(self.page_param.clone(), Value::from(cursor.page));
        extra.insert(self.page_size_param.clone(), Value::from(cursor.page_size));
        let payload = self.build_payload(extra);

        let body = match self.post_json(&self.list_url, &payload).await {
            Ok(body) => body,
            Err(err) => {
                warn!(target = "catalog.source", page = cursor.page, error = %err, "page_request_failed");
                return PageFetch::Unavailable(err.to_string());
            }
        };

        let code = response_code(&body);
        if let Some(code) = code
            && !self.accepted_codes.contains(&code)
        {
            let message = body
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return PageFetch::Rejected {
                code: Some(code),
                message,
            };
        }

        match extract_item_list(&body) {
            Some(items) if items.is_empty() => PageFetch::Exhausted,
            Some(items) => {
                debug!(target = "catalog.source", page = cursor.page, count = items.len(), "page_received");
                PageFetch::Items(items)
            }
            None if body.get("data").is_none_or(Value::is_null) => PageFetch::Exhausted,
            None => PageFetch::Rejected {
                code,
                message: "unrecognized list envelope".into(),
            },
        }
    }
}

#[async_trait]
impl DetailSource for HttpCatalogSession {
    async fn fetch_detail(&mut self, identity: &str) -> Result<DetailResponse, TransportError> {
        let Some(url) = self.detail_url.clone() else {
            return Err(TransportError::Request("detail endpoint not configured".into()));
        };
        let mut extra = Map::new();
        extra.insert("productId".into(), Value::String(identity.to_string()));
        let payload = self.build_payload(extra);
        let response = self.send_json(&url, &payload).await?;
        let status = response.status();
        let body = if status.is_success() {
            response.json::<Value>().await.map_err(|err| err.to_string())
        } else {
            Err(format!("HTTP {status}"))
        };
        let detail = detail_from_reply(status, body);
        if detail.data.is_none() {
            debug!(target = "catalog.source", identity = %identity, status = %status, "detail_reply_without_data");
        }
        Ok(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_layers_device_then_request() {
        let device = json!({"platform": "h5", "page": 99}).as_object().cloned().unwrap();
        let session = HttpCatalogSession::new(
            "https://api.example.com/list".into(),
            None,
            device,
            Map::new(),
        );
        let mut extra = Map::new();
        extra.insert("page".into(), json!(2));
        let payload = session.build_payload(extra);
        assert_eq!(payload["platform"], json!("h5"));
        assert_eq!(payload["page"], json!(2));
        assert!(payload["ts"].as_str().is_some_and(|ts| !ts.is_empty()));
    }

    #[test]
    fn bad_http_status_is_a_response_without_data() {
        let detail = detail_from_reply(StatusCode::BAD_GATEWAY, Err("HTTP 502".into()));
        assert_eq!(detail.code, Some(502));
        assert!(detail.data.is_none());
    }

    #[test]
    fn unreadable_body_is_a_response_without_code() {
        let detail = detail_from_reply(StatusCode::OK, Err("expected value at line 1".into()));
        assert!(detail.code.is_none());
        assert!(detail.data.is_none());
        assert!(detail.message.is_some_and(|m| m.contains("unreadable")));
    }

    #[test]
    fn readable_body_keeps_code_and_data() {
        let body = json!({"code": 0, "msg": "ok", "data": {"attrList": []}});
        let detail = detail_from_reply(StatusCode::OK, Ok(body));
        assert_eq!(detail.code, Some(0));
        assert_eq!(detail.message.as_deref(), Some("ok"));
        assert!(detail.data.is_some_and(|d| d.is_object()));

        let null_data = detail_from_reply(StatusCode::OK, Ok(json!({"code": 0, "data": null})));
        assert!(null_data.data.is_none());
    }

    #[tokio::test]
    async fn detail_without_endpoint_is_transport_error() {
        let mut session = HttpCatalogSession::new(
            "https://api.example.com/list".into(),
            None,
            Map::new(),
            Map::new(),
        );
        let err = session.fetch_detail("1").await.expect_err("no endpoint");
        assert!(matches!(err, TransportError::Request(_)));
    }
}

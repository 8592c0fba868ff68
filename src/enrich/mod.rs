pub mod attributes;

use crate::catalog::normalize::absolutize;
use crate::catalog::{DetailResponse, DetailSource};
use crate::metrics;
use crate::translate::AttributeTranslator;
use attributes::{DetailPayload, extract_attributes, image_texts, location_code};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Extended data merged into a product after a successful detail lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailRecord {
    pub attributes: BTreeMap<String, String>,
    pub image_urls: Vec<String>,
    pub location_code: Option<String>,
    pub secondary_code: String,
}

impl DetailRecord {
    fn fallback(secondary_code: &str) -> Self {
        Self {
            secondary_code: secondary_code.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetailResult {
    /// No response at all (transport failure).
    Unavailable { reason: String, record: DetailRecord },
    /// A response arrived but the status was not accepted or the payload was missing.
    Rejected {
        code: Option<i64>,
        reason: String,
        record: DetailRecord,
    },
    Success(DetailRecord),
}

impl DetailResult {
    pub fn record(&self) -> &DetailRecord {
        match self {
            DetailResult::Unavailable { record, .. }
            | DetailResult::Rejected { record, .. }
            | DetailResult::Success(record) => record,
        }
    }

    pub fn into_record(self) -> DetailRecord {
        match self {
            DetailResult::Unavailable { record, .. }
            | DetailResult::Rejected { record, .. }
            | DetailResult::Success(record) => record,
        }
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            DetailResult::Unavailable { .. } => "unavailable",
            DetailResult::Rejected { .. } => "rejected",
            DetailResult::Success(_) => "success",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DetailResult::Success(_))
    }
}

#[derive(Debug, Clone)]
pub struct DetailEnricher {
    accepted_codes: Vec<i64>,
    media_base: String,
}

impl DetailEnricher {
    pub fn new(accepted_codes: Vec<i64>, media_base: impl Into<String>) -> Self {
        Self {
            accepted_codes,
            media_base: media_base.into(),
        }
    }

    /// Looks up one product. Failures only degrade the record; they never
    /// surface as errors.
    pub async fn fetch_details<D>(
        &self,
        source: &mut D,
        translator: &mut AttributeTranslator,
        identity: &str,
        fallback_secondary_code: &str,
    ) -> DetailResult
    where
        D: DetailSource + ?Sized,
    {
        let result = match source.fetch_detail(identity).await {
            Err(err) => {
                warn!(target = "catalog.detail", identity = %identity, error = %err, "detail_unavailable");
                DetailResult::Unavailable {
                    reason: err.to_string(),
                    record: DetailRecord::fallback(fallback_secondary_code),
                }
            }
            Ok(response) => {
                self.classify(response, translator, identity, fallback_secondary_code)
                    .await
            }
        };
        metrics::detail_outcome(result.outcome());
        result
    }

    async fn classify(
        &self,
        response: DetailResponse,
        translator: &mut AttributeTranslator,
        identity: &str,
        fallback_secondary_code: &str,
    ) -> DetailResult {
        let code_ok = response
            .code
            .is_some_and(|code| self.accepted_codes.contains(&code));
        if !code_ok {
            let reason = response
                .message
                .unwrap_or_else(|| "status not accepted".to_string());
            warn!(target = "catalog.detail", identity = %identity, code = ?response.code, reason = %reason, "detail_rejected");
            return DetailResult::Rejected {
                code: response.code,
                reason,
                record: DetailRecord::fallback(fallback_secondary_code),
            };
        }

        let payload = match response.data.as_ref().and_then(Value::as_object) {
            Some(data) => DetailPayload::from_map(data),
            None => {
                warn!(target = "catalog.detail", identity = %identity, "detail_payload_missing");
                return DetailResult::Rejected {
                    code: response.code,
                    reason: "missing payload".into(),
                    record: DetailRecord::fallback(fallback_secondary_code),
                };
            }
        };

        let attributes = extract_attributes(&payload.attrs, translator).await;
        let image_urls = image_texts(&payload.image_urls)
            .iter()
            .map(|url| absolutize(url, &self.media_base))
            .collect::<Vec<_>>();
        let location = payload
            .store_description
            .as_deref()
            .and_then(location_code);
        let secondary_code = match &location {
            Some(code) => format!("{fallback_secondary_code}-{code}"),
            None => fallback_secondary_code.to_string(),
        };

        debug!(
            target = "catalog.detail",
            identity = %identity,
            attributes = attributes.len(),
            images = image_urls.len(),
            location = ?location,
            "detail_enriched"
        );

        DetailResult::Success(DetailRecord {
            attributes,
            image_urls,
            location_code: location,
            secondary_code,
        })
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use crate::catalog::TransportError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap;

    /// Detail source answering from a fixed table; unknown ids are transport failures.
    #[derive(Default)]
    pub struct TableDetailSource {
        pub responses: HashMap<String, DetailResponse>,
        pub calls: Vec<String>,
    }

    impl TableDetailSource {
        pub fn with(mut self, identity: &str, code: Option<i64>, data: Option<Value>) -> Self {
            self.responses.insert(
                identity.to_string(),
                DetailResponse {
                    code,
                    message: None,
                    data,
                },
            );
            self
        }
    }

    #[async_trait]
    impl DetailSource for TableDetailSource {
        async fn fetch_detail(&mut self, identity: &str) -> Result<DetailResponse, TransportError> {
            self.calls.push(identity.to_string());
            self.responses
                .get(identity)
                .cloned()
                .ok_or_else(|| TransportError::Request("connection refused".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::TableDetailSource;
    use super::*;
    use crate::translate::fakes::{FakeTranslator, translator_with};
    use crate::translate::{SERIAL_LABEL, WEIGHT_LABEL, YEAR_LABEL};
    use serde_json::json;

    fn enricher() -> DetailEnricher {
        DetailEnricher::new(vec![0, 200], "https://img.example.com")
    }

    #[tokio::test]
    async fn success_extracts_attributes_images_and_location() {
        let mut source = TableDetailSource::default().with(
            "42",
            Some(0),
            Some(json!({
                "attrList": [
                    {"name": "序列号", "values": ["Z123/2021"]},
                    {"name": "重量", "values": ["850克"]},
                    {"name": "颜色", "values": ["金色"]}
                ],
                "imgList": ["p/42/1.jpg", "https://cdn.example.com/42/2.jpg"],
                "storeDesc": "shanghai IFC store"
            })),
        );
        let fake = FakeTranslator::with_entries(&[("金色", "Золотой")]).failing_times(1);
        let mut translator = translator_with(&fake);

        let result = enricher()
            .fetch_details(&mut source, &mut translator, "42", "42")
            .await;
        assert!(result.is_success());
        let record = result.into_record();
        assert_eq!(record.attributes[SERIAL_LABEL], "Z123");
        assert_eq!(record.attributes[YEAR_LABEL], "2021");
        assert_eq!(record.attributes[WEIGHT_LABEL], "850 г");
        assert_eq!(record.attributes["Цвет"], "Золотой");
        assert_eq!(
            record.image_urls,
            vec![
                "https://img.example.com/p/42/1.jpg".to_string(),
                "https://cdn.example.com/42/2.jpg".to_string(),
            ]
        );
        assert_eq!(record.location_code.as_deref(), Some("SHA"));
        assert_eq!(record.secondary_code, "42-SHA");
    }

    #[tokio::test]
    async fn transport_failure_is_unavailable_with_fallback_code() {
        let mut source = TableDetailSource::default();
        let mut translator = translator_with(&FakeTranslator::default());
        let result = enricher()
            .fetch_details(&mut source, &mut translator, "7", "ART-7")
            .await;
        assert_eq!(result.outcome(), "unavailable");
        assert!(result.record().attributes.is_empty());
        assert_eq!(result.record().secondary_code, "ART-7");
    }

    #[tokio::test]
    async fn bad_status_or_missing_payload_is_rejected() {
        let mut source = TableDetailSource::default()
            .with("1", Some(500), Some(json!({"attrList": []})))
            .with("2", Some(0), None)
            .with("3", None, Some(json!({})))
            .with("4", Some(200), Some(json!(["not", "an", "object"])));
        let mut translator = translator_with(&FakeTranslator::default());
        for id in ["1", "2", "3", "4"] {
            let result = enricher()
                .fetch_details(&mut source, &mut translator, id, "fallback")
                .await;
            assert_eq!(result.outcome(), "rejected", "id {id}");
            assert_eq!(result.record().secondary_code, "fallback");
        }
        assert_eq!(source.calls.len(), 4);
    }

    #[tokio::test]
    async fn irregular_payload_still_succeeds_with_usable_fields() {
        let mut source = TableDetailSource::default().with(
            "5",
            Some(0),
            Some(json!({
                "attrList": [
                    {"name": "颜色", "values": ["金色"]},
                    {"values": ["x"]}
                ],
                "images": ["p/5/a.jpg"],
                "imgList": ["p/5/b.jpg"],
                "storeName": {"id": 1},
                "shopDesc": "wuhan store"
            })),
        );
        let fake = FakeTranslator::with_entries(&[("金色", "Золотой")]);
        let mut translator = translator_with(&fake);
        let result = enricher()
            .fetch_details(&mut source, &mut translator, "5", "5")
            .await;
        assert!(result.is_success(), "got {}", result.outcome());
        let record = result.into_record();
        assert_eq!(record.attributes.len(), 1);
        assert_eq!(record.attributes["Цвет"], "Золотой");
        assert_eq!(record.image_urls, vec!["https://img.example.com/p/5/b.jpg".to_string()]);
        assert_eq!(record.location_code.as_deref(), Some("WUH"));
        assert_eq!(record.secondary_code, "5-WUH");
    }

    #[tokio::test]
    async fn short_store_token_keeps_fallback_code() {
        let mut source = TableDetailSource::default().with(
            "9",
            Some(200),
            Some(json!({"storeDesc": "bj store"})),
        );
        let mut translator = translator_with(&FakeTranslator::default());
        let record = enricher()
            .fetch_details(&mut source, &mut translator, "9", "9")
            .await
            .into_record();
        assert!(record.location_code.is_none());
        assert_eq!(record.secondary_code, "9");
    }
}

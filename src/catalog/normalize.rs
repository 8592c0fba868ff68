//! Projection of heterogeneous catalog records onto [`Product`].
//!
//! Every canonical field is read through an ordered list of raw key names and
//! the first present, non-empty value wins. Records may carry their payload
//! flat or wrapped one level deeper under a container key.

use crate::catalog::RawRecord;
use crate::catalog::price::{PriceUnit, normalize_price};
use crate::models::Product;
use serde_json::Value;
use std::collections::BTreeMap;

const CONTAINER_KEYS: &[&str] = &["product", "goods", "item"];
const IDENTITY_KEYS: &[&str] = &["id", "productId", "spuId", "sku"];
const NAME_KEYS: &[&str] = &["name", "productName", "title"];
const DESCRIPTION_KEYS: &[&str] = &["description", "desc", "degreeName"];
const PRICE_KEYS: &[&str] = &["price", "salePrice", "currentPrice", "showPrice"];
const MARKET_PRICE_KEYS: &[&str] = &["marketPrice", "originalPrice"];
const PRIMARY_IMAGE_KEYS: &[&str] = &["ico", "image", "mainImage", "img"];
const GALLERY_KEYS: &[&str] = &["images", "imageList", "gallery"];
const BRAND_KEYS: &[&str] = &["brand", "brandName"];
const SIZE_KEYS: &[&str] = &["sizeName", "size"];
const CONDITION_KEYS: &[&str] = &["degreeName", "condition"];
const SKU_KEYS: &[&str] = &["sku"];

#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub media_base: String,
    pub currency: String,
    pub price_unit: PriceUnit,
    pub market_price_unit: PriceUnit,
    pub brand_filter: Option<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            media_base: String::new(),
            currency: "CNY".into(),
            price_unit: PriceUnit::Cents,
            market_price_unit: PriceUnit::Cents,
            brand_filter: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Returns `None` when the record has no identity or fails the brand filter.
    pub fn normalize(&self, raw: &RawRecord) -> Option<Product> {
        let record = unwrap_container(raw);

        let id = first_text(record, IDENTITY_KEYS)?;
        let brand = first_brand(record).unwrap_or_default();
        if let Some(filter) = self
            .config
            .brand_filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            && !brand.trim().eq_ignore_ascii_case(filter)
        {
            return None;
        }

        let name = first_text(record, NAME_KEYS).unwrap_or_default();
        let size = first_text(record, SIZE_KEYS).unwrap_or_default();
        let condition_label = first_text(record, CONDITION_KEYS).unwrap_or_default();
        let base_description = first_text(record, DESCRIPTION_KEYS).unwrap_or_default();
        let description = if size.is_empty() {
            base_description
        } else {
            format!("{base_description}. Size: {size}")
        };
        let sku = first_text(record, SKU_KEYS).unwrap_or_default();

        let price = normalize_price(first_present(record, PRICE_KEYS), self.config.price_unit);
        let market_price = normalize_price(
            first_present(record, MARKET_PRICE_KEYS),
            self.config.market_price_unit,
        );

        let mut product = Product {
            article: id.clone(),
            id,
            sku,
            name,
            name_translated: String::new(),
            description,
            price,
            market_price,
            currency: self.config.currency.clone(),
            brand,
            size,
            condition: clean_condition(&condition_label),
            primary_image: None,
            images: Vec::new(),
            attributes: BTreeMap::new(),
            location_code: None,
            local_images: Vec::new(),
            raw_data: Value::Object(raw.clone()),
        };

        if let Some(primary) = first_text(record, PRIMARY_IMAGE_KEYS) {
            let url = absolutize(&primary, &self.config.media_base);
            product.primary_image = Some(url.clone());
            product.push_image(url);
        }
        for entry in gallery_entries(record) {
            product.push_image(absolutize(&entry, &self.config.media_base));
        }

        Some(product)
    }
}

fn unwrap_container(raw: &RawRecord) -> &RawRecord {
    CONTAINER_KEYS
        .iter()
        .find_map(|key| raw.get(*key).and_then(Value::as_object))
        .unwrap_or(raw)
}

fn first_present<'a>(record: &'a RawRecord, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find(|value| value_text(value).is_some())
}

fn first_text(record: &RawRecord, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find_map(value_text)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_brand(record: &RawRecord) -> Option<String> {
    BRAND_KEYS.iter().filter_map(|key| record.get(*key)).find_map(|value| match value {
        Value::Object(obj) => obj.get("name").and_then(value_text),
        other => value_text(other),
    })
}

fn gallery_entries(record: &RawRecord) -> Vec<String> {
    let Some(list) = GALLERY_KEYS
        .iter()
        .filter_map(|key| record.get(*key).and_then(Value::as_array))
        .find(|list| !list.is_empty())
    else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|entry| match entry {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Object(obj) => ["url", "src"]
                .iter()
                .find_map(|key| obj.get(*key).and_then(value_text)),
            _ => None,
        })
        .collect()
}

/// Keeps digits and decimal points only (`"9成新"` -> `"9"`).
pub fn clean_condition(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect()
}

pub fn absolutize(url: &str, media_base: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    if let Some(rest) = url.strip_prefix("//") {
        return format!("https://{rest}");
    }
    if media_base.trim().is_empty() {
        return url.to_string();
    }
    format!(
        "{}/{}",
        media_base.trim_end_matches('/'),
        url.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        value.as_object().cloned().expect("object")
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(NormalizerConfig {
            media_base: "https://img.example.com/".into(),
            ..NormalizerConfig::default()
        })
    }

    #[test]
    fn identity_falls_back_to_product_id() {
        let raw = record(json!({"productId": 98765, "name": "Birkin 30"}));
        let product = normalizer().normalize(&raw).expect("product");
        assert_eq!(product.id, "98765");
        assert_eq!(product.article, "98765");
    }

    #[test]
    fn empty_identity_fields_are_skipped() {
        let raw = record(json!({"id": "", "spuId": "S-1"}));
        assert_eq!(normalizer().normalize(&raw).expect("product").id, "S-1");
        let none = record(json!({"name": "no id at all"}));
        assert!(normalizer().normalize(&none).is_none());
    }

    #[test]
    fn unwraps_nested_product_container() {
        let raw = record(json!({
            "product": {"id": 7, "productName": "Kelly", "salePrice": 1000, "brandName": "Hermes"},
            "extra": true
        }));
        let product = normalizer().normalize(&raw).expect("product");
        assert_eq!(product.id, "7");
        assert_eq!(product.name, "Kelly");
        assert_eq!(product.price, "10.0");
        assert_eq!(product.brand, "Hermes");
        assert_eq!(product.raw_data["extra"], json!(true));
    }

    #[test]
    fn price_convention_is_caller_selected() {
        let raw = record(json!({"id": 1, "price": 1000, "marketPrice": 2500}));
        let cents = normalizer().normalize(&raw).expect("product");
        assert_eq!(cents.price, "10.0");
        assert_eq!(cents.market_price, "25.0");

        let units = Normalizer::new(NormalizerConfig {
            price_unit: PriceUnit::Units,
            ..NormalizerConfig::default()
        })
        .normalize(&raw)
        .expect("product");
        assert_eq!(units.price, "1000");
        assert_eq!(units.market_price, "25.0");
    }

    #[test]
    fn missing_price_is_empty_string() {
        let raw = record(json!({"id": 1, "price": null}));
        let product = normalizer().normalize(&raw).expect("product");
        assert_eq!(product.price, "");
        assert_eq!(product.market_price, "");
        assert_eq!(product.currency, "CNY");
    }

    #[test]
    fn condition_keeps_digits_and_point() {
        let raw = record(json!({"id": 1, "degreeName": "9.5成新 (A级)"}));
        let product = normalizer().normalize(&raw).expect("product");
        assert_eq!(product.condition, "9.5");
        assert_eq!(product.description, "9.5成新 (A级)");
    }

    #[test]
    fn description_mentions_size() {
        let raw = record(json!({"id": 1, "desc": "Great", "sizeName": "30cm"}));
        let product = normalizer().normalize(&raw).expect("product");
        assert_eq!(product.description, "Great. Size: 30cm");
        assert_eq!(product.size, "30cm");
    }

    #[test]
    fn images_are_absolute_ordered_and_unique() {
        let raw = record(json!({
            "id": 1,
            "ico": "a/main.jpg",
            "imageList": [
                "a/main.jpg",
                "https://other.example.com/b.png",
                {"url": "//cdn.example.com/c.webp"},
                "https://other.example.com/b.png",
                ""
            ]
        }));
        let product = normalizer().normalize(&raw).expect("product");
        assert_eq!(
            product.primary_image.as_deref(),
            Some("https://img.example.com/a/main.jpg")
        );
        assert_eq!(
            product.images,
            vec![
                "https://img.example.com/a/main.jpg".to_string(),
                "https://other.example.com/b.png".to_string(),
                "https://cdn.example.com/c.webp".to_string(),
            ]
        );
    }

    #[test]
    fn brand_filter_is_case_insensitive() {
        let filtered = Normalizer::new(NormalizerConfig {
            brand_filter: Some("HERMES".into()),
            ..NormalizerConfig::default()
        });
        let hermes = record(json!({"id": 1, "brand": {"name": "hermes"}}));
        let chanel = record(json!({"id": 2, "brand": "Chanel"}));
        assert!(filtered.normalize(&hermes).is_some());
        assert!(filtered.normalize(&chanel).is_none());
    }
}

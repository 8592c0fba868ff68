use crate::translate::{AttributeTranslator, SERIAL_LABEL, WEIGHT_LABEL, YEAR_LABEL, has_source_script};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Joins multiple values of one attribute.
pub const VALUE_SEPARATOR: &str = " | ";
/// Splits a serial attribute into serial proper and year.
pub const SERIAL_DELIMITER: char = '/';
pub const WEIGHT_UNIT: &str = "г";

// Several revisions of the detail endpoint name the same containers differently.
const ATTRIBUTE_LIST_KEYS: &[&str] = &["attrList", "attributes", "params", "specList"];
const IMAGE_LIST_KEYS: &[&str] = &["imgList", "imageList", "images", "pics"];
const STORE_KEYS: &[&str] = &["storeDesc", "storeName", "shopDesc", "store"];
const ATTRIBUTE_NAME_KEYS: &[&str] = &["name", "attrName", "key", "label"];
const ATTRIBUTE_VALUE_KEYS: &[&str] = &["values", "attrValues", "value", "valueList"];

static WEIGHT_UNIT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d)\s*(?:克|grams?|gr|g|грамм(?:а|ов)?|гр)\b").expect("weight unit regex")
});

/// Detail payload projected from the loose `data` object. Unusable fields
/// are left empty; they never invalidate the rest of the payload.
#[derive(Debug, Default)]
pub struct DetailPayload {
    pub attrs: Vec<RawAttribute>,
    pub image_urls: Vec<Value>,
    pub store_description: Option<String>,
}

impl DetailPayload {
    pub fn from_map(data: &Map<String, Value>) -> Self {
        let attr_entries = first_array(data, ATTRIBUTE_LIST_KEYS);
        let attrs: Vec<RawAttribute> = attr_entries
            .iter()
            .filter_map(RawAttribute::from_value)
            .collect();
        if attrs.len() < attr_entries.len() {
            debug!(
                target = "catalog.detail",
                skipped = attr_entries.len() - attrs.len(),
                "attribute_entries_skipped"
            );
        }

        let store_description = STORE_KEYS
            .iter()
            .filter_map(|key| data.get(*key))
            .find_map(|value| match value {
                Value::Object(obj) => ["name", "desc"]
                    .iter()
                    .find_map(|key| obj.get(*key).and_then(non_empty_text)),
                other => non_empty_text(other),
            });

        Self {
            attrs,
            image_urls: first_array(data, IMAGE_LIST_KEYS).to_vec(),
            store_description,
        }
    }
}

#[derive(Debug)]
pub struct RawAttribute {
    pub name: String,
    pub values: Value,
}

impl RawAttribute {
    /// `None` for entries that are not objects or carry no usable name.
    pub fn from_value(entry: &Value) -> Option<Self> {
        let obj = entry.as_object()?;
        let name = ATTRIBUTE_NAME_KEYS
            .iter()
            .filter_map(|key| obj.get(*key))
            .find_map(non_empty_text)?;
        let values = ATTRIBUTE_VALUE_KEYS
            .iter()
            .find_map(|key| obj.get(*key))
            .cloned()
            .unwrap_or(Value::Null);
        Some(Self { name, values })
    }

    pub fn value_texts(&self) -> Vec<String> {
        flatten_values(&self.values)
    }
}

/// First non-empty array among `keys`.
fn first_array<'a>(data: &'a Map<String, Value>, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .filter_map(|key| data.get(*key).and_then(Value::as_array))
        .find(|list| !list.is_empty())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn non_empty_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn flatten_values(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Value::Number(n) => vec![n.to_string()],
        Value::Array(items) => items.iter().flat_map(flatten_values).collect(),
        Value::Object(obj) => ["name", "value", "valueName"]
            .iter()
            .find_map(|key| obj.get(*key))
            .map(flatten_values)
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

pub fn image_texts(entries: &[Value]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Object(obj) => ["url", "src", "img"]
                .iter()
                .find_map(|key| obj.get(*key).and_then(Value::as_str))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            _ => None,
        })
        .collect()
}

/// Translates names and values, joining repeated values for one name.
/// Labels that stay in the source script after translation are dropped so
/// the map never carries raw foreign-script keys.
pub async fn extract_attributes(
    attrs: &[RawAttribute],
    translator: &mut AttributeTranslator,
) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for attr in attrs {
        let mut label = translator.translate_label(&attr.name);
        if has_source_script(&label) {
            label = translator.translate_value(&label).await;
        }
        if label.trim().is_empty() || has_source_script(&label) {
            debug!(target = "catalog.detail", name = %attr.name, "attribute_label_untranslated");
            continue;
        }

        let mut values = Vec::new();
        for raw in attr.value_texts() {
            let translated = translator.translate_value(&raw).await;
            if !translated.trim().is_empty() {
                values.push(translated.trim().to_string());
            }
        }
        if values.is_empty() {
            continue;
        }
        let joined = values.join(VALUE_SEPARATOR);
        out.entry(label)
            .and_modify(|existing| {
                existing.push_str(VALUE_SEPARATOR);
                existing.push_str(&joined);
            })
            .or_insert(joined);
    }
    apply_post_rules(&mut out);
    out
}

pub fn apply_post_rules(attributes: &mut BTreeMap<String, String>) {
    split_serial_year(attributes);
    localize_weight_unit(attributes);
}

fn split_serial_year(attributes: &mut BTreeMap<String, String>) {
    let Some(serial) = attributes.get(SERIAL_LABEL).cloned() else {
        return;
    };
    let Some((number, year)) = serial.split_once(SERIAL_DELIMITER) else {
        return;
    };
    attributes.insert(SERIAL_LABEL.to_string(), number.trim().to_string());
    let year = year.trim();
    if !year.is_empty() {
        attributes.insert(YEAR_LABEL.to_string(), year.to_string());
    }
}

fn localize_weight_unit(attributes: &mut BTreeMap<String, String>) {
    if let Some(weight) = attributes.get_mut(WEIGHT_LABEL) {
        let replaced = WEIGHT_UNIT_TOKEN
            .replace_all(weight, format!("${{1}} {WEIGHT_UNIT}").as_str())
            .into_owned();
        *weight = replaced;
    }
}

/// First three characters, upper-cased, of the first token of the store
/// description; `None` when that token is shorter than three characters.
pub fn location_code(store_description: &str) -> Option<String> {
    let token = store_description.split_whitespace().next()?;
    if token.chars().count() < 3 {
        return None;
    }
    Some(token.chars().take(3).collect::<String>().to_uppercase())
}

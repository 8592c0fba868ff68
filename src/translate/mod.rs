//! Display translation of attribute labels and values.
//!
//! Labels go through a fixed dictionary. Values are sent to the external
//! translator only when they contain CJK ideographs; results are memoized for
//! the lifetime of one [`AttributeTranslator`], and failures are never cached.

pub mod client;

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

pub use client::{HttpTranslator, TranslateError, Translator};

pub const SERIAL_LABEL: &str = "Серийный номер";
pub const YEAR_LABEL: &str = "Год";
pub const WEIGHT_LABEL: &str = "Вес";

const LABELS: &[(&str, &str)] = &[
    ("尺寸", "Размеры"),
    ("尺码", "Размер"),
    ("材质", "Материал"),
    ("颜色", "Цвет"),
    ("序列号", SERIAL_LABEL),
    ("编号", SERIAL_LABEL),
    ("重量", WEIGHT_LABEL),
    ("成色", "Состояние"),
    ("品牌", "Бренд"),
    ("型号", "Модель"),
    ("系列", "Коллекция"),
    ("配件", "Комплектация"),
    ("五金", "Фурнитура"),
    ("产地", "Страна производства"),
    ("年份", YEAR_LABEL),
];

const SOURCE_SCRIPT: std::ops::RangeInclusive<char> = '\u{4e00}'..='\u{9fff}';

/// Commas left in a value after decimal normalization become this separator.
pub const COMMA_REPLACEMENT: &str = " /";

static DECIMAL_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d),(\d)").expect("decimal comma regex"));

pub fn has_source_script(text: &str) -> bool {
    text.chars().any(|c| SOURCE_SCRIPT.contains(&c))
}

/// Static dictionary lookup; unknown labels come back unchanged.
pub fn translate_label(text: &str) -> String {
    let trimmed = text.trim();
    LABELS
        .iter()
        .find(|(source, _)| *source == trimmed)
        .map(|(_, target)| (*target).to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// `"1,5 кг, кожа"` -> `"1.5 кг / кожа"`.
pub fn clean_separators(text: &str) -> String {
    let mut current = text.to_string();
    // Overlapping matches such as `1,2,3` need a second pass.
    loop {
        let next = DECIMAL_COMMA.replace_all(&current, "$1.$2").into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    current.replace(',', COMMA_REPLACEMENT)
}

pub struct AttributeTranslator {
    backend: Box<dyn Translator>,
    cache: HashMap<String, String>,
    timeout: Duration,
    external_calls: usize,
}

impl AttributeTranslator {
    pub fn new(backend: Box<dyn Translator>, timeout: Duration) -> Self {
        Self {
            backend,
            cache: HashMap::new(),
            timeout,
            external_calls: 0,
        }
    }

    pub fn translate_label(&self, text: &str) -> String {
        translate_label(text)
    }

    /// Never fails: an unreachable translator degrades to pass-through.
    pub async fn translate_value(&mut self, text: &str) -> String {
        if !has_source_script(text) {
            return text.to_string();
        }
        if let Some(hit) = self.cache.get(text) {
            return hit.clone();
        }

        self.external_calls += 1;
        let outcome = match tokio::time::timeout(self.timeout, self.backend.translate(text)).await {
            Ok(result) => result,
            Err(_) => Err(TranslateError::Timeout(self.timeout.as_secs())),
        };
        match outcome {
            Ok(translated) => {
                let cleaned = clean_separators(translated.trim());
                self.cache.insert(text.to_string(), cleaned.clone());
                cleaned
            }
            Err(err) => {
                warn!(target = "catalog.translate", text = %text, error = %err, "translation_failed_passthrough");
                text.to_string()
            }
        }
    }

    pub fn external_calls(&self) -> usize {
        self.external_calls
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

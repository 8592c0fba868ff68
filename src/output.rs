use crate::models::Product;
use chrono::Local;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::info;

const CSV_IMAGE_COLUMNS: usize = 5;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("unable to write `{path}`: {message}")]
    Io { path: String, message: String },
    #[error("unable to encode `{path}`: {message}")]
    Encode { path: String, message: String },
}

/// Receives the final ordered product list of a run.
pub trait OutputStage: Send + Sync {
    fn deliver(&self, batch_key: &str, products: &[Product]) -> Result<Vec<PathBuf>, OutputError>;
}

/// JSON dump plus the semicolon-separated CSV consumed by the 1C import.
#[derive(Debug, Clone)]
pub struct FileOutput {
    dir: PathBuf,
}

impl FileOutput {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn write_json(&self, path: &Path, products: &[Product]) -> Result<(), OutputError> {
        let file = File::create(path).map_err(|err| io_err(path, err))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, products).map_err(|err| OutputError::Encode {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        writer.flush().map_err(|err| io_err(path, err))
    }

    fn write_csv(&self, path: &Path, products: &[Product]) -> Result<(), OutputError> {
        let mut file = File::create(path).map_err(|err| io_err(path, err))?;
        file.write_all(UTF8_BOM).map_err(|err| io_err(path, err))?;
        let mut writer = csv::WriterBuilder::new().delimiter(b';').from_writer(file);
        let encode_err = |err: csv::Error| OutputError::Encode {
            path: path.display().to_string(),
            message: err.to_string(),
        };

        writer.write_record(csv_header()).map_err(encode_err)?;
        for product in products {
            writer.write_record(csv_row(product)).map_err(encode_err)?;
        }
        writer.flush().map_err(|err| io_err(path, err))
    }
}

impl OutputStage for FileOutput {
    fn deliver(&self, batch_key: &str, products: &[Product]) -> Result<Vec<PathBuf>, OutputError> {
        std::fs::create_dir_all(&self.dir).map_err(|err| io_err(&self.dir, err))?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let json_path = self.dir.join(format!("products_{batch_key}_{stamp}.json"));
        let csv_path = self.dir.join(format!("products_1c_{batch_key}_{stamp}.csv"));

        self.write_json(&json_path, products)?;
        info!(target = "catalog.output", path = %json_path.display(), "json_written");
        self.write_csv(&csv_path, products)?;
        info!(target = "catalog.output", path = %csv_path.display(), "csv_written");
        Ok(vec![json_path, csv_path])
    }
}

fn csv_header() -> Vec<String> {
    let mut header: Vec<String> = [
        "Код",
        "Артикул",
        "Наименование",
        "Описание",
        "Цена",
        "ЦенаРыночная",
        "Валюта",
        "Бренд",
        "Размер",
        "Состояние",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend((1..=CSV_IMAGE_COLUMNS).map(|i| format!("Картинка{i}")));
    header
}

fn csv_row(product: &Product) -> Vec<String> {
    let mut row = vec![
        product.id.clone(),
        product.article.clone(),
        product.display_name().to_string(),
        product.description.clone(),
        product.price.clone(),
        product.market_price.clone(),
        product.currency.clone(),
        product.brand.clone(),
        product.size.clone(),
        product.condition.clone(),
    ];
    row.extend(
        (0..CSV_IMAGE_COLUMNS).map(|i| product.local_images.get(i).cloned().unwrap_or_default()),
    );
    row
}

fn io_err(path: &Path, err: std::io::Error) -> OutputError {
    OutputError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

//! Dataset file access for MRC: content hashing, CSV parsing and numeric coercion.

use std::path::{Path, PathBuf};

use mrc_core::{ListingRecord, REQUIRED_COLUMNS};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info_span};

pub const CRATE_NAME: &str = "mrc-storage";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing required column `{0}`")]
    MissingColumn(String),
    #[error("no numeric rent_median_1bhk values in dataset")]
    NoRentData,
}

/// Raw bytes of a dataset file plus their content hash.
#[derive(Debug, Clone)]
pub struct DatasetFile {
    pub path: PathBuf,
    pub content_hash: String,
    pub bytes: Vec<u8>,
}

impl DatasetFile {
    pub async fn read(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref().to_path_buf();
        let bytes = fs::read(&path).await.map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        let content_hash = sha256_hex(&bytes);
        Ok(Self {
            path,
            content_hash,
            bytes,
        })
    }

    pub fn parse(&self) -> Result<Vec<ListingRecord>, LoadError> {
        let span = info_span!("parse_dataset", path = %self.path.display(), hash = %self.content_hash);
        let _guard = span.enter();
        parse_listings_csv(&self.bytes)
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Deserialize)]
struct RawListingRow {
    zone: Option<String>,
    area: Option<String>,
    region: Option<String>,
    rent_median_1bhk: Option<String>,
    rent_min_1bhk: Option<String>,
    rent_max_1bhk: Option<String>,
    deposit_ratio: Option<String>,
}

impl RawListingRow {
    fn into_record(self) -> ListingRecord {
        ListingRecord {
            zone: self.zone.unwrap_or_default(),
            area: self.area.unwrap_or_default(),
            region: self.region.unwrap_or_default(),
            rent_median_1bhk: self.rent_median_1bhk.as_deref().and_then(coerce_numeric),
            rent_min_1bhk: self.rent_min_1bhk.as_deref().and_then(coerce_numeric),
            rent_max_1bhk: self.rent_max_1bhk.as_deref().and_then(coerce_numeric),
            deposit_ratio: self.deposit_ratio.filter(|s| !s.trim().is_empty()),
        }
    }
}

/// Parse a comma-separated dataset. Extra columns are ignored; non-numeric rent
/// cells and cells missing from short rows become `None`.
pub fn parse_listings_csv(bytes: &[u8]) -> Result<Vec<ListingRecord>, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(LoadError::MissingColumn(column.to_string()));
        }
    }

    let mut records = Vec::new();
    for row in reader.deserialize::<RawListingRow>() {
        let record = row?.into_record();
        if record.rent_median_1bhk.is_none() {
            debug!(area = %record.area, "median rent missing or non-numeric");
        }
        records.push(record);
    }

    if !records.iter().any(|r| r.rent_median_1bhk.is_some()) {
        return Err(LoadError::NoRentData);
    }
    Ok(records)
}

/// Finite numbers parse; blanks, `n/a`, `20,000`, `NaN` and infinities do not.
pub fn coerce_numeric(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

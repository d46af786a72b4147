//! Price Sheet Ingestion
//!
//! Admins upload supplier prices as a workbook with a `SUPPLIER_PRICES` sheet
//! (or as a CSV with the same columns). Rows are cleaned and validated into
//! [`PriceOffer`]s ready for publication as a snapshot.

use std::{io::Cursor, path::Path, str::FromStr};

use calamine::{Data, Reader, Xlsx, XlsxError, open_workbook_from_rs};
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

use crate::{
    offers::{OfferKey, PriceOffer},
    snapshots::source_hash,
};

/// Worksheet that holds supplier prices.
pub const SHEET_NAME: &str = "SUPPLIER_PRICES";

const SUPPLIER: &str = "Supplier";
const PRODUCT_CATEGORY: &str = "Product Category";
const PRODUCT: &str = "Product";
const LOCATION: &str = "Location";
const DELIVERY_WINDOW: &str = "Delivery Window";
const PRICE: &str = "Price";
const UNIT: &str = "Unit";

const REQUIRED_COLUMNS: [&str; 5] = [SUPPLIER, PRODUCT, DELIVERY_WINDOW, PRICE, UNIT];

/// Most duplicate keys listed in a [`IngestError::DuplicateRows`] error.
const MAX_REPORTED_DUPLICATES: usize = 50;

/// Errors raised while reading a price sheet.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The workbook could not be opened or read.
    #[error("failed to read workbook: {0}")]
    Workbook(#[from] XlsxError),

    /// The CSV could not be parsed.
    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    /// The workbook has no `SUPPLIER_PRICES` sheet.
    #[error("Workbook must contain a sheet named '{SHEET_NAME}'. Found: {found:?}")]
    MissingSheet {
        /// Sheets that were present
        found: Vec<String>,
    },

    /// Required columns are absent from the header row.
    #[error("Missing required columns: {0:?}")]
    MissingColumns(Vec<String>),

    /// A price cell is not a number.
    #[error("row {row}: price {value:?} is not a number")]
    InvalidPrice {
        /// Spreadsheet row number, counting the header as row 1
        row: usize,
        /// Cell contents
        value: String,
    },

    /// Several rows share a supplier, product, location and delivery window.
    #[error("Duplicate rows found for key (Supplier+Product+Location+Delivery Window):\n{}", .0.join("\n"))]
    DuplicateRows(Vec<String>),

    /// The file extension is not a supported sheet format.
    #[error("unsupported price sheet format: {0}")]
    UnsupportedFormat(String),
}

/// File formats a price sheet can be uploaded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    /// Excel workbook
    Xlsx,

    /// Comma-separated values
    Csv,
}

impl SheetFormat {
    /// Pick the format from a file's extension.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::UnsupportedFormat`] for anything but `.xlsx` and `.csv`.
    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_lowercase();

        match extension.as_str() {
            "xlsx" => Ok(Self::Xlsx),
            "csv" => Ok(Self::Csv),
            other => Err(IngestError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// A validated upload.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetUpload {
    /// Cleaned offers in sheet order
    pub offers: Vec<PriceOffer>,

    /// SHA-256 of the uploaded bytes
    pub source_hash: String,
}

/// Read a price sheet in the given format.
///
/// # Errors
///
/// Returns an [`IngestError`] if the sheet cannot be read or fails validation.
pub fn read_sheet(source: &[u8], format: SheetFormat) -> Result<SheetUpload, IngestError> {
    match format {
        SheetFormat::Xlsx => read_workbook(source),
        SheetFormat::Csv => read_csv(source),
    }
}

/// Read the `SUPPLIER_PRICES` sheet of an Excel workbook.
///
/// # Errors
///
/// Returns an [`IngestError`] if the workbook cannot be read, lacks the sheet,
/// or its rows fail validation.
#[tracing::instrument(name = "ingest.read_workbook", skip_all, fields(bytes = source.len()), err)]
pub fn read_workbook(source: &[u8]) -> Result<SheetUpload, IngestError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(source))?;

    let sheet_names = workbook.sheet_names();

    if !sheet_names.iter().any(|name| name == SHEET_NAME) {
        return Err(IngestError::MissingSheet { found: sheet_names });
    }

    let range = workbook.worksheet_range(SHEET_NAME)?;

    let rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    upload_from_rows(rows, source)
}

/// Read a CSV with a header row.
///
/// # Errors
///
/// Returns an [`IngestError`] if the CSV cannot be parsed or its rows fail validation.
#[tracing::instrument(name = "ingest.read_csv", skip_all, fields(bytes = source.len()), err)]
pub fn read_csv(source: &[u8]) -> Result<SheetUpload, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(source);

    let rows = reader
        .records()
        .map(|record| record.map(|record| record.iter().map(str::to_string).collect()))
        .collect::<Result<Vec<Vec<String>>, csv::Error>>()?;

    upload_from_rows(rows, source)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn upload_from_rows(rows: Vec<Vec<String>>, source: &[u8]) -> Result<SheetUpload, IngestError> {
    let offers = offers_from_rows(rows)?;

    debug!(rows = offers.len(), "validated price sheet");

    Ok(SheetUpload {
        offers,
        source_hash: source_hash(source),
    })
}

/// Column positions resolved from the header row.
struct Columns {
    supplier: usize,
    product_category: Option<usize>,
    product: usize,
    location: Option<usize>,
    delivery_window: usize,
    price: usize,
    unit: usize,
}

impl Columns {
    fn from_header(header: &[String]) -> Result<Self, IngestError> {
        let positions: FxHashMap<&str, usize> = header
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.trim(), idx))
            .collect();

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|name| !positions.contains_key(*name))
            .map(|name| (*name).to_string())
            .collect();

        if !missing.is_empty() {
            return Err(IngestError::MissingColumns(missing));
        }

        let required = |name: &str| {
            positions
                .get(name)
                .copied()
                .ok_or_else(|| IngestError::MissingColumns(vec![name.to_string()]))
        };

        Ok(Self {
            supplier: required(SUPPLIER)?,
            product_category: positions.get(PRODUCT_CATEGORY).copied(),
            product: required(PRODUCT)?,
            location: positions.get(LOCATION).copied(),
            delivery_window: required(DELIVERY_WINDOW)?,
            price: required(PRICE)?,
            unit: required(UNIT)?,
        })
    }
}

fn cell(row: &[String], column: Option<usize>) -> String {
    column
        .and_then(|idx| row.get(idx))
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

fn parse_price(value: &str) -> Option<Decimal> {
    Decimal::from_str(value)
        .or_else(|_err| Decimal::from_scientific(value))
        .ok()
}

/// Validate raw rows (header first) into offers.
fn offers_from_rows(rows: Vec<Vec<String>>) -> Result<Vec<PriceOffer>, IngestError> {
    let mut rows = rows.into_iter();

    let header = rows
        .next()
        .ok_or_else(|| IngestError::MissingColumns(REQUIRED_COLUMNS.map(String::from).to_vec()))?;

    let columns = Columns::from_header(&header)?;

    let mut offers = Vec::new();

    for (idx, row) in rows.enumerate() {
        if row.iter().all(|value| value.trim().is_empty()) {
            continue;
        }

        let sheet_row = idx + 2;
        let raw_price = cell(&row, Some(columns.price));

        if raw_price.is_empty() {
            continue;
        }

        let price = parse_price(&raw_price).ok_or_else(|| IngestError::InvalidPrice {
            row: sheet_row,
            value: raw_price.clone(),
        })?;

        let supplier = cell(&row, Some(columns.supplier));
        let product = cell(&row, Some(columns.product));
        let delivery_window = cell(&row, Some(columns.delivery_window));
        let unit = cell(&row, Some(columns.unit));

        if [&supplier, &product, &delivery_window, &unit]
            .iter()
            .any(|value| value.is_empty())
        {
            continue;
        }

        let key = OfferKey::new(product, cell(&row, columns.location), delivery_window);

        offers.push(
            PriceOffer::new(supplier, key, price)
                .with_category(cell(&row, columns.product_category))
                .with_unit(unit),
        );
    }

    reject_duplicates(&offers)?;

    Ok(offers)
}

fn reject_duplicates(offers: &[PriceOffer]) -> Result<(), IngestError> {
    let mut counts: FxHashMap<(&str, &OfferKey), usize> = FxHashMap::default();

    for offer in offers {
        *counts.entry((offer.supplier.as_str(), &offer.key)).or_default() += 1;
    }

    let duplicates: Vec<String> = offers
        .iter()
        .filter(|offer| {
            counts
                .get(&(offer.supplier.as_str(), &offer.key))
                .is_some_and(|&count| count > 1)
        })
        .take(MAX_REPORTED_DUPLICATES)
        .map(|offer| {
            format!(
                "{} | {} | {} | {}",
                offer.supplier, offer.key.product, offer.key.location, offer.key.delivery_window
            )
        })
        .collect();

    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(IngestError::DuplicateRows(duplicates))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use rust_decimal::Decimal;
    use testresult::TestResult;

    use super::*;

    const HEADER: &str = "Supplier,Product Category,Product,Location,Delivery Window,Price,Unit\n";

    fn csv(body: &str) -> Vec<u8> {
        format!("{HEADER}{body}").into_bytes()
    }

    #[test]
    fn reads_and_trims_rows() -> TestResult {
        let upload = read_csv(&csv(" Yara , Nitrogen, Urea ,Hull, Mar-26 ,280.50, t \n"))?;

        let offer = upload.offers.first().ok_or("expected an offer")?;

        assert_eq!(offer.supplier, "Yara");
        assert_eq!(offer.product_category, "Nitrogen");
        assert_eq!(offer.key, OfferKey::new("Urea", "Hull", "Mar-26"));
        assert_eq!(offer.price, Decimal::new(28050, 2));
        assert_eq!(offer.unit, "t");

        Ok(())
    }

    #[test]
    fn optional_columns_default_to_blank() -> TestResult {
        let source = b"Supplier,Product,Delivery Window,Price,Unit\nYara,Urea,Mar-26,280,t\n";

        let upload = read_csv(source)?;
        let offer = upload.offers.first().ok_or("expected an offer")?;

        assert_eq!(offer.key.location, "");
        assert_eq!(offer.product_category, "");

        Ok(())
    }

    #[test]
    fn missing_required_columns_are_listed() {
        let source = b"Supplier,Product,Price\nYara,Urea,280\n";

        let result = read_csv(source);

        assert!(matches!(
            result,
            Err(IngestError::MissingColumns(missing)) if missing == ["Delivery Window", "Unit"]
        ));
    }

    #[test]
    fn non_numeric_price_is_an_error() {
        let result = read_csv(&csv("Yara,,Urea,Hull,Mar-26,tbc,t\n"));

        assert!(matches!(
            result,
            Err(IngestError::InvalidPrice { row: 2, value }) if value == "tbc"
        ));
    }

    #[test]
    fn rows_missing_required_values_are_dropped() -> TestResult {
        let upload = read_csv(&csv(
            "Yara,,Urea,Hull,Mar-26,280,t\n\
             ,,Urea,Hull,Mar-26,270,t\n\
             Bunge,,Urea,Hull,Mar-26,,t\n\
             Bunge,,Urea,Hull,,275,t\n\
             ,,,,,,\n",
        ))?;

        assert_eq!(upload.offers.len(), 1);

        Ok(())
    }

    #[test]
    fn blank_location_is_allowed() -> TestResult {
        let upload = read_csv(&csv("Yara,,Urea,,Mar-26,280,t\n"))?;

        assert_eq!(upload.offers.len(), 1);

        Ok(())
    }

    #[test]
    fn duplicate_keys_are_reported() {
        let result = read_csv(&csv(
            "Yara,,Urea,Hull,Mar-26,280,t\n\
             Yara,,Urea,Hull,Mar-26,290,t\n\
             Bunge,,Urea,Hull,Mar-26,285,t\n",
        ));

        assert!(matches!(
            result,
            Err(IngestError::DuplicateRows(rows)) if rows.len() == 2
        ));
    }

    #[test]
    fn upload_carries_source_hash() -> TestResult {
        let source = csv("Yara,,Urea,Hull,Mar-26,280,t\n");

        let upload = read_sheet(&source, SheetFormat::Csv)?;

        assert_eq!(upload.source_hash, source_hash(&source));

        Ok(())
    }

    #[test]
    fn empty_csv_is_missing_every_column() {
        assert!(matches!(
            read_csv(b""),
            Err(IngestError::MissingColumns(missing)) if missing.len() == REQUIRED_COLUMNS.len()
        ));
    }

    #[test]
    fn invalid_workbook_bytes_error() {
        assert!(matches!(
            read_workbook(b"not a workbook"),
            Err(IngestError::Workbook(_))
        ));
    }

    #[test]
    fn format_follows_extension() -> TestResult {
        assert_eq!(SheetFormat::from_path(Path::new("prices.XLSX"))?, SheetFormat::Xlsx);
        assert_eq!(SheetFormat::from_path(Path::new("prices.csv"))?, SheetFormat::Csv);
        assert!(matches!(
            SheetFormat::from_path(Path::new("prices.ods")),
            Err(IngestError::UnsupportedFormat(ext)) if ext == "ods"
        ));

        Ok(())
    }

    #[test]
    fn scientific_prices_parse() {
        assert_eq!(parse_price("2.8e2"), Some(Decimal::from(280)));
        assert_eq!(parse_price("abc"), None);
    }
}

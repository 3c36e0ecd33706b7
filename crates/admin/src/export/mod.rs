//! Table export to CSV, JSON, XML and a standalone HTML document.
//!
//! Every admin list becomes a [`Table`] of display strings first, so all
//! formats show the same columns and values.

mod csv;
mod xml;

use askama::Template;
use chrono::{DateTime, Utc};
use inkcartridges_core::format::format_price;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::models::{AdminCustomer, AdminOrder, AdminProduct};

/// Export errors.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Row {row} has {found} fields, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown export format: {0}")]
    UnknownFormat(String),
    #[error("JSON export failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTML export failed: {0}")]
    Html(#[from] askama::Error),
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Xml,
    Html,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Html => "html",
        }
    }

    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Json => "application/json",
            Self::Xml => "application/xml",
            Self::Html => "text/html",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "xml" => Ok(Self::Xml),
            "html" | "htm" => Ok(Self::Html),
            _ => Err(ExportError::UnknownFormat(s.to_string())),
        }
    }
}

/// Rows of display strings under named columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table from records.
    #[must_use]
    pub fn from_records<R: Exportable>(title: impl Into<String>, records: &[R]) -> Self {
        Self {
            title: title.into(),
            columns: R::columns().iter().map(|c| (*c).to_string()).collect(),
            rows: records.iter().map(Exportable::row).collect(),
        }
    }

    /// Every row must have one value per column.
    ///
    /// # Errors
    ///
    /// Returns `ExportError::RowWidth` for the first ragged row.
    pub fn check(&self) -> Result<(), ExportError> {
        let expected = self.columns.len();
        match self.rows.iter().position(|r| r.len() != expected) {
            Some(row) => Err(ExportError::RowWidth {
                row,
                expected,
                found: self.rows.get(row).map_or(0, Vec::len),
            }),
            None => Ok(()),
        }
    }
}

/// A record that can be exported as a table row.
pub trait Exportable {
    fn columns() -> &'static [&'static str];
    fn row(&self) -> Vec<String>;
}

fn date(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

impl Exportable for AdminOrder {
    fn columns() -> &'static [&'static str] {
        &["Order", "Date", "Customer", "Email", "Status", "Items", "Total"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.order_number.clone(),
            date(&self.created_at),
            self.customer_name.clone().unwrap_or_default(),
            self.email.clone().unwrap_or_default(),
            self.status.label().to_string(),
            self.item_count.to_string(),
            format_price(self.total),
        ]
    }
}

impl Exportable for AdminProduct {
    fn columns() -> &'static [&'static str] {
        &["SKU", "Name", "Brand", "Price", "Compare At", "Stock", "Active"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.sku.clone(),
            self.name.clone(),
            self.brand.clone().unwrap_or_default(),
            format_price(self.price),
            self.compare_at_price.map(format_price).unwrap_or_default(),
            self.stock_quantity.to_string(),
            if self.active { "Yes" } else { "No" }.to_string(),
        ]
    }
}

impl Exportable for AdminCustomer {
    fn columns() -> &'static [&'static str] {
        &["Email", "Name", "Orders", "Total Spent", "Joined"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.email.clone(),
            self.name.clone().unwrap_or_default(),
            self.order_count.to_string(),
            format_price(self.total_spent),
            date(&self.created_at),
        ]
    }
}

/// Standalone HTML document.
#[derive(Template)]
#[template(path = "export.html")]
struct HtmlExport<'a> {
    table: &'a Table,
    generated_at: String,
}

/// Render `table` in `format`.
///
/// # Errors
///
/// Returns an error for ragged rows or if serialization fails.
pub fn export(table: &Table, format: ExportFormat) -> Result<String, ExportError> {
    table.check()?;
    debug!(
        title = %table.title,
        rows = table.rows.len(),
        format = format.extension(),
        "Exporting table"
    );
    match format {
        ExportFormat::Csv => Ok(csv::to_csv(table)),
        ExportFormat::Json => to_json(table),
        ExportFormat::Xml => Ok(xml::to_xml(table)),
        ExportFormat::Html => to_html(table, Utc::now()),
    }
}

/// Array of objects keyed by column name.
fn to_json(table: &Table) -> Result<String, ExportError> {
    let rows: Vec<Value> = table
        .rows
        .iter()
        .map(|row| {
            let object: Map<String, Value> = table
                .columns
                .iter()
                .cloned()
                .zip(row.iter().cloned().map(Value::String))
                .collect();
            Value::Object(object)
        })
        .collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}

fn to_html(table: &Table, now: DateTime<Utc>) -> Result<String, ExportError> {
    let page = HtmlExport {
        table,
        generated_at: now.format("%Y-%m-%d %H:%M UTC").to_string(),
    };
    Ok(page.render()?)
}

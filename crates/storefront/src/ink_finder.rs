//! Ink finder: pick a printer by brand, then series, then model, and get
//! the product filters for cartridges that fit it.
//!
//! Lookup tables come from the backend. When a lookup fails the finder
//! falls back to a built-in table of popular printers so the wizard keeps
//! working offline or while the backend is degraded.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use inkcartridges_core::PrinterId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{instrument, warn};

use crate::catalog::ProductFilters;
use crate::error::ApiError;
use crate::storage::{Storage, StorageExt, keys};

/// A printer model option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterModel {
    pub id: PrinterId,
    pub name: String,
}

/// Printer lookup tables.
pub trait PrinterCatalog: Send + Sync {
    /// `GET /api/printers/brands`
    fn printer_brands(&self) -> impl Future<Output = Result<Vec<String>, ApiError>> + Send;

    /// `GET /api/printers/series?brand=`
    fn printer_series(
        &self,
        brand: &str,
    ) -> impl Future<Output = Result<Vec<String>, ApiError>> + Send;

    /// `GET /api/printers/models?brand=&series=`
    fn printer_models(
        &self,
        brand: &str,
        series: &str,
    ) -> impl Future<Output = Result<Vec<PrinterModel>, ApiError>> + Send;
}

/// Errors from a selection step.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FinderError {
    #[error("Unknown printer brand: {0}")]
    UnknownBrand(String),
    #[error("Unknown printer series: {0}")]
    UnknownSeries(String),
    #[error("Unknown printer model: {0}")]
    UnknownModel(String),
    #[error("Choose a brand first")]
    NoBrand,
    #[error("Choose a series first")]
    NoSeries,
}

/// Which finder tab is showing. Remembered across visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinderTab {
    /// Find by printer model.
    #[default]
    Printer,
    /// Find by cartridge number.
    Cartridge,
}

/// Where the current options came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptionSource {
    #[default]
    Backend,
    Fallback,
}

/// Current brand/series/model choice.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FinderSelection {
    pub brand: Option<String>,
    pub series: Option<String>,
    pub model: Option<PrinterModel>,
}

impl FinderSelection {
    /// Whether all three levels are chosen.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.brand.is_some() && self.series.is_some() && self.model.is_some()
    }

    /// Product filters for cartridges compatible with the chosen printer.
    #[must_use]
    pub fn product_filters(&self) -> Option<ProductFilters> {
        let (Some(brand), Some(model)) = (&self.brand, &self.model) else {
            return None;
        };
        self.series.as_ref()?;
        Some(ProductFilters {
            brand: Some(brand.clone()),
            printer: Some(model.name.clone()),
            ..ProductFilters::default()
        })
    }
}

#[derive(Debug, Default)]
struct FinderState {
    selection: FinderSelection,
    brands: Vec<String>,
    series: Vec<String>,
    models: Vec<PrinterModel>,
    source: OptionSource,
}

/// Three-level printer selector.
pub struct InkFinder<C> {
    catalog: Arc<C>,
    storage: Arc<dyn Storage>,
    state: Mutex<FinderState>,
}

impl<C: PrinterCatalog> InkFinder<C> {
    /// Create a finder with nothing selected.
    pub fn new(catalog: Arc<C>, storage: Arc<dyn Storage>) -> Self {
        Self {
            catalog,
            storage,
            state: Mutex::new(FinderState::default()),
        }
    }

    /// Current selection.
    #[must_use]
    pub fn selection(&self) -> FinderSelection {
        self.lock().selection.clone()
    }

    /// Where the most recently loaded options came from.
    #[must_use]
    pub fn source(&self) -> OptionSource {
        self.lock().source
    }

    /// Load the brand list and clear the whole selection.
    #[instrument(skip(self))]
    pub async fn load_brands(&self) -> Vec<String> {
        let (brands, source) = match self.catalog.printer_brands().await {
            Ok(brands) if !brands.is_empty() => (brands, OptionSource::Backend),
            Ok(_) => (fallback::brands(), OptionSource::Fallback),
            Err(e) => {
                warn!(error = %e, "Printer brands unavailable, using built-in list");
                (fallback::brands(), OptionSource::Fallback)
            }
        };

        let mut state = self.lock();
        *state = FinderState {
            brands: brands.clone(),
            source,
            ..FinderState::default()
        };
        brands
    }

    /// Choose a brand. Clears series and model, and returns the series options.
    ///
    /// # Errors
    ///
    /// Returns `UnknownBrand` if `brand` is not among the loaded brands.
    #[instrument(skip(self))]
    pub async fn select_brand(&self, brand: &str) -> Result<Vec<String>, FinderError> {
        if self.lock().brands.is_empty() {
            self.load_brands().await;
        }
        let brand = {
            let mut state = self.lock();
            let brand = find_name(&state.brands, brand)
                .ok_or_else(|| FinderError::UnknownBrand(brand.to_string()))?;
            state.selection = FinderSelection {
                brand: Some(brand.clone()),
                ..FinderSelection::default()
            };
            state.series.clear();
            state.models.clear();
            brand
        };

        let (series, source) = match self.catalog.printer_series(&brand).await {
            Ok(series) if !series.is_empty() => (series, OptionSource::Backend),
            result => {
                if let Err(e) = result {
                    warn!(
                        error = %e,
                        brand = %brand,
                        "Printer series unavailable, using built-in list"
                    );
                }
                (fallback::series(&brand), OptionSource::Fallback)
            }
        };

        let mut state = self.lock();
        // A newer selection replaced ours while we waited.
        if state.selection.brand.as_deref() != Some(brand.as_str()) {
            return Ok(state.series.clone());
        }
        state.series.clone_from(&series);
        state.source = source;
        Ok(series)
    }

    /// Choose a series of the selected brand. Clears the model, and returns
    /// the model options.
    ///
    /// # Errors
    ///
    /// Returns `NoBrand` without a brand and `UnknownSeries` for a series
    /// not offered for it.
    #[instrument(skip(self))]
    pub async fn select_series(&self, series: &str) -> Result<Vec<PrinterModel>, FinderError> {
        let (brand, series) = {
            let mut state = self.lock();
            let brand = state.selection.brand.clone().ok_or(FinderError::NoBrand)?;
            let series = find_name(&state.series, series)
                .ok_or_else(|| FinderError::UnknownSeries(series.to_string()))?;
            state.selection.series = Some(series.clone());
            state.selection.model = None;
            state.models.clear();
            (brand, series)
        };

        let (models, source) = match self.catalog.printer_models(&brand, &series).await {
            Ok(models) if !models.is_empty() => (models, OptionSource::Backend),
            result => {
                if let Err(e) = result {
                    warn!(
                        error = %e,
                        brand = %brand,
                        series = %series,
                        "Printer models unavailable, using built-in list"
                    );
                }
                (fallback::models(&brand, &series), OptionSource::Fallback)
            }
        };

        let mut state = self.lock();
        if state.selection.brand.as_deref() != Some(brand.as_str())
            || state.selection.series.as_deref() != Some(series.as_str())
        {
            return Ok(state.models.clone());
        }
        state.models.clone_from(&models);
        state.source = source;
        Ok(models)
    }

    /// Choose a model by id or name. Completes the selection.
    ///
    /// # Errors
    ///
    /// Returns `NoSeries` before a series is chosen and `UnknownModel` for a
    /// model not offered for it.
    pub fn select_model(&self, model: &str) -> Result<FinderSelection, FinderError> {
        let mut state = self.lock();
        if state.selection.series.is_none() {
            return Err(FinderError::NoSeries);
        }
        let chosen = state
            .models
            .iter()
            .find(|m| m.id.as_str() == model || m.name.eq_ignore_ascii_case(model))
            .cloned()
            .ok_or_else(|| FinderError::UnknownModel(model.to_string()))?;
        state.selection.model = Some(chosen);
        Ok(state.selection.clone())
    }

    /// Clear the series and model, keeping the brand.
    pub fn reset_series(&self) {
        let mut state = self.lock();
        state.selection.series = None;
        state.selection.model = None;
        state.models.clear();
    }

    /// Clear the whole selection. Loaded brands are kept.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.selection = FinderSelection::default();
        state.series.clear();
        state.models.clear();
    }

    /// Remembered tab, defaulting to the printer tab.
    #[must_use]
    pub fn tab(&self) -> FinderTab {
        match self.storage.load_json(keys::INK_FINDER_TAB) {
            Ok(tab) => tab.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Could not read ink finder tab");
                FinderTab::default()
            }
        }
    }

    /// Remember the tab.
    pub fn set_tab(&self, tab: FinderTab) {
        if let Err(e) = self.storage.save_json(keys::INK_FINDER_TAB, &tab) {
            warn!(error = %e, "Could not save ink finder tab");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FinderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn find_name(options: &[String], wanted: &str) -> Option<String> {
    options
        .iter()
        .find(|o| o.eq_ignore_ascii_case(wanted.trim()))
        .cloned()
}

/// Built-in printer table.
mod fallback {
    use inkcartridges_core::PrinterId;

    use super::PrinterModel;

    type Series = (&'static str, &'static [&'static str]);

    const PRINTERS: &[(&str, &[Series])] = &[
        (
            "Brother",
            &[
                ("MFC", &["MFC-J4540DW", "MFC-J5740DW", "MFC-L3770CDW"]),
                ("HL", &["HL-L2350DW", "HL-L3230CDW"]),
                ("DCP", &["DCP-J1200W", "DCP-L2540DW"]),
            ],
        ),
        (
            "Canon",
            &[
                ("PIXMA TS", &["PIXMA TS5160", "PIXMA TS6360", "PIXMA TS8360"]),
                ("PIXMA MG", &["PIXMA MG3660", "PIXMA MG5760"]),
                ("MAXIFY", &["MAXIFY MB2160", "MAXIFY GX7060"]),
            ],
        ),
        (
            "Epson",
            &[
                ("WorkForce", &["WorkForce WF-2930", "WorkForce WF-3820"]),
                ("Expression", &["Expression Home XP-2200", "Expression Premium XP-6100"]),
                ("EcoTank", &["EcoTank ET-2810", "EcoTank ET-4850"]),
            ],
        ),
        (
            "HP",
            &[
                ("DeskJet", &["DeskJet 2720", "DeskJet 4120e"]),
                ("OfficeJet", &["OfficeJet Pro 8020", "OfficeJet Pro 9010"]),
                ("ENVY", &["ENVY 6020", "ENVY Inspire 7220e"]),
            ],
        ),
    ];

    pub fn brands() -> Vec<String> {
        PRINTERS.iter().map(|(brand, _)| (*brand).to_string()).collect()
    }

    fn series_of(brand: &str) -> &'static [Series] {
        PRINTERS
            .iter()
            .find(|(b, _)| b.eq_ignore_ascii_case(brand))
            .map_or(&[], |(_, series)| *series)
    }

    pub fn series(brand: &str) -> Vec<String> {
        series_of(brand)
            .iter()
            .map(|(name, _)| (*name).to_string())
            .collect()
    }

    pub fn models(brand: &str, series: &str) -> Vec<PrinterModel> {
        series_of(brand)
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(series))
            .map_or(&[][..], |(_, models)| *models)
            .iter()
            .map(|name| PrinterModel {
                id: PrinterId::new(slug(name)),
                name: (*name).to_string(),
            })
            .collect()
    }

    fn slug(name: &str) -> String {
        name.to_lowercase()
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }

}

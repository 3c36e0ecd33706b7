//! Ink finder lookup tables.

use tracing::{debug, instrument};

use super::ApiClient;
use super::cache::{CacheKey, CacheValue};
use crate::error::Result;
use crate::ink_finder::{PrinterCatalog, PrinterModel};

impl PrinterCatalog for ApiClient {
    #[instrument(skip(self))]
    async fn printer_brands(&self) -> Result<Vec<String>> {
        if let Some(CacheValue::Names(brands)) = self.inner.cache.get(&CacheKey::PrinterBrands).await
        {
            debug!("Cache hit for printer brands");
            return Ok(brands);
        }

        let brands: Vec<String> = self.get(self.url(&["api", "printers", "brands"])?).await?;
        self.inner
            .cache
            .insert(CacheKey::PrinterBrands, CacheValue::Names(brands.clone()))
            .await;
        Ok(brands)
    }

    #[instrument(skip(self))]
    async fn printer_series(&self, brand: &str) -> Result<Vec<String>> {
        let key = CacheKey::PrinterSeries {
            brand: brand.to_string(),
        };
        if let Some(CacheValue::Names(series)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for printer series");
            return Ok(series);
        }

        let url = self.url_with_query(&["api", "printers", "series"], &[("brand", brand)])?;
        let series: Vec<String> = self.get(url).await?;
        self.inner
            .cache
            .insert(key, CacheValue::Names(series.clone()))
            .await;
        Ok(series)
    }

    #[instrument(skip(self))]
    async fn printer_models(&self, brand: &str, series: &str) -> Result<Vec<PrinterModel>> {
        let key = CacheKey::PrinterModels {
            brand: brand.to_string(),
            series: series.to_string(),
        };
        if let Some(CacheValue::Models(models)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for printer models");
            return Ok(models);
        }

        let url = self.url_with_query(
            &["api", "printers", "models"],
            &[("brand", brand), ("series", series)],
        )?;
        let models: Vec<PrinterModel> = self.get(url).await?;
        self.inner
            .cache
            .insert(key, CacheValue::Models(models.clone()))
            .await;
        Ok(models)
    }
}

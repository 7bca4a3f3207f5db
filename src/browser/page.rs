//! chromiumoxide-backed [`PageDom`] implementation.

use async_trait::async_trait;
use chromiumoxide::Page;

use crate::error::WardenError;
use crate::session::inspector::PageDom;

/// Adapter exposing a live CDP page through the inspector's capability trait.
#[derive(Clone)]
pub struct CdpPage {
    inner: Page,
}

impl CdpPage {
    pub fn new(page: Page) -> Self {
        Self { inner: page }
    }

    pub fn raw(&self) -> &Page {
        &self.inner
    }
}

#[async_trait]
impl PageDom for CdpPage {
    async fn current_url(&self) -> Result<String, WardenError> {
        self.inner
            .url()
            .await
            .map_err(|e| WardenError::PageUnavailable(e.to_string()))
            .map(|u| u.unwrap_or_default())
    }

    async fn title(&self) -> Result<String, WardenError> {
        self.inner
            .get_title()
            .await
            .map_err(|e| WardenError::PageUnavailable(e.to_string()))
            .map(|t| t.unwrap_or_default())
    }

    async fn eval_bool(&self, js: &str) -> Result<bool, WardenError> {
        let value = self
            .inner
            .evaluate(js)
            .await
            .map_err(|e| WardenError::PageUnavailable(e.to_string()))?
            .into_value::<serde_json::Value>()
            .map_err(|e| WardenError::PageUnavailable(e.to_string()))?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

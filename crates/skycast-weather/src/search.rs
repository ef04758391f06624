//! Free-text city search against the geocoding endpoint.

use std::sync::Arc;

use futures::{future, stream, Stream, StreamExt};

use crate::api::{ApiSettings, GeocodingItem, GEOCODING_PATH};
use crate::error::DomainError;
use crate::transport::{get_json, Transport};
use crate::types::{Location, ProgressiveResult};

/// Resolves city names to candidate locations. Never touches the cache.
#[derive(Clone)]
pub struct LocationSearch {
    transport: Arc<dyn Transport>,
    settings: ApiSettings,
}

impl LocationSearch {
    pub fn new(transport: Arc<dyn Transport>, settings: ApiSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// One network lookup. Zero matches is `Ok(vec![])`.
    pub async fn search(&self, city_name: &str) -> Result<Vec<Location>, DomainError> {
        let query = self.settings.geocoding_query(city_name);
        let items: Vec<GeocodingItem> =
            get_json(self.transport.as_ref(), GEOCODING_PATH, &query).await?;

        tracing::debug!("Geocoding '{}' matched {} locations", city_name, items.len());
        Ok(items.into_iter().map(Location::from).collect())
    }

    /// `Loading`, then the outcome of [`search`](Self::search).
    pub fn search_stream(
        &self,
        city_name: &str,
    ) -> impl Stream<Item = ProgressiveResult<Vec<Location>>> + Send + 'static {
        let this = self.clone();
        let city_name = city_name.to_string();

        stream::once(future::ready(ProgressiveResult::Loading)).chain(stream::once(
            async move { ProgressiveResult::from(this.search(&city_name).await) },
        ))
    }
}

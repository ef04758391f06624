//! Cache-or-fetch access to forecasts.
//!
//! Every request is a short stream: `Loading` first, then one `Success` or
//! `Failure`. Dropping the stream before the terminal item cancels the
//! in-flight request and skips the cache write.

use std::sync::Arc;

use futures::{future, stream, Stream, StreamExt};

use crate::api::{ApiSettings, ForecastResponse, FORECAST_PATH};
use crate::cache::WeatherCache;
use crate::clock::{self, Clock, SystemClock};
use crate::error::DomainError;
use crate::record::WeatherRecord;
use crate::search::LocationSearch;
use crate::transport::{get_json, Transport};
use crate::types::{ForecastSection, Location, ProgressiveResult, Weather};

/// Stateless coordinator over the forecast cache and the weather API.
#[derive(Clone)]
pub struct WeatherRepository {
    transport: Arc<dyn Transport>,
    cache: WeatherCache,
    search: LocationSearch,
    clock: Arc<dyn Clock>,
    settings: ApiSettings,
}

impl WeatherRepository {
    pub fn new(transport: Arc<dyn Transport>, cache: WeatherCache, settings: ApiSettings) -> Self {
        Self {
            search: LocationSearch::new(Arc::clone(&transport), settings.clone()),
            transport,
            cache,
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    /// Replace the wall clock used for freshness checks and timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache(&self) -> &WeatherCache {
        &self.cache
    }

    /// Whether a record fetched at `fetched_at` can be served now.
    pub fn is_fresh(&self, fetched_at: i64) -> bool {
        clock::is_fresh(fetched_at, self.clock.now_millis())
    }

    /// Forecast for `location`, served from cache when fetched this hour.
    pub fn get_weather(
        &self,
        location: Location,
        exclude: Vec<ForecastSection>,
    ) -> impl Stream<Item = ProgressiveResult<Weather>> + Send + 'static {
        let this = self.clone();
        stream::once(future::ready(ProgressiveResult::Loading)).chain(stream::once(
            async move { ProgressiveResult::from(this.load_weather(&location, &exclude).await) },
        ))
    }

    /// Resolve a free-text city name to candidate locations.
    pub fn get_locations_by_city_name(
        &self,
        city_name: &str,
    ) -> impl Stream<Item = ProgressiveResult<Vec<Location>>> + Send + 'static {
        self.search.search_stream(city_name)
    }

    /// Live list of every cached forecast, most recently used first.
    pub fn get_all_cached_weather(&self) -> impl Stream<Item = Vec<Weather>> + Send + 'static {
        self.cache
            .watch_all()
            .map(|records| records.into_iter().map(Weather::from).collect())
    }

    /// Evict least recently fetched forecasts until at most `max_entries`
    /// remain. Returns the evicted names.
    pub async fn enforce_capacity(&self, max_entries: usize) -> Result<Vec<String>, DomainError> {
        let mut evicted = Vec::new();
        loop {
            let count = self.cache.count().await.map_err(|e| {
                tracing::error!("Failed to count cached forecasts: {}", e);
                DomainError::Unknown
            })?;
            if count <= max_entries {
                break;
            }

            match self.cache.delete_oldest_by_fetch_time().await {
                Ok(Some(name)) => {
                    tracing::info!("Evicted cached forecast for {}", name);
                    evicted.push(name);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Failed to evict cached forecast: {}", e);
                    return Err(DomainError::Unknown);
                }
            }
        }
        Ok(evicted)
    }

    async fn load_weather(
        &self,
        location: &Location,
        exclude: &[ForecastSection],
    ) -> Result<Weather, DomainError> {
        let now = self.clock.now_millis();

        if let Some(weather) = self.cached_if_fresh(&location.name, now).await {
            return Ok(weather);
        }

        tracing::info!("Fetching forecast for {}", location.name);
        let query = self.settings.forecast_query(location, exclude);
        let response: ForecastResponse =
            get_json(self.transport.as_ref(), FORECAST_PATH, &query).await?;

        let record = WeatherRecord::from_response(response, location, now);
        let weather = Weather::from(record.clone());

        // A caller dropped from here on either skips the write or lets it
        // land and notify listeners; never half of it.
        self.cache.put(record).await.map_err(|e| {
            tracing::error!("Failed to cache forecast for {}: {}", location.name, e);
            DomainError::Unknown
        })?;

        Ok(weather)
    }

    /// Cached forecast for `name` when it is fresh, after bumping its
    /// `last_used_at`. Read failures and corrupt entries count as a miss.
    async fn cached_if_fresh(&self, name: &str, now: i64) -> Option<Weather> {
        let record = match self.cache.get(name).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Ignoring unreadable cache entry for {}: {}", name, e);
                return None;
            }
        };

        if !clock::is_fresh(record.fetched_at, now) {
            tracing::debug!("Cached forecast for {} is stale", name);
            return None;
        }

        if let Err(e) = self.cache.touch(name, now).await {
            tracing::warn!("Failed to update last use of {}: {}", name, e);
        }

        tracing::debug!("Serving cached forecast for {}", name);
        let mut weather = Weather::from(record);
        weather.last_used_at = now;
        Some(weather)
    }
}

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A geocoded place. `name` doubles as the cache key for forecasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub country: String,
    #[serde(default)]
    pub state: Option<String>,
}

impl Location {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64, country: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            country: country.into(),
            state: None,
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Human-readable label, e.g. "Taipei, TW" or "Portland, Oregon, US".
    pub fn display_name(&self) -> String {
        match self.state.as_deref().filter(|s| !s.is_empty()) {
            Some(state) => format!("{}, {}, {}", self.name, state, self.country),
            None => format!("{}, {}", self.name, self.country),
        }
    }
}

/// Weather condition descriptor (category, text and icon code).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: i64,
    pub main: String,
    pub description: String,
    pub icon: String,
}

/// Conditions at the time of the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentSnapshot {
    pub dt: i64,
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
    pub temp: f64,
    pub feels_like: f64,
    pub pressure: i64,
    pub humidity: i64,
    pub dew_point: f64,
    pub uvi: f64,
    pub clouds: i64,
    pub visibility: Option<i64>,
    pub wind_speed: f64,
    pub wind_deg: i64,
    pub conditions: Vec<Condition>,
}

/// One hour of the hourly forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlySnapshot {
    pub dt: i64,
    pub temp: f64,
    pub feels_like: f64,
    pub pressure: i64,
    pub humidity: i64,
    pub dew_point: f64,
    pub uvi: f64,
    pub clouds: i64,
    pub visibility: Option<i64>,
    pub wind_speed: f64,
    pub wind_deg: i64,
    pub conditions: Vec<Condition>,
    /// Probability of precipitation, 0.0 to 1.0
    pub pop: f64,
}

/// Temperatures over the course of a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTemperature {
    pub day: f64,
    pub min: f64,
    pub max: f64,
    pub night: f64,
    pub eve: f64,
    pub morn: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeelsLike {
    pub day: f64,
    pub night: f64,
    pub eve: f64,
    pub morn: f64,
}

/// One day of the daily forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub dt: i64,
    pub sunrise: i64,
    pub sunset: i64,
    pub moonrise: i64,
    pub moonset: i64,
    pub moon_phase: f64,
    pub summary: String,
    pub temp: DailyTemperature,
    pub feels_like: FeelsLike,
    pub pressure: i64,
    pub humidity: i64,
    pub dew_point: f64,
    pub wind_speed: f64,
    pub wind_deg: i64,
    pub conditions: Vec<Condition>,
    pub clouds: i64,
    pub pop: f64,
    pub uvi: f64,
}

/// Forecast for one location as handed to presentation code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub location: Location,
    pub timezone: String,
    /// Offset from UTC in seconds
    pub timezone_offset: i32,
    /// Epoch milliseconds when the forecast was downloaded
    pub fetched_at: i64,
    /// Epoch milliseconds when the forecast was last served
    pub last_used_at: i64,
    pub current: Option<CurrentSnapshot>,
    pub hourly: Option<Vec<HourlySnapshot>>,
    pub daily: Option<Vec<DailySnapshot>>,
}

/// Sections of the forecast that can be left out of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastSection {
    Current,
    Minutely,
    Hourly,
    Daily,
    Alerts,
}

impl ForecastSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Minutely => "minutely",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Alerts => "alerts",
        }
    }

    /// Comma-separated form used by the `exclude` query parameter.
    /// Returns `None` when nothing is excluded.
    pub fn join(sections: &[ForecastSection]) -> Option<String> {
        if sections.is_empty() {
            return None;
        }
        Some(
            sections
                .iter()
                .map(ForecastSection::as_str)
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

impl std::str::FromStr for ForecastSection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "current" => Ok(Self::Current),
            "minutely" => Ok(Self::Minutely),
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "alerts" => Ok(Self::Alerts),
            other => Err(format!("unknown forecast section: {}", other)),
        }
    }
}

/// State of a single request as observed by a subscriber.
///
/// Every request stream yields `Loading` first and then exactly one of
/// `Success` or `Failure`.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressiveResult<T> {
    Loading,
    Success(T),
    Failure(DomainError),
}

impl<T> ProgressiveResult<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_loading()
    }

    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&DomainError> {
        match self {
            Self::Failure(error) => Some(error),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ProgressiveResult<U> {
        match self {
            Self::Loading => ProgressiveResult::Loading,
            Self::Success(value) => ProgressiveResult::Success(f(value)),
            Self::Failure(error) => ProgressiveResult::Failure(error),
        }
    }
}

impl<T> From<Result<T, DomainError>> for ProgressiveResult<T> {
    fn from(result: Result<T, DomainError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(error) => Self::Failure(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_with_state() {
        let loc = Location::new("Portland", 45.5, -122.7, "US").with_state("Oregon");
        assert_eq!(loc.display_name(), "Portland, Oregon, US");
    }

    #[test]
    fn test_display_name_without_state() {
        let loc = Location::new("Taipei", 25.03, 121.56, "TW");
        assert_eq!(loc.display_name(), "Taipei, TW");
    }

    #[test]
    fn test_location_equality_covers_all_fields() {
        let a = Location::new("Springfield", 39.8, -89.6, "US").with_state("Illinois");
        let b = Location::new("Springfield", 39.8, -89.6, "US").with_state("Missouri");
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
    }

    #[test]
    fn test_exclude_join() {
        assert_eq!(ForecastSection::join(&[]), None);
        assert_eq!(
            ForecastSection::join(&[ForecastSection::Minutely, ForecastSection::Hourly]),
            Some("minutely,hourly".to_string())
        );
    }

    #[test]
    fn test_section_from_str() {
        assert_eq!("Daily".parse::<ForecastSection>(), Ok(ForecastSection::Daily));
        assert!("weekly".parse::<ForecastSection>().is_err());
    }

    #[test]
    fn test_progressive_result_helpers() {
        let loading: ProgressiveResult<u32> = ProgressiveResult::Loading;
        assert!(loading.is_loading());
        assert!(!loading.is_terminal());

        let ok: ProgressiveResult<u32> = Ok(2).into();
        assert_eq!(ok.clone().map(|v| v * 2), ProgressiveResult::Success(4));
        assert_eq!(ok.success(), Some(2));

        let failed: ProgressiveResult<u32> = Err(DomainError::Timeout).into();
        assert!(failed.is_terminal());
        assert_eq!(failed.failure(), Some(&DomainError::Timeout));
    }
}

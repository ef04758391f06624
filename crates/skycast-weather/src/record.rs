//! Storage shape of a cached forecast and its mapping to and from the
//! wire and domain models.

use crate::api::ForecastResponse;
use crate::types::{CurrentSnapshot, DailySnapshot, HourlySnapshot, Location, Weather};

/// One cached forecast, keyed by location name.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherRecord {
    pub name: String,
    pub country: String,
    pub state: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub fetched_at: i64,
    pub last_used_at: i64,
    pub timezone: String,
    pub timezone_offset: i32,
    pub current: Option<CurrentSnapshot>,
    pub hourly: Option<Vec<HourlySnapshot>>,
    pub daily: Option<Vec<DailySnapshot>>,
}

impl WeatherRecord {
    /// Build the record persisted after a successful fetch.
    ///
    /// Identity comes from the requested location; coordinates come from the
    /// response. Both timestamps are set to `now`.
    pub fn from_response(response: ForecastResponse, location: &Location, now: i64) -> Self {
        Self {
            name: location.name.clone(),
            country: location.country.clone(),
            state: location.state.clone(),
            latitude: response.lat,
            longitude: response.lon,
            fetched_at: now,
            last_used_at: now,
            timezone: response.timezone,
            timezone_offset: response.timezone_offset,
            current: response.current.map(CurrentSnapshot::from),
            hourly: response
                .hourly
                .map(|h| h.into_iter().map(HourlySnapshot::from).collect()),
            daily: response
                .daily
                .map(|d| d.into_iter().map(DailySnapshot::from).collect()),
        }
    }

    pub fn location(&self) -> Location {
        Location {
            name: self.name.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            country: self.country.clone(),
            state: self.state.clone(),
        }
    }
}

impl From<WeatherRecord> for Weather {
    fn from(record: WeatherRecord) -> Self {
        Weather {
            location: record.location(),
            timezone: record.timezone,
            timezone_offset: record.timezone_offset,
            fetched_at: record.fetched_at,
            last_used_at: record.last_used_at,
            current: record.current,
            hourly: record.hourly,
            daily: record.daily,
        }
    }
}

impl From<&Weather> for WeatherRecord {
    fn from(weather: &Weather) -> Self {
        WeatherRecord {
            name: weather.location.name.clone(),
            country: weather.location.country.clone(),
            state: weather.location.state.clone(),
            latitude: weather.location.latitude,
            longitude: weather.location.longitude,
            fetched_at: weather.fetched_at,
            last_used_at: weather.last_used_at,
            timezone: weather.timezone.clone(),
            timezone_offset: weather.timezone_offset,
            current: weather.current.clone(),
            hourly: weather.hourly.clone(),
            daily: weather.daily.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::types::{Condition, DailyTemperature, FeelsLike};

    use super::*;

    pub fn condition() -> Condition {
        Condition {
            id: 500,
            main: "Rain".into(),
            description: "light rain".into(),
            icon: "10d".into(),
        }
    }

    pub fn record(name: &str, fetched_at: i64, last_used_at: i64) -> WeatherRecord {
        WeatherRecord {
            name: name.to_string(),
            country: "TW".into(),
            state: Some("Taipei City".into()),
            latitude: 25.03,
            longitude: 121.56,
            fetched_at,
            last_used_at,
            timezone: "Asia/Taipei".into(),
            timezone_offset: 28800,
            current: Some(CurrentSnapshot {
                dt: 1_700_000_000,
                sunrise: Some(1_699_999_000),
                sunset: None,
                temp: 24.5,
                feels_like: 25.1,
                pressure: 1011,
                humidity: 78,
                dew_point: 20.3,
                uvi: 0.4,
                clouds: 75,
                visibility: Some(10000),
                wind_speed: 3.6,
                wind_deg: 80,
                conditions: vec![condition()],
            }),
            hourly: Some(vec![HourlySnapshot {
                dt: 1_700_003_600,
                temp: 24.1,
                feels_like: 24.6,
                pressure: 1011,
                humidity: 80,
                dew_point: 20.5,
                uvi: 0.0,
                clouds: 90,
                visibility: None,
                wind_speed: 3.2,
                wind_deg: 85,
                conditions: vec![condition()],
                pop: 0.62,
            }]),
            daily: Some(vec![DailySnapshot {
                dt: 1_700_020_000,
                sunrise: 1_699_999_000,
                sunset: 1_700_040_000,
                moonrise: 1_700_010_000,
                moonset: 1_700_050_000,
                moon_phase: 0.25,
                summary: "Expect a day of partly cloudy with rain".into(),
                temp: DailyTemperature {
                    day: 25.0,
                    min: 21.3,
                    max: 27.8,
                    night: 22.0,
                    eve: 24.0,
                    morn: 21.5,
                },
                feels_like: FeelsLike {
                    day: 25.6,
                    night: 22.4,
                    eve: 24.5,
                    morn: 21.9,
                },
                pressure: 1012,
                humidity: 72,
                dew_point: 19.8,
                wind_speed: 4.1,
                wind_deg: 70,
                conditions: vec![condition()],
                clouds: 60,
                pop: 0.8,
                uvi: 6.2,
            }]),
        }
    }
}

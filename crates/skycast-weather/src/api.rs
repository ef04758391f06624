//! Wire format of the OpenWeatherMap One Call and Geocoding endpoints.

use serde::{Deserialize, Deserializer};

use crate::types::{
    Condition, CurrentSnapshot, DailySnapshot, DailyTemperature, FeelsLike, ForecastSection,
    HourlySnapshot, Location,
};

pub const FORECAST_PATH: &str = "data/3.0/onecall";
pub const GEOCODING_PATH: &str = "geo/1.0/direct";
pub const UNITS: &str = "metric";
pub const DEFAULT_GEOCODE_LIMIT: u32 = 5;

/// Request parameters shared by every call to the API.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub api_key: String,
    pub geocode_limit: u32,
}

impl ApiSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            geocode_limit: DEFAULT_GEOCODE_LIMIT,
        }
    }

    pub fn with_geocode_limit(mut self, limit: u32) -> Self {
        self.geocode_limit = limit;
        self
    }

    pub(crate) fn forecast_query(
        &self,
        location: &Location,
        exclude: &[ForecastSection],
    ) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("lat", location.latitude.to_string()),
            ("lon", location.longitude.to_string()),
        ];
        if let Some(exclude) = ForecastSection::join(exclude) {
            query.push(("exclude", exclude));
        }
        query.push(("units", UNITS.to_string()));
        query.push(("appid", self.api_key.clone()));
        query
    }

    pub(crate) fn geocoding_query(&self, city_name: &str) -> Vec<(&'static str, String)> {
        vec![
            ("q", city_name.to_string()),
            ("limit", self.geocode_limit.to_string()),
            ("appid", self.api_key.clone()),
        ]
    }
}

/// Error payload returned in the body of failed requests.
///
/// The API is inconsistent about `cod`: it is a number on some endpoints and
/// a numeric string on others.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "cod", deserialize_with = "int_or_string")]
    pub code: i32,
    pub message: String,
}

fn int_or_string<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Int(i32),
        Text(String),
    }

    match Code::deserialize(deserializer)? {
        Code::Int(code) => Ok(code),
        Code::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    pub lat: f64,
    pub lon: f64,
    pub timezone: String,
    pub timezone_offset: i32,
    pub current: Option<ApiCurrent>,
    pub hourly: Option<Vec<ApiHourly>>,
    pub daily: Option<Vec<ApiDaily>>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCondition {
    pub id: i64,
    pub main: String,
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiCurrent {
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
    pub weather: Vec<ApiCondition>,
}

#[derive(Debug, Deserialize)]
pub struct ApiHourly {
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
    pub weather: Vec<ApiCondition>,
    #[serde(default)]
    pub pop: f64,
}

#[derive(Debug, Deserialize)]
pub struct ApiTemperature {
    pub day: f64,
    pub min: f64,
    pub max: f64,
    pub night: f64,
    pub eve: f64,
    pub morn: f64,
}

#[derive(Debug, Deserialize)]
pub struct ApiFeelsLike {
    pub day: f64,
    pub night: f64,
    pub eve: f64,
    pub morn: f64,
}

#[derive(Debug, Deserialize)]
pub struct ApiDaily {
    pub dt: i64,
    pub sunrise: i64,
    pub sunset: i64,
    pub moonrise: i64,
    pub moonset: i64,
    pub moon_phase: f64,
    #[serde(default)]
    pub summary: String,
    pub temp: ApiTemperature,
    pub feels_like: ApiFeelsLike,
    pub pressure: i64,
    pub humidity: i64,
    pub dew_point: f64,
    pub wind_speed: f64,
    pub wind_deg: i64,
    pub weather: Vec<ApiCondition>,
    pub clouds: i64,
    #[serde(default)]
    pub pop: f64,
    pub uvi: f64,
}

/// One match from the direct geocoding endpoint.
#[derive(Debug, Deserialize)]
pub struct GeocodingItem {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub country: String,
    #[serde(default)]
    pub state: Option<String>,
}

impl From<GeocodingItem> for Location {
    fn from(item: GeocodingItem) -> Self {
        Location {
            name: item.name,
            latitude: item.lat,
            longitude: item.lon,
            country: item.country,
            state: item.state,
        }
    }
}

impl From<ApiCondition> for Condition {
    fn from(c: ApiCondition) -> Self {
        Condition {
            id: c.id,
            main: c.main,
            description: c.description,
            icon: c.icon,
        }
    }
}

fn conditions(list: Vec<ApiCondition>) -> Vec<Condition> {
    list.into_iter().map(Condition::from).collect()
}

impl From<ApiCurrent> for CurrentSnapshot {
    fn from(c: ApiCurrent) -> Self {
        CurrentSnapshot {
            dt: c.dt,
            sunrise: c.sunrise,
            sunset: c.sunset,
            temp: c.temp,
            feels_like: c.feels_like,
            pressure: c.pressure,
            humidity: c.humidity,
            dew_point: c.dew_point,
            uvi: c.uvi,
            clouds: c.clouds,
            visibility: c.visibility,
            wind_speed: c.wind_speed,
            wind_deg: c.wind_deg,
            conditions: conditions(c.weather),
        }
    }
}

impl From<ApiHourly> for HourlySnapshot {
    fn from(h: ApiHourly) -> Self {
        HourlySnapshot {
            dt: h.dt,
            temp: h.temp,
            feels_like: h.feels_like,
            pressure: h.pressure,
            humidity: h.humidity,
            dew_point: h.dew_point,
            uvi: h.uvi,
            clouds: h.clouds,
            visibility: h.visibility,
            wind_speed: h.wind_speed,
            wind_deg: h.wind_deg,
            conditions: conditions(h.weather),
            pop: h.pop,
        }
    }
}

impl From<ApiDaily> for DailySnapshot {
    fn from(d: ApiDaily) -> Self {
        DailySnapshot {
            dt: d.dt,
            sunrise: d.sunrise,
            sunset: d.sunset,
            moonrise: d.moonrise,
            moonset: d.moonset,
            moon_phase: d.moon_phase,
            summary: d.summary,
            temp: DailyTemperature {
                day: d.temp.day,
                min: d.temp.min,
                max: d.temp.max,
                night: d.temp.night,
                eve: d.temp.eve,
                morn: d.temp.morn,
            },
            feels_like: FeelsLike {
                day: d.feels_like.day,
                night: d.feels_like.night,
                eve: d.feels_like.eve,
                morn: d.feels_like.morn,
            },
            pressure: d.pressure,
            humidity: d.humidity,
            dew_point: d.dew_point,
            wind_speed: d.wind_speed,
            wind_deg: d.wind_deg,
            conditions: conditions(d.weather),
            clouds: d.clouds,
            pop: d.pop,
            uvi: d.uvi,
        }
    }
}

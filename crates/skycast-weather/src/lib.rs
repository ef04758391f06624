//! Weather data layer for SkyCast.
//!
//! Serves OpenWeatherMap One Call forecasts through a local SQLite cache,
//! resolves city names via the geocoding API, and remembers the last
//! selected location.

pub mod api;
pub mod cache;
pub mod classify;
pub mod clock;
pub mod error;
pub mod preferences;
pub mod record;
pub mod repository;
pub mod search;
pub mod transport;
pub mod types;

pub use api::ApiSettings;
pub use cache::{SqliteWeatherStore, WeatherCache, WeatherStore};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{CacheError, DomainError, PreferenceError, TransportError};
pub use preferences::{FilePreferenceStore, LocationPreferences, PreferenceStore};
pub use record::WeatherRecord;
pub use repository::WeatherRepository;
pub use search::LocationSearch;
pub use transport::{HttpResponse, ReqwestTransport, Transport, DEFAULT_BASE_URL};
pub use types::*;

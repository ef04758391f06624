//! SkyCast - cached OpenWeatherMap forecasts from the terminal.
//!
//! Run with: `cargo run -- weather Taipei`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use futures::{Stream, StreamExt};

use skycast_core::{AppError, Config, ConfigError, DatabaseError};
use skycast_weather::{
    ApiSettings, DomainError, FilePreferenceStore, ForecastSection, Location,
    LocationPreferences, ProgressiveResult, ReqwestTransport, SqliteWeatherStore, Weather,
    WeatherCache, WeatherRepository,
};

/// SkyCast - current, hourly and daily forecasts with a local cache.
#[derive(Parser, Debug)]
#[command(name = "skycast")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the forecast for a city (defaults to the last one viewed).
    Weather {
        /// City name to look up.
        city: Option<String>,

        /// Forecast sections to leave out, comma separated
        /// (current, minutely, hourly, daily, alerts).
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<ForecastSection>,
    },

    /// List locations matching a city name.
    Search {
        query: String,
    },

    /// List cached forecasts, most recently viewed first.
    Recent,

    /// Show the last selected location.
    Last,

    /// Remove every cached forecast.
    ClearCache,
}

/// Everything a command needs, wired from the configuration.
struct Services {
    config: Config,
    repository: WeatherRepository,
    preferences: LocationPreferences,
}

impl Services {
    fn build(config: Config) -> Result<Self, AppError> {
        let transport = ReqwestTransport::new(
            &config.weather.base_url,
            Duration::from_secs(config.weather.request_timeout_secs),
        )
        .map_err(|e| AppError::Other(anyhow!(e)))?;

        if let Some(parent) = config.cache.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = SqliteWeatherStore::open(&config.cache.database_path)
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let settings = ApiSettings::new(config.weather.api_key.clone())
            .with_geocode_limit(config.weather.geocode_limit);
        let repository =
            WeatherRepository::new(Arc::new(transport), WeatherCache::new(store), settings);

        let preference_store = FilePreferenceStore::open(&config.preferences.path)
            .map_err(|e| AppError::Other(anyhow::Error::new(e).context("Failed to open preferences")))?;
        let preferences = LocationPreferences::new(Arc::new(preference_store));

        Ok(Self {
            config,
            repository,
            preferences,
        })
    }

    fn require_api_key(&self) -> Result<(), AppError> {
        if self.config.weather.is_configured() {
            Ok(())
        } else {
            Err(ConfigError::MissingSetting("weather.api_key".to_string()).into())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = skycast_core::init() {
        eprintln!("{}", e);
    }

    if let Err(e) = run(cli).await {
        tracing::debug!("Command failed: {:?}", e);
        match &e {
            AppError::Other(_) => eprintln!("{}", e),
            _ => eprintln!("{}\n  ({})", e.user_message(), e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = load_config(cli.config)?;
    let services = Services::build(config)?;

    match cli.command {
        Command::Weather { city, exclude } => show_weather(&services, city, exclude).await,
        Command::Search { query } => search(&services, &query).await,
        Command::Recent => recent(&services).await,
        Command::Last => {
            match services.preferences.last_location() {
                Some(location) => println!("{}", location.display_name()),
                None => println!("No location selected yet."),
            }
            Ok(())
        }
        Command::ClearCache => {
            services
                .repository
                .cache()
                .clear()
                .await
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            println!("Cache cleared.");
            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config, AppError> {
    let loaded = match path {
        Some(path) => Config::load_validated_from(&path),
        None => Config::load_validated(),
    };

    match loaded {
        Ok((config, _)) => Ok(config),
        Err(e) => match e.downcast::<ConfigError>() {
            Ok(config_error) => Err(config_error.into()),
            Err(e) => Err(ConfigError::ParseError(format!("{:#}", e)).into()),
        },
    }
}

/// Drive a progressive stream to its terminal item.
async fn terminal<T>(stream: impl Stream<Item = ProgressiveResult<T>>) -> Result<T, DomainError> {
    futures::pin_mut!(stream);
    while let Some(item) = stream.next().await {
        match item {
            ProgressiveResult::Loading => tracing::debug!("Loading..."),
            ProgressiveResult::Success(value) => return Ok(value),
            ProgressiveResult::Failure(error) => return Err(error),
        }
    }
    Err(DomainError::Unknown)
}

fn domain_failure(error: DomainError) -> AppError {
    let message = error.user_message();
    AppError::Other(anyhow::Error::new(error).context(message))
}

async fn show_weather(
    services: &Services,
    city: Option<String>,
    exclude: Vec<ForecastSection>,
) -> Result<(), AppError> {
    services.require_api_key()?;

    let location = match city {
        Some(city) => {
            let matches = terminal(services.repository.get_locations_by_city_name(&city))
                .await
                .map_err(domain_failure)?;
            let location = matches
                .into_iter()
                .next()
                .ok_or_else(|| domain_failure(DomainError::NotFound))?;

            if let Err(e) = services.preferences.set_last_location(&location).await {
                tracing::warn!("Failed to remember {}: {}", location.name, e);
            }
            location
        }
        None => services.preferences.last_location().ok_or_else(|| {
            AppError::Other(anyhow!(
                "No city given and no previous location. Try `skycast weather <city>`."
            ))
        })?,
    };

    let weather = terminal(services.repository.get_weather(location, exclude))
        .await
        .map_err(domain_failure)?;
    print_weather(&weather);

    if let Some(max_entries) = services.config.cache.max_entries {
        if let Err(e) = services.repository.enforce_capacity(max_entries).await {
            tracing::warn!("Failed to trim forecast cache: {}", e);
        }
    }

    Ok(())
}

async fn search(services: &Services, query: &str) -> Result<(), AppError> {
    services.require_api_key()?;

    let query = query.trim();
    if query.is_empty() {
        return Ok(());
    }

    let locations = terminal(services.repository.get_locations_by_city_name(query))
        .await
        .map_err(domain_failure)?;

    if locations.is_empty() {
        println!("No matches for \"{}\".", query);
    }
    for location in &locations {
        print_location(location);
    }
    Ok(())
}

async fn recent(services: &Services) -> Result<(), AppError> {
    let mut listing = Box::pin(services.repository.get_all_cached_weather());
    let cached = listing.next().await.unwrap_or_default();

    if cached.is_empty() {
        println!("No cached forecasts.");
    }
    for weather in &cached {
        let temp = weather
            .current
            .as_ref()
            .map(|c| format!("{:.1}°C", c.temp))
            .unwrap_or_else(|| "-".to_string());
        let state = if services.repository.is_fresh(weather.fetched_at) {
            "fresh"
        } else {
            "stale"
        };
        println!(
            "{:<32} {:>8}  ({})",
            weather.location.display_name(),
            temp,
            state
        );
    }
    Ok(())
}

fn print_location(location: &Location) {
    println!(
        "{:<40} {:>9.4}, {:>9.4}",
        location.display_name(),
        location.latitude,
        location.longitude
    );
}

fn print_weather(weather: &Weather) {
    println!(
        "{} ({}, UTC{:+})",
        weather.location.display_name(),
        weather.timezone,
        weather.timezone_offset / 3600
    );

    if let Some(current) = &weather.current {
        let description = current
            .conditions
            .first()
            .map(|c| c.description.as_str())
            .unwrap_or("");
        println!(
            "  Now: {:.1}°C (feels like {:.1}°C), {}",
            current.temp, current.feels_like, description
        );
        println!(
            "  Humidity {}%  Wind {:.1} m/s  UV {:.1}",
            current.humidity, current.wind_speed, current.uvi
        );
    }

    if let Some(hourly) = &weather.hourly {
        let next: Vec<String> = hourly
            .iter()
            .take(6)
            .map(|h| format!("{:.0}°C/{:.0}%", h.temp, h.pop * 100.0))
            .collect();
        if !next.is_empty() {
            println!("  Next hours: {}", next.join("  "));
        }
    }

    if let Some(daily) = &weather.daily {
        for day in daily.iter().take(7) {
            let summary = if day.summary.is_empty() {
                day.conditions
                    .first()
                    .map(|c| c.description.clone())
                    .unwrap_or_default()
            } else {
                day.summary.clone()
            };
            println!(
                "  {:>5.1}°C / {:>5.1}°C  {}",
                day.temp.max, day.temp.min, summary
            );
        }
    }
}

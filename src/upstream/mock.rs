use std::f64::consts::PI;

use chrono::{Duration as ChronoDuration, Utc};
use lazy_static::lazy_static;
use rand::Rng;

use crate::clock::iso_now;
use crate::models::{
    Coordinates, CurrentWeather, HourlyWeather, LocationResult, WeatherData, WeatherForecast,
    WeatherLocation,
};

lazy_static! {
    static ref POPULAR_LOCATIONS: Vec<LocationResult> = vec![
        place("Sredets", "BG", 42.6500, 25.3167),
        place("Sofia", "BG", 42.6977, 23.3219),
        place("London", "GB", 51.5074, -0.1278),
        place("Paris", "FR", 48.8566, 2.3522),
        place("New York", "US", 40.7128, -74.0060),
        place("Tokyo", "JP", 35.6762, 139.6503),
        place("Berlin", "DE", 52.5200, 13.4050),
        place("Sydney", "AU", -33.8688, 151.2093),
    ];
}

fn place(name: &str, country: &str, lat: f64, lon: f64) -> LocationResult {
    LocationResult {
        name: name.to_string(),
        country: country.to_string(),
        state: None,
        lat,
        lon,
    }
}

/// Canned suggestions offered when location search has no provider to ask.
pub fn popular_locations() -> Vec<LocationResult> {
    POPULAR_LOCATIONS.clone()
}

/// Synthetic weather for the given coordinates, shaped like a provider record.
pub fn mock_weather(lat: f64, lon: f64) -> WeatherData {
    let mut rng = rand::thread_rng();
    let mut jitter = |base: f64, spread: f64| (base + rng.gen::<f64>() * spread).round() as i32;

    let current = CurrentWeather {
        temperature: jitter(18.0, 10.0),
        humidity: jitter(50.0, 30.0),
        wind_speed: jitter(5.0, 15.0),
        wind_direction: "NW".to_string(),
        pressure: jitter(1010.0, 10.0),
        visibility: jitter(8.0, 4.0),
        uv_index: jitter(0.0, 10.0),
        condition: "Partly Cloudy".to_string(),
        icon: "partly-cloudy".to_string(),
    };

    let today = Utc::now().date_naive();
    let day = |offset: i64| (today + ChronoDuration::days(offset)).format("%Y-%m-%d").to_string();
    let forecast = vec![
        WeatherForecast {
            date: day(0),
            high: jitter(22.0, 6.0),
            low: jitter(15.0, 5.0),
            condition: "Partly Cloudy".to_string(),
            precipitation: jitter(0.0, 30.0),
        },
        WeatherForecast {
            date: day(1),
            high: jitter(24.0, 6.0),
            low: jitter(17.0, 5.0),
            condition: "Sunny".to_string(),
            precipitation: jitter(0.0, 10.0),
        },
        WeatherForecast {
            date: day(2),
            high: jitter(21.0, 6.0),
            low: jitter(14.0, 5.0),
            condition: "Light Rain".to_string(),
            precipitation: jitter(60.0, 30.0),
        },
    ];

    let hourly = (0..24u32)
        .map(|hour| {
            let h = f64::from(hour);
            HourlyWeather {
                hour,
                temperature: (16.0 + rng.gen::<f64>() * 8.0 + (h * PI / 12.0).sin() * 4.0).round() as i32,
                humidity: (45.0 + rng.gen::<f64>() * 35.0 + (h * PI / 8.0).cos() * 10.0).round() as i32,
                wind_speed: (3.0 + rng.gen::<f64>() * 12.0 + (h * PI / 6.0).sin() * 3.0).round() as i32,
                precipitation: rng.gen::<f64>() * 100.0,
            }
        })
        .collect();

    WeatherData {
        location: WeatherLocation {
            city: "San Francisco".to_string(),
            country: "US".to_string(),
            coordinates: Coordinates { lat, lon },
        },
        current,
        forecast,
        hourly,
        last_updated: iso_now(),
    }
}

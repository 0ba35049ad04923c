use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Local, Timelike, Utc};
use lazy_static::lazy_static;

use super::{CurrentResponse, ForecastResponse};
use crate::models::{CurrentWeather, HourlyWeather, WeatherForecast};

const DEFAULT_ICON: &str = "partly-cloudy";
const DEFAULT_VISIBILITY_M: f64 = 10_000.0;
const MAX_FORECAST_DAYS: usize = 5;
const HOURLY_POINTS: usize = 24;

const COMPASS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

lazy_static! {
    // Provider icon codes to dashboard icon names.
    static ref ICON_MAP: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("01d", "sunny");
        m.insert("01n", "clear-night");
        m.insert("02d", "partly-cloudy");
        m.insert("02n", "partly-cloudy-night");
        for code in ["03d", "03n", "04d", "04n"] {
            m.insert(code, "cloudy");
        }
        for code in ["09d", "09n", "10d", "10n"] {
            m.insert(code, "rainy");
        }
        m.insert("11d", "stormy");
        m.insert("11n", "stormy");
        m.insert("13d", "snowy");
        m.insert("13n", "snowy");
        m.insert("50d", "fog");
        m.insert("50n", "fog");
        m
    };
}

pub fn map_weather_icon(code: &str) -> &'static str {
    ICON_MAP.get(code).copied().unwrap_or(DEFAULT_ICON)
}

/// 16-point compass direction for a bearing in degrees.
pub fn wind_direction(degrees: f64) -> &'static str {
    let index = (degrees.rem_euclid(360.0) / 22.5).round() as usize % COMPASS.len();
    COMPASS[index]
}

/// Upper-cases the first letter of each word and lower-cases the rest.
pub fn capitalize_words(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn round(value: f64) -> i32 {
    value.round() as i32
}

fn ms_to_kmh(speed: f64) -> i32 {
    round(speed * 3.6)
}

pub(crate) fn local_hour() -> u32 {
    Local::now().hour()
}

pub(crate) fn format_current(data: &CurrentResponse) -> CurrentWeather {
    let (condition, icon) = data
        .weather
        .first()
        .map(|w| (capitalize_words(&w.description), map_weather_icon(&w.icon)))
        .unwrap_or_else(|| (String::new(), DEFAULT_ICON));

    CurrentWeather {
        temperature: round(data.main.temp),
        humidity: round(data.main.humidity),
        wind_speed: ms_to_kmh(data.wind.speed),
        wind_direction: wind_direction(data.wind.deg.unwrap_or(0.0)).to_string(),
        pressure: round(data.main.pressure.unwrap_or_default()),
        visibility: round(data.visibility.unwrap_or(DEFAULT_VISIBILITY_M) / 1000.0),
        // Not part of the current-conditions payload.
        uv_index: 0,
        condition,
        icon: icon.to_string(),
    }
}

/// Splits the 3-hourly forecast into per-day summaries and the next 24 points.
pub(crate) fn format_forecast(
    data: &ForecastResponse,
    start_hour: u32,
) -> (Vec<WeatherForecast>, Vec<HourlyWeather>) {
    let hourly = data
        .list
        .iter()
        .take(HOURLY_POINTS)
        .zip(0u32..)
        .map(|(item, index)| HourlyWeather {
            hour: (start_hour + index) % 24,
            temperature: round(item.main.temp),
            humidity: round(item.main.humidity),
            wind_speed: ms_to_kmh(item.wind.speed),
            precipitation: item.pop * 100.0,
        })
        .collect();

    let mut daily = Vec::new();
    let mut seen = HashSet::new();
    for item in &data.list {
        if daily.len() >= MAX_FORECAST_DAYS {
            break;
        }
        let Some(date) = DateTime::<Utc>::from_timestamp(item.dt, 0) else {
            continue;
        };
        let date = date.format("%Y-%m-%d").to_string();
        if !seen.insert(date.clone()) {
            continue;
        }
        daily.push(WeatherForecast {
            date,
            high: round(item.main.temp_max.unwrap_or(item.main.temp)),
            low: round(item.main.temp_min.unwrap_or(item.main.temp)),
            condition: item
                .weather
                .first()
                .map(|w| capitalize_words(&w.description))
                .unwrap_or_default(),
            precipitation: round(item.pop * 100.0),
        });
    }

    (daily, hourly)
}

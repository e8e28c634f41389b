//! Historical weather lookup via the Open-Meteo archive API.

use super::EnrichmentError;
use crate::config::EnrichmentSettings;
use chrono::NaiveDate;

/// Daily weather values for a trip's start location and date.
#[derive(Debug, Clone)]
pub struct WeatherSample {
    /// Daily mean temperature, Celsius
    pub temp_c: Option<f64>,
    /// Human-readable conditions
    pub conditions: Option<String>,
}

/// Open-Meteo archive API response (simplified)
#[derive(Debug, serde::Deserialize)]
struct ArchiveResponse {
    daily: Option<ArchiveDaily>,
}

#[derive(Debug, serde::Deserialize)]
struct ArchiveDaily {
    temperature_2m_mean: Option<Vec<Option<f64>>>,
    weather_code: Option<Vec<Option<u32>>>,
}

/// Weather client backed by the Open-Meteo archive endpoint.
pub struct WeatherClient {
    client: reqwest::Client,
    base_url: String,
}

impl WeatherClient {
    /// Create a client for the configured endpoint.
    pub fn new(settings: &EnrichmentSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: settings.weather_url.clone(),
        }
    }

    /// Fetch the daily mean temperature and conditions for one location
    /// and date.
    pub async fn fetch_daily(
        &self,
        latitude: f64,
        longitude: f64,
        date: NaiveDate,
    ) -> Result<WeatherSample, EnrichmentError> {
        let day = date.format("%Y-%m-%d").to_string();

        tracing::debug!("Fetching weather for ({:.4}, {:.4}) on {}", latitude, longitude, day);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("start_date", day.clone()),
                ("end_date", day),
                ("daily", "temperature_2m_mean,weather_code".to_string()),
                ("timezone", "UTC".to_string()),
            ])
            .send()
            .await
            .map_err(|e| EnrichmentError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EnrichmentError::RequestFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: ArchiveResponse = response
            .json()
            .await
            .map_err(|e| EnrichmentError::InvalidResponse(e.to_string()))?;

        let daily = body.daily.ok_or(EnrichmentError::NoData)?;

        let temp_c = daily
            .temperature_2m_mean
            .and_then(|v| v.into_iter().flatten().next());
        let conditions = daily
            .weather_code
            .and_then(|v| v.into_iter().flatten().next())
            .map(|code| describe_weather_code(code).to_string());

        if temp_c.is_none() && conditions.is_none() {
            return Err(EnrichmentError::NoData);
        }

        Ok(WeatherSample { temp_c, conditions })
    }
}

/// Map a WMO weather code to a conditions string.
pub fn describe_weather_code(code: u32) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 | 48 => "Fog",
        51..=57 => "Drizzle",
        61..=67 => "Rain",
        71..=77 => "Snow",
        80..=82 => "Rain showers",
        85 | 86 => "Snow showers",
        95..=99 => "Thunderstorm",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weather_code_mapping() {
        assert_eq!(describe_weather_code(0), "Clear sky");
        assert_eq!(describe_weather_code(2), "Partly cloudy");
        assert_eq!(describe_weather_code(63), "Rain");
        assert_eq!(describe_weather_code(95), "Thunderstorm");
        assert_eq!(describe_weather_code(42), "Unknown");
    }

    #[test]
    fn test_archive_response_parsing() {
        let json = r#"{
            "daily": {
                "temperature_2m_mean": [18.5],
                "weather_code": [2]
            }
        }"#;

        let body: ArchiveResponse = serde_json::from_str(json).unwrap();
        let daily = body.daily.unwrap();
        assert_eq!(daily.temperature_2m_mean.unwrap()[0], Some(18.5));
        assert_eq!(daily.weather_code.unwrap()[0], Some(2));
    }
}

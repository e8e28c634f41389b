//! Post-close enrichment from external weather and elevation services.
//!
//! Enrichment runs after a closed trip is already persisted and is applied
//! as an idempotent update. Collaborator failures degrade the trip to
//! `EnrichmentStatus::Unavailable`; they are never fatal and never block a
//! close or finalize.

pub mod elevation;
pub mod weather;

pub use elevation::{ElevationClient, ElevationProfile};
pub use weather::{WeatherClient, WeatherSample};

use crate::config::EnrichmentSettings;
use crate::trip::types::{EnrichmentStatus, Trip};
use std::time::Duration;
use thiserror::Error;

/// Enrichment-related errors.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timed out after {0}s")]
    TimedOut(u64),

    #[error("No data for the requested location")]
    NoData,
}

/// Weather and elevation values to apply to a persisted trip.
#[derive(Debug, Clone, Default)]
pub struct TripEnrichment {
    /// Daily mean temperature from the weather archive
    pub weather_temp_c: Option<f64>,
    /// Conditions description from the weather archive
    pub weather_conditions: Option<String>,
    /// Cumulative elevation gain along the track, meters
    pub elevation_gain_m: Option<f64>,
    /// Cumulative elevation loss along the track, meters
    pub elevation_loss_m: Option<f64>,
}

/// Fetches weather and elevation data for closed trips.
pub struct Enricher {
    settings: EnrichmentSettings,
    weather: WeatherClient,
    elevation: ElevationClient,
}

impl Enricher {
    /// Create an enricher from the configured collaborator settings.
    pub fn new(settings: &EnrichmentSettings) -> Self {
        Self {
            settings: settings.clone(),
            weather: WeatherClient::new(settings),
            elevation: ElevationClient::new(settings),
        }
    }

    /// Gather enrichment for a closed trip.
    ///
    /// Never returns an error: a trip with no usable track or with both
    /// collaborators exhausted comes back `Unavailable`, partial data
    /// comes back `Applied`.
    pub async fn enrich_trip(
        &self,
        trip: &Trip,
        track: &[(f64, f64)],
    ) -> (TripEnrichment, EnrichmentStatus) {
        let mut enrichment = TripEnrichment::default();

        if !self.settings.enabled || track.is_empty() {
            return (enrichment, EnrichmentStatus::Unavailable);
        }

        let (lat, lon) = track[0];
        let date = trip.started_at.date();
        let mut applied = false;

        match self
            .with_retries("weather", || self.weather.fetch_daily(lat, lon, date))
            .await
        {
            Ok(sample) => {
                enrichment.weather_temp_c = sample.temp_c;
                enrichment.weather_conditions = sample.conditions;
                applied = true;
            }
            Err(e) => {
                tracing::warn!("Weather enrichment failed for trip {}: {}", trip.id, e);
            }
        }

        if track.len() >= 2 {
            match self
                .with_retries("elevation", || self.elevation.fetch_profile(track))
                .await
            {
                Ok(profile) => {
                    enrichment.elevation_gain_m = Some(profile.gain_m);
                    enrichment.elevation_loss_m = Some(profile.loss_m);
                    applied = true;
                }
                Err(e) => {
                    tracing::warn!("Elevation enrichment failed for trip {}: {}", trip.id, e);
                }
            }
        }

        let status = if applied {
            EnrichmentStatus::Applied
        } else {
            EnrichmentStatus::Unavailable
        };

        (enrichment, status)
    }

    /// Run one collaborator call with the configured per-attempt timeout,
    /// retry budget and linear backoff.
    async fn with_retries<T, F, Fut>(&self, what: &str, op: F) -> Result<T, EnrichmentError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, EnrichmentError>>,
    {
        let attempts = self.settings.max_retries.max(1);
        let mut last = EnrichmentError::NoData;

        for attempt in 1..=attempts {
            let result =
                tokio::time::timeout(Duration::from_secs(self.settings.timeout_secs), op()).await;

            match result {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    tracing::debug!("{} attempt {}/{} failed: {}", what, attempt, attempts, e);
                    last = e;
                }
                Err(_) => {
                    tracing::debug!(
                        "{} attempt {}/{} timed out after {}s",
                        what,
                        attempt,
                        attempts,
                        self.settings.timeout_secs
                    );
                    last = EnrichmentError::TimedOut(self.settings.timeout_secs);
                }
            }

            if attempt < attempts {
                tokio::time::sleep(Duration::from_millis(
                    self.settings.backoff_ms * attempt as u64,
                ))
                .await;
            }
        }

        Err(last)
    }
}

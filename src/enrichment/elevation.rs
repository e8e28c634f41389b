//! Elevation-profile lookup via the Open-Elevation batch API.

use super::EnrichmentError;
use crate::config::EnrichmentSettings;
use serde::{Deserialize, Serialize};

/// Cap on locations per lookup; longer tracks are downsampled.
const MAX_TRACK_POINTS: usize = 100;

/// Cumulative climb and descent along a trip track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevationProfile {
    /// Total elevation gain, meters
    pub gain_m: f64,
    /// Total elevation loss, meters
    pub loss_m: f64,
}

#[derive(Debug, Serialize)]
struct LookupRequest {
    locations: Vec<Location>,
}

#[derive(Debug, Serialize)]
struct Location {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    results: Vec<LookupResult>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    elevation: f64,
}

/// Elevation client backed by the Open-Elevation lookup endpoint.
pub struct ElevationClient {
    client: reqwest::Client,
    url: String,
}

impl ElevationClient {
    /// Create a client for the configured endpoint.
    pub fn new(settings: &EnrichmentSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: settings.elevation_url.clone(),
        }
    }

    /// Fetch the elevation profile along an ordered GPS track.
    pub async fn fetch_profile(
        &self,
        track: &[(f64, f64)],
    ) -> Result<ElevationProfile, EnrichmentError> {
        if track.len() < 2 {
            return Err(EnrichmentError::NoData);
        }

        let sampled = downsample(track, MAX_TRACK_POINTS);
        tracing::debug!(
            "Fetching elevation profile for {} of {} track points",
            sampled.len(),
            track.len()
        );

        let request = LookupRequest {
            locations: sampled
                .iter()
                .map(|&(latitude, longitude)| Location {
                    latitude,
                    longitude,
                })
                .collect(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EnrichmentError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EnrichmentError::RequestFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| EnrichmentError::InvalidResponse(e.to_string()))?;

        if body.results.len() < 2 {
            return Err(EnrichmentError::NoData);
        }

        let elevations: Vec<f64> = body.results.iter().map(|r| r.elevation).collect();
        Ok(profile_from_elevations(&elevations))
    }
}

/// Accumulate climb and descent over an ordered elevation sequence.
pub fn profile_from_elevations(elevations: &[f64]) -> ElevationProfile {
    let mut gain_m = 0.0;
    let mut loss_m = 0.0;

    for pair in elevations.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            gain_m += delta;
        } else {
            loss_m += -delta;
        }
    }

    ElevationProfile { gain_m, loss_m }
}

/// Evenly thin a track to at most `max_points`, keeping first and last.
fn downsample(track: &[(f64, f64)], max_points: usize) -> Vec<(f64, f64)> {
    if track.len() <= max_points {
        return track.to_vec();
    }

    let step = (track.len() - 1) as f64 / (max_points - 1) as f64;
    (0..max_points)
        .map(|i| track[(i as f64 * step).round() as usize])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_accumulates_gain_and_loss() {
        let profile = profile_from_elevations(&[100.0, 110.0, 105.0, 120.0, 115.0]);
        assert!((profile.gain_m - 25.0).abs() < 1e-9);
        assert!((profile.loss_m - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_flat_profile() {
        let profile = profile_from_elevations(&[50.0, 50.0, 50.0]);
        assert_eq!(profile.gain_m, 0.0);
        assert_eq!(profile.loss_m, 0.0);
    }

    #[test]
    fn test_downsample_keeps_endpoints() {
        let track: Vec<(f64, f64)> = (0..500).map(|i| (i as f64, -i as f64)).collect();
        let sampled = downsample(&track, MAX_TRACK_POINTS);

        assert_eq!(sampled.len(), MAX_TRACK_POINTS);
        assert_eq!(sampled[0], track[0]);
        assert_eq!(sampled[MAX_TRACK_POINTS - 1], track[499]);
    }

    #[test]
    fn test_downsample_short_track_untouched() {
        let track = vec![(1.0, 2.0), (3.0, 4.0)];
        assert_eq!(downsample(&track, MAX_TRACK_POINTS), track);
    }
}

//! OSRM HTTP routing client.
//!
//! Talks to an OSRM `route` service (e.g. a local `osrm-routed`). Each
//! request carries the caller's budget as a hard HTTP timeout so a slow
//! server degrades into a fallback estimate instead of stalling dispatch.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use ems_dispatch_core::{EstimateError, EstimateResult, GeoPoint, RouteEstimator};

pub struct OsrmClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    /// Seconds.
    duration: f64,
}

impl OsrmClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn route_url(&self, origin: GeoPoint, destination: GeoPoint) -> String {
        // OSRM takes lon,lat pairs
        format!(
            "{}/route/v1/driving/{},{};{},{}?overview=false",
            self.base_url, origin.lon, origin.lat, destination.lon, destination.lat
        )
    }

    fn parse_duration(body: &OsrmResponse) -> EstimateResult<Duration> {
        if body.code != "Ok" {
            return Err(EstimateError::Unavailable(format!(
                "OSRM returned code {}",
                body.code
            )));
        }
        let route = body
            .routes
            .first()
            .ok_or_else(|| EstimateError::Unavailable("OSRM returned no routes".to_string()))?;
        Duration::try_from_secs_f64(route.duration).map_err(|_| {
            EstimateError::Unavailable(format!(
                "OSRM returned invalid duration {}",
                route.duration
            ))
        })
    }
}

impl RouteEstimator for OsrmClient {
    fn estimate(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        budget: Duration,
    ) -> EstimateResult<Duration> {
        let url = self.route_url(origin, destination);
        debug!(url = %url, "querying OSRM");

        let response = self
            .client
            .get(&url)
            .timeout(budget)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    EstimateError::TimedOut(budget)
                } else {
                    EstimateError::Unavailable(e.to_string())
                }
            })?;

        let body: OsrmResponse = response
            .json()
            .map_err(|e| EstimateError::Unavailable(e.to_string()))?;
        Self::parse_duration(&body)
    }
}

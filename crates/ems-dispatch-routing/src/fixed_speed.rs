//! Straight-line ETA estimate at an assumed average speed.

use std::time::Duration;

use ems_dispatch_core::geo::haversine_distance_m;
use ems_dispatch_core::{EstimateError, EstimateResult, GeoPoint, RouteEstimator};

/// Urban average including stops and signals.
const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Estimates travel time as great-circle distance over a fixed speed.
///
/// Deliberately crude: no road network, no traffic. Its job is to always
/// return an answer, instantly, so dispatch keeps an ETA even when the
/// routing provider is down.
pub struct FixedSpeedEstimator {
    speed_kmh: f64,
}

impl FixedSpeedEstimator {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }
}

impl Default for FixedSpeedEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_SPEED_KMH)
    }
}

impl RouteEstimator for FixedSpeedEstimator {
    fn estimate(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        _budget: Duration,
    ) -> EstimateResult<Duration> {
        if !(self.speed_kmh > 0.0) {
            return Err(EstimateError::Unavailable(format!(
                "invalid speed: {} km/h",
                self.speed_kmh
            )));
        }
        let distance_m = haversine_distance_m(origin, destination);
        let seconds = distance_m / (self.speed_kmh * 1000.0 / 3600.0);
        Duration::try_from_secs_f64(seconds).map_err(|_| {
            EstimateError::Unavailable(format!("estimate out of range: {seconds} s"))
        })
    }
}

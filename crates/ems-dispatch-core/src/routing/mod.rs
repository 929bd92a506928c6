//! Route and ETA estimation contract.
//!
//! Estimation is a pluggable capability with a hard time budget. Providers
//! live outside the core (see the `ems-dispatch-routing` crate); the engine
//! treats every estimation failure as "ETA unknown" and keeps dispatching.

use std::time::Duration;

use thiserror::Error;

use crate::geo::GeoPoint;

/// Estimation errors. Never fatal to the surrounding dispatch.
#[derive(Error, Debug)]
pub enum EstimateError {
    #[error("Route provider unavailable: {0}")]
    Unavailable(String),

    #[error("Route estimate exceeded the time budget of {0:?}")]
    TimedOut(Duration),
}

pub type EstimateResult<T> = Result<T, EstimateError>;

/// Pluggable travel-duration estimator.
///
/// Implementations must return within `budget`, reporting `TimedOut` when
/// the provider cannot answer in time.
pub trait RouteEstimator {
    fn estimate(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        budget: Duration,
    ) -> EstimateResult<Duration>;
}

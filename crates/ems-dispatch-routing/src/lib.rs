//! Route estimator implementations for the dispatch engine.
//!
//! Two providers of the [`ems_dispatch_core::RouteEstimator`] contract:
//!
//! - [`FixedSpeedEstimator`]: great-circle distance over an assumed average
//!   speed. No I/O, always available, used as the fallback.
//! - `OsrmClient` (behind the `osrm` feature): queries an OSRM routing
//!   server over HTTP with a hard per-request deadline.

mod fixed_speed;

#[cfg(feature = "osrm")]
mod osrm;

pub use fixed_speed::FixedSpeedEstimator;

#[cfg(feature = "osrm")]
pub use osrm::OsrmClient;

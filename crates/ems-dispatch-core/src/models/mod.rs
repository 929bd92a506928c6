//! Domain models for the dispatch system.

mod ambulance;
mod emergency;
mod hospital;

pub use ambulance::*;
pub use emergency::*;
pub use hospital::*;

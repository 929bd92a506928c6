//! EMS Dispatch Core Library
//!
//! Emergency ambulance dispatch: intake, hospital and ambulance assignment,
//! status lifecycle, and notification fan-out.
//!
//! # Architecture
//!
//! ```text
//! Emergency request ──► DispatchEngine
//!                           │  nearest active hospital (GeoIndex query)
//!                           │  atomic ambulance claim (conditional update)
//!                           │  route estimate (bounded budget, optional)
//!                           ▼
//!                   Emergency {Pending | Dispatched}
//!                           │
//! Status change ─────► EmergencyStateMachine
//!                           │  transition table + timeline append
//!                           │  ambulance release/claim, one atomic unit
//!                           ▼
//!                   NotificationDispatcher ──► DeliveryChannel(s)
//!                   (after commit, fire-and-forget)
//! ```
//!
//! # Core Principles
//!
//! - **At most one emergency ever holds an ambulance.** Claims are
//!   conditional updates enforced at the storage layer, never
//!   read-then-write.
//! - **The timeline is append-only.** Entries are added in commit order and
//!   never edited or removed.
//! - **Degraded beats dead.** A missing ambulance, a failed ETA estimate or
//!   an undeliverable notification never fails the triggering operation.
//!
//! # Modules
//!
//! - [`db`]: SQLite storage layer with conditional claim/release primitives
//! - [`models`]: Domain types (Emergency, Ambulance, Hospital, ...)
//! - [`geo`]: Geospatial helpers (haversine distance, bounding boxes)
//! - [`dispatch`]: The dispatch engine
//! - [`lifecycle`]: The emergency state machine
//! - [`notify`]: Notification planning, channels and the delivery queue
//! - [`routing`]: The pluggable route/ETA estimator contract

pub mod db;
pub mod dispatch;
pub mod geo;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod routing;

// Re-export commonly used types
pub use db::{AmbulanceEffect, Database, DbError, DbResult};
pub use dispatch::{
    DispatchConfig, DispatchEngine, DispatchError, DispatchOutcome, EmergencyRequest,
};
pub use geo::{GeoPoint, LocationFix};
pub use lifecycle::{EmergencyStateMachine, TransitionError};
pub use models::{
    Ambulance, AmbulanceStatus, Emergency, EmergencyLocation, EmergencyStatus, Hospital,
    Priority, TimelineEntry,
};
pub use notify::{
    DeliveryChannel, DeliveryError, LogChannel, Notification, NotificationDispatcher,
    NotificationWorker, QueueChannel, TransitionEvent,
};
pub use routing::{EstimateError, EstimateResult, RouteEstimator};

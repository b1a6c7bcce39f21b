//! rulegrid-health — instance health monitoring and lifecycle promotion.
//!
//! Probing itself belongs to the runtime backend (what "up" means is
//! platform-specific); this crate turns probe results into registry state.
//! [`monitor::HealthMonitor`] persists each probe's verdict as observed and
//! paces the background sweep with per-instance backoff, and
//! [`monitor::wait_until_healthy`] gates fresh provisioning on the instance
//! actually answering.

pub mod checker;
pub mod error;
pub mod monitor;

pub use checker::HealthTracker;
pub use error::{HealthError, HealthResult};
pub use monitor::{wait_until_healthy, HealthMonitor};

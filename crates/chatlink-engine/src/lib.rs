//! Event correlation engine: turns the backend's raw, loosely-ordered
//! notification stream into a deduplicated, causally consistent business-event
//! stream, and bridges application-initiated sends to their asynchronous
//! confirmations.

/// Event correlator: the single ingestion point for raw backend events.
pub mod correlator;
/// Registry of in-flight send operations awaiting confirmation.
pub mod tracker;

pub use correlator::{CorrelatorConfig, CorrelatorError, EventCorrelator};
pub use tracker::{RequestTracker, SendReceipt, TrackerError};

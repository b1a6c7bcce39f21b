//! rulegrid-router — evaluation request routing.
//!
//! Maps a ruleset identity (or a request path embedding one) to the live
//! endpoint that should serve it: the dedicated instance when one is
//! registered and healthy, with one just-in-time reconcile when the cached
//! state looks stale, and the shared rule server as the fallback of last
//! resort for path-based routing.

pub mod error;
pub mod router;

pub use error::{RoutingError, RoutingResult};
pub use router::RequestRouter;

//! Push-based streams.
//!
//! This module provides the building blocks of the dataflow graph:
//! - Streams: mutable value cells with an end-of-stream companion
//! - Combine: derived streams recomputed on every source change
//! - Ends: AND-termination over other streams' ends

mod combine;
mod end;
mod node;
mod stream;
mod watch;

pub use combine::combine;
pub use end::ends_on;
pub use stream::{Phase, Stream};
pub use watch::WatchGuard;

//! # Sluice
//!
//! A minimal push-based dataflow engine for Rust.
//!
//! A [`Stream`] is a mutable value cell. [`combine`] builds a derived stream
//! whose combining function reruns every time one of its sources is set.
//! Propagation is synchronous and depth-first: a `set` made inside a
//! combining function finishes its whole downstream sweep before the next
//! statement of that function runs.
//!
//! Every stream also has an [`end`](Stream::end), itself a `Stream<bool>`.
//! [`ends_on`] ends a stream once all of a list of streams have ended.
//!
//! ```
//! use sluice::{combine, Stream};
//!
//! let a: Stream<i32> = Stream::empty();
//! let b = combine(&[a.clone()], |sources, me| {
//!     if let Some(a) = sources[0].get() {
//!         me.set(a)?;
//!         me.set(a + 1)?;
//!     }
//!     Ok(())
//! })
//! .unwrap();
//!
//! a.set(1).unwrap();
//! assert_eq!(b.get(), Some(2));
//! ```
//!
//! Everything is single-threaded; streams are `!Send`.

pub mod error;
pub mod runtime;
pub mod stream;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use stream::{combine, ends_on, Phase, Stream, WatchGuard};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_works() {
        // Basic smoke test
        let stream = Stream::new(0);
        assert_eq!(stream.get(), Some(0));
        stream.set(42).unwrap();
        assert_eq!(stream.get(), Some(42));
    }
}

use super::node::Dependent;
use super::stream::{Inner, Stream};
use crate::error::{Error, Result};
use std::cell::Cell;
use std::rc::{Rc, Weak};
use tracing::debug;

/// Ends `target` once every watched end holds `true`.
struct EndWatcher {
    watched: Vec<Stream<bool>>,
    // The target end owns this watcher.
    target: Weak<Inner<bool>>,
    fired: Cell<bool>,
}

impl Dependent for EndWatcher {
    fn trigger(&self) -> Result<()> {
        if self.fired.get() || !self.watched.iter().all(Stream::is_ended) {
            return Ok(());
        }
        self.fired.set(true);
        let Some(inner) = self.target.upgrade() else {
            return Ok(());
        };
        let target = Stream { inner };
        debug!(stream = target.id(), "all watched streams ended");
        if !target.is_ended() {
            target.set(true)?;
        }
        Ok(())
    }
}

/// End `target` once every stream in `watch` has ended.
///
/// Arrival order does not matter and each watched stream counts once. If all
/// of them have already ended, `target` ends immediately. The wiring lives
/// as long as `target`'s end does, even if `target` itself is dropped.
/// Returns `target`.
///
/// # Errors
///
/// [`Error::EmptySourceList`] if `watch` is empty, and
/// [`Error::SelfTermination`] if `watch` contains `target` (or its end).
///
/// # Examples
///
/// ```
/// use sluice::{ends_on, Stream};
///
/// let a = Stream::new(1);
/// let b = Stream::new(2);
/// let c = Stream::new(3);
/// ends_on(&[a.clone(), b.clone()], &c).unwrap();
///
/// b.close().unwrap();
/// assert!(!c.is_ended());
/// a.close().unwrap();
/// assert!(c.is_ended());
/// ```
pub fn ends_on<'a, T, U>(watch: &[Stream<T>], target: &'a Stream<U>) -> Result<&'a Stream<U>>
where
    T: 'static,
    U: 'static,
{
    if watch.is_empty() {
        return Err(Error::EmptySourceList);
    }

    let target_end = target.end();
    let watched: Vec<Stream<bool>> = watch.iter().map(Stream::end).collect();
    if watched.iter().any(|end| end.ptr_eq(&target_end)) {
        return Err(Error::SelfTermination {
            stream: target.id(),
        });
    }

    let watcher: Rc<dyn Dependent> = Rc::new(EndWatcher {
        watched: watched.clone(),
        target: Rc::downgrade(&target_end.inner),
        fired: Cell::new(false),
    });
    for end in &watched {
        end.inner.node.subscribe(&watcher);
    }
    target_end.inner.node.own(Rc::clone(&watcher));

    watcher.trigger()?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ends_after_all_watched_in_any_order() {
        for first_a in [true, false] {
            let a = Stream::new(0);
            let b = Stream::new(0);
            let c: Stream<i32> = Stream::empty();
            ends_on(&[a.clone(), b.clone()], &c).unwrap();

            let (first, second) = if first_a { (&a, &b) } else { (&b, &a) };
            first.close().unwrap();
            assert!(!c.is_ended());
            second.close().unwrap();
            assert!(c.is_ended());
        }
    }

    #[test]
    fn already_ended_watch_list_ends_immediately() {
        let a = Stream::new(0);
        a.close().unwrap();
        let c = Stream::new("c");
        ends_on(&[a], &c).unwrap();
        assert!(c.is_ended());
    }

    #[test]
    fn target_ended_elsewhere_is_left_alone() {
        let a = Stream::new(0);
        let c = Stream::new(0);
        ends_on(&[a.clone()], &c).unwrap();
        c.close().unwrap();
        assert!(a.close().is_ok());
        assert!(c.is_ended());
    }

    #[test]
    fn watching_itself_is_rejected() {
        let c = Stream::new(0);
        let err = ends_on(&[c.clone()], &c).unwrap_err();
        assert!(matches!(err, Error::SelfTermination { .. }));

        let err = ends_on(&[c.end()], &c).unwrap_err();
        assert!(matches!(err, Error::SelfTermination { .. }));
    }

    #[test]
    fn empty_watch_list_is_rejected() {
        let c = Stream::new(0);
        let err = ends_on(&[] as &[Stream<u8>], &c).unwrap_err();
        assert!(matches!(err, Error::EmptySourceList));
    }

    #[test]
    fn termination_survives_dropping_the_target() {
        let a = Stream::new(0);
        let c = Stream::new(0);
        ends_on(&[a.clone()], &c).unwrap();
        let c_end = c.end();
        drop(c);

        a.close().unwrap();
        assert_eq!(c_end.get(), Some(true));
    }

    #[test]
    fn end_streams_can_be_watched_directly() {
        let a = Stream::new(0);
        let c = Stream::new(0);
        ends_on(&[a.end()], &c).unwrap();
        a.end().set(true).unwrap();
        assert!(c.is_ended());
    }
}

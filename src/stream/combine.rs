use super::node::Dependent;
use super::stream::{Inner, Stream};
use crate::error::{Error, Result};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::trace;

type CombineFn<T, U> = dyn FnMut(&[Stream<T>], &Stream<U>) -> Result<()>;

/// Wiring between a derived stream and its sources.
struct Combinator<T, U> {
    sources: Vec<Stream<T>>,
    target: Weak<Inner<U>>,
    combine_fn: RefCell<Box<CombineFn<T, U>>>,
}

impl<T: 'static, U: 'static> Dependent for Combinator<T, U> {
    fn trigger(&self) -> Result<()> {
        let Some(inner) = self.target.upgrade() else {
            return Ok(());
        };
        let target = Stream { inner };

        target.inner.node.activate(
            || !target.is_ended() && self.sources.iter().all(Stream::is_initialized),
            || {
                let mut combine_fn = self.combine_fn.borrow_mut();
                combine_fn(&self.sources, &target)
            },
        )
    }
}

/// Create a stream derived from `sources`.
///
/// `combine_fn` receives the sources in order and the new stream itself, and
/// may call `set` on it any number of times per run. It runs right away if
/// every source already holds a value, otherwise on the first `set` that
/// leaves them all initialized, and then again after every `set` on any
/// source. A trigger that arrives while `combine_fn` is running is replayed
/// once after it returns.
///
/// The derived stream stays wired for as long as a handle to it (or to a
/// stream downstream of it) is alive.
///
/// # Errors
///
/// [`Error::EmptySourceList`] if `sources` is empty, or any error returned by
/// the first run of `combine_fn`.
///
/// # Examples
///
/// ```
/// use sluice::{combine, Stream};
///
/// let a = Stream::new(1);
/// let b = Stream::empty();
/// let sum = combine(&[a.clone(), b.clone()], |sources, me| {
///     let (Some(a), Some(b)) = (sources[0].get(), sources[1].get()) else {
///         return Ok(());
///     };
///     me.set(a + b)?;
///     Ok(())
/// })
/// .unwrap();
///
/// assert_eq!(sum.get(), None);
/// b.set(2).unwrap();
/// assert_eq!(sum.get(), Some(3));
/// ```
#[must_use = "a derived stream stops running once every handle to it is dropped"]
pub fn combine<T, U, F>(sources: &[Stream<T>], combine_fn: F) -> Result<Stream<U>>
where
    T: 'static,
    U: 'static,
    F: FnMut(&[Stream<T>], &Stream<U>) -> Result<()> + 'static,
{
    if sources.is_empty() {
        return Err(Error::EmptySourceList);
    }

    let target = Stream::empty();
    let combinator: Rc<dyn Dependent> = Rc::new(Combinator {
        sources: sources.to_vec(),
        target: Rc::downgrade(&target.inner),
        combine_fn: RefCell::new(Box::new(combine_fn)),
    });
    for source in sources {
        source.inner.node.subscribe(&combinator);
    }
    target.inner.node.own(Rc::clone(&combinator));
    trace!(stream = target.id(), sources = sources.len(), "combined");

    combinator.trigger()?;
    Ok(target)
}

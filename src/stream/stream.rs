use super::combine::combine;
use super::node::Node;
use super::watch::{WatchGuard, Watcher};
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::debug;

/// Lifecycle state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No value yet and never activated.
    Uninitialized,
    /// Holds a value (or has run) and is waiting for the next trigger.
    Active,
    /// Its combining function is on the stack.
    Evaluating,
    /// Its end holds `true`; it no longer accepts values.
    Ended,
}

/// A mutable value cell that pushes every change to its dependents.
///
/// A stream starts either with a value or uninitialized. Each [`set`](Self::set)
/// stores the value and synchronously runs every derived stream built on top
/// of it before returning.
///
/// # Examples
///
/// ```
/// use sluice::{combine, Stream};
///
/// let x = Stream::new(4);
/// let doubled = combine(&[x.clone()], |sources, me| {
///     if let Some(x) = sources[0].get() {
///         me.set(x * 2)?;
///     }
///     Ok(())
/// })
/// .unwrap();
/// assert_eq!(doubled.get(), Some(8));
///
/// x.set(5).unwrap();
/// assert_eq!(doubled.get(), Some(10));
/// ```
#[must_use = "a derived stream stops running once every handle to it is dropped"]
pub struct Stream<T> {
    pub(crate) inner: Rc<Inner<T>>,
}

pub(crate) struct Inner<T> {
    pub(crate) node: Node,
    pub(crate) value: RefCell<Option<T>>,
    end: EndSlot,
}

enum EndSlot {
    /// Regular streams allocate their end cell on first use.
    Lazy(OnceCell<Stream<bool>>),
    /// An end cell is its own end.
    Itself(Weak<Inner<bool>>),
}

impl<T: 'static> Stream<T> {
    /// Create a stream holding `value`.
    pub fn new(value: T) -> Self {
        Self::with_slot(Some(value))
    }

    /// Create a stream with no value yet.
    pub fn empty() -> Self {
        Self::with_slot(None)
    }

    fn with_slot(value: Option<T>) -> Self {
        Self {
            inner: Rc::new(Inner {
                node: Node::new(Runtime::current()),
                value: RefCell::new(value),
                end: EndSlot::Lazy(OnceCell::new()),
            }),
        }
    }

    /// The stream's unique ID within its runtime.
    pub fn id(&self) -> usize {
        self.inner.node.id
    }

    /// Whether a value has ever been stored.
    pub fn is_initialized(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Read the value with a function without cloning.
    ///
    /// # Panics
    ///
    /// The value stays borrowed while `f` runs, so setting this stream from
    /// inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(self.inner.value.borrow().as_ref())
    }

    /// Store `value` and propagate it to every dependent before returning.
    ///
    /// Fails with [`Error::UseAfterEnd`] once the stream has ended, and with
    /// whatever error a triggered combining function returns.
    pub fn set(&self, value: T) -> Result<&Self> {
        if self.is_ended() {
            debug!(stream = self.id(), "set after end rejected");
            return Err(Error::UseAfterEnd { stream: self.id() });
        }
        self.inner.value.replace(Some(value));
        self.inner.node.notify()?;
        Ok(self)
    }

    /// The boolean stream marking this stream's end.
    ///
    /// Always returns the same underlying stream. It can be used anywhere a
    /// stream is accepted, including as a `combine` source.
    pub fn end(&self) -> Stream<bool> {
        match &self.inner.end {
            EndSlot::Lazy(end) => end
                .get_or_init(|| Stream::<bool>::end_cell(&self.inner.node.runtime))
                .clone(),
            EndSlot::Itself(me) => Stream {
                inner: me.upgrade().expect("end cell is alive while borrowed"),
            },
        }
    }

    /// Whether this stream's end holds `true`.
    pub fn is_ended(&self) -> bool {
        match &self.inner.end {
            EndSlot::Lazy(end) => end.get().is_some_and(|end| end.holds_true()),
            EndSlot::Itself(me) => me.upgrade().is_some_and(|me| Stream { inner: me }.holds_true()),
        }
    }

    /// End the stream. Does nothing if it has already ended.
    pub fn close(&self) -> Result<&Self> {
        if !self.is_ended() {
            self.end().set(true)?;
        }
        Ok(self)
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        if self.is_ended() {
            Phase::Ended
        } else if self.inner.node.is_evaluating() {
            Phase::Evaluating
        } else if self.is_initialized() || self.activations() > 0 {
            Phase::Active
        } else {
            Phase::Uninitialized
        }
    }

    /// How many times this stream's combining function has been started.
    /// Always zero for root streams.
    pub fn activations(&self) -> usize {
        self.inner.node.activations()
    }

    /// Derive a stream by applying `f` to every value of this one.
    ///
    /// # Panics
    ///
    /// `f` runs while this stream's value is borrowed; setting this stream
    /// from inside `f` panics.
    #[must_use = "a derived stream stops running once every handle to it is dropped"]
    pub fn map<U, F>(&self, f: F) -> Result<Stream<U>>
    where
        U: 'static,
        F: Fn(&T) -> U + 'static,
    {
        combine(std::slice::from_ref(self), move |sources, me| {
            if let Some(value) = sources[0].with(|value| value.map(&f)) {
                me.set(value)?;
            }
            Ok(())
        })
    }

    /// Whether both handles point at the same stream.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone + 'static> Stream<T> {
    /// Get a clone of the current value, or `None` if uninitialized.
    pub fn get(&self) -> Option<T> {
        self.inner.value.borrow().clone()
    }

    /// Call `callback` with the current value (if any) and then after every
    /// `set`, until the returned guard is dropped.
    pub fn watch<F>(&self, callback: F) -> WatchGuard
    where
        F: Fn(T) + 'static,
    {
        WatchGuard::new(self, Watcher::new(self.clone(), callback))
    }
}

impl Stream<bool> {
    fn end_cell(runtime: &Rc<Runtime>) -> Self {
        let node = Node::new(Rc::clone(runtime));
        Self {
            inner: Rc::new_cyclic(|me| Inner {
                node,
                value: RefCell::new(None),
                end: EndSlot::Itself(me.clone()),
            }),
        }
    }

    fn holds_true(&self) -> bool {
        matches!(*self.inner.value.borrow(), Some(true))
    }
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Default for Stream<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: fmt::Debug> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Stream");
        s.field("id", &self.inner.node.id);
        match self.inner.value.try_borrow() {
            Ok(value) => s.field("value", &*value),
            Err(_) => s.field("value", &"<borrowed>"),
        };
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stream_is_uninitialized() {
        let stream: Stream<i32> = Stream::empty();
        assert_eq!(stream.get(), None);
        assert!(!stream.is_initialized());
        assert_eq!(stream.phase(), Phase::Uninitialized);

        stream.set(3).unwrap();
        assert_eq!(stream.get(), Some(3));
        assert_eq!(stream.phase(), Phase::Active);
    }

    #[test]
    fn set_chains() {
        let stream = Stream::new(0);
        assert_eq!(stream.set(1).unwrap().set(2).unwrap().get(), Some(2));
    }

    #[test]
    fn end_is_identity_stable() {
        let stream = Stream::new("a");
        assert!(stream.end().ptr_eq(&stream.end()));
        assert_eq!(stream.end().get(), None);
        assert!(!stream.is_ended());
    }

    #[test]
    fn end_cell_is_its_own_end() {
        let end = Stream::<u8>::empty().end();
        assert!(end.end().ptr_eq(&end));
        end.set(true).unwrap();
        assert!(end.is_ended());
    }

    #[test]
    fn set_after_end_is_rejected() {
        let stream = Stream::new(1);
        stream.close().unwrap();
        assert_eq!(stream.phase(), Phase::Ended);

        let err = stream.set(2).unwrap_err();
        assert!(matches!(err, Error::UseAfterEnd { .. }));
        assert_eq!(stream.get(), Some(1));
    }

    #[test]
    fn end_never_reverts() {
        let stream = Stream::new(1);
        stream.close().unwrap();
        assert!(stream.end().set(false).is_err());
        assert_eq!(stream.end().get(), Some(true));
        // Closing again is a no-op.
        assert!(stream.close().is_ok());
    }

    #[test]
    fn with_reads_without_cloning() {
        let stream = Stream::new(String::from("hello"));
        assert_eq!(stream.with(|s| s.map(String::len)), Some(5));
    }

    #[test]
    fn map_follows_source() {
        let source = Stream::new(2);
        let label = source.map(|n| format!("#{n}")).unwrap();
        assert_eq!(label.get().as_deref(), Some("#2"));
        source.set(7).unwrap();
        assert_eq!(label.get().as_deref(), Some("#7"));
    }

    #[test]
    #[should_panic(expected = "already borrowed")]
    fn setting_inside_with_panics() {
        let stream = Stream::new(1);
        stream.with(|_| stream.set(2).map(|_| ())).unwrap();
    }

    #[test]
    fn debug_shows_value() {
        let stream = Stream::new(5);
        let rendered = format!("{stream:?}");
        assert!(rendered.contains("value: Some(5)"));
    }
}

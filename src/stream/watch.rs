use super::node::Dependent;
use super::stream::Stream;
use crate::error::Result;
use std::rc::Rc;

/// Plain subscriber: calls back with each new value, no reentrancy guard.
pub(crate) struct Watcher<T> {
    source: Stream<T>,
    callback: Box<dyn Fn(T)>,
}

impl<T: Clone + 'static> Watcher<T> {
    pub(crate) fn new<F>(source: Stream<T>, callback: F) -> Self
    where
        F: Fn(T) + 'static,
    {
        Self {
            source,
            callback: Box::new(callback),
        }
    }

    fn fire(&self) {
        if let Some(value) = self.source.get() {
            (self.callback)(value);
        }
    }
}

impl<T: Clone + 'static> Dependent for Watcher<T> {
    fn trigger(&self) -> Result<()> {
        self.fire();
        Ok(())
    }
}

/// RAII guard for stream watchers. Dropping it stops the callback.
///
/// # Examples
///
/// ```
/// use sluice::Stream;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let stream = Stream::new(1);
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let log = Rc::clone(&seen);
/// let guard = stream.watch(move |n| log.borrow_mut().push(n));
///
/// stream.set(2).unwrap();
/// drop(guard);
/// stream.set(3).unwrap();
/// assert_eq!(*seen.borrow(), vec![1, 2]);
/// ```
#[must_use = "the watcher stops as soon as the guard is dropped"]
pub struct WatchGuard {
    _watcher: Rc<dyn Dependent>,
}

impl WatchGuard {
    pub(crate) fn new<T: Clone + 'static>(stream: &Stream<T>, watcher: Watcher<T>) -> Self {
        let watcher = Rc::new(watcher);
        let dependent: Rc<dyn Dependent> = watcher.clone();
        stream.inner.node.subscribe(&dependent);
        watcher.fire();
        Self {
            _watcher: dependent,
        }
    }
}

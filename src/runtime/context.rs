use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Tunables for a propagation runtime.
///
/// # Examples
///
/// ```
/// use sluice::runtime::Config;
///
/// let config = Config::default().with_max_replays(16);
/// assert_eq!(config.max_replays, 16);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// How many times in a row a derived stream may be replayed within one
    /// activation before propagation fails with `ReentrancyOverflow`.
    pub max_replays: usize,
}

impl Config {
    /// Set the replay limit.
    pub fn with_max_replays(mut self, max_replays: usize) -> Self {
        self.max_replays = max_replays;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self { max_replays: 1000 }
    }
}

/// Single-threaded propagation runtime.
///
/// Every stream captures the runtime that was current when it was created
/// and takes its identity and limits from it. Each thread has a default
/// runtime; scoped runtimes give isolation, mostly for tests.
///
/// # Examples
///
/// Using the thread's default runtime:
///
/// ```
/// use sluice::Stream;
///
/// let stream = Stream::new(42);
/// assert_eq!(stream.get(), Some(42));
/// ```
///
/// Using a scoped runtime with its own limits:
///
/// ```
/// use sluice::runtime::{Config, Runtime};
/// use sluice::Stream;
///
/// Runtime::scope_with(Config::default().with_max_replays(4), || {
///     let stream = Stream::new(0);
///     assert_eq!(stream.get(), Some(0));
/// });
/// ```
pub struct Runtime {
    next_id: Cell<usize>,
    config: Config,
}

thread_local! {
    static RUNTIME_STACK: RefCell<Vec<Rc<Runtime>>> = RefCell::new(vec![]);
    static DEFAULT_RUNTIME: Rc<Runtime> = Runtime::new(Config::default());
}

impl Runtime {
    /// Create a new isolated runtime.
    pub fn new(config: Config) -> Rc<Self> {
        Rc::new(Runtime {
            next_id: Cell::new(0),
            config,
        })
    }

    /// Run a function with a fresh runtime using the default config.
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        Self::scope_with(Config::default(), f)
    }

    /// Run a function with a fresh runtime using `config`.
    pub fn scope_with<F, R>(config: Config, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        Self::with_runtime(Self::new(config), f)
    }

    /// The runtime used when no scoped runtime is active on this thread.
    pub fn default_runtime() -> Rc<Self> {
        DEFAULT_RUNTIME.with(Rc::clone)
    }

    /// Get the current runtime (innermost scoped one, else the default).
    pub fn current() -> Rc<Self> {
        RUNTIME_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .cloned()
                .unwrap_or_else(Self::default_runtime)
        })
    }

    /// Run a function with a specific runtime as the current context.
    ///
    /// The runtime is pushed onto the thread-local stack for the duration of
    /// the call and popped again even if the function panics.
    pub fn with_runtime<F, R>(runtime: Rc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().push(runtime);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// This runtime's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Generate the next unique ID for a stream.
    pub fn next_id(&self) -> usize {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_runtime_is_current_only_inside() {
        let outer = Runtime::current();
        Runtime::scope_with(Config::default().with_max_replays(3), || {
            assert_eq!(Runtime::current().config().max_replays, 3);
            assert!(!Rc::ptr_eq(&Runtime::current(), &outer));
        });
        assert!(Rc::ptr_eq(&Runtime::current(), &outer));
    }

    #[test]
    fn ids_are_sequential_per_runtime() {
        let runtime = Runtime::new(Config::default());
        assert_eq!(runtime.next_id(), 0);
        assert_eq!(runtime.next_id(), 1);
    }

    #[test]
    fn stack_unwinds_after_panic() {
        let outer = Runtime::current();
        let result = std::panic::catch_unwind(|| {
            Runtime::scope(|| panic!("inside scope"));
        });
        assert!(result.is_err());
        assert!(Rc::ptr_eq(&Runtime::current(), &outer));
    }
}

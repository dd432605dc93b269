//! Propagation engine shared by every stream.
//!
//! A `set` on a stream notifies its dependents synchronously and
//! depth-first, in registration order. Derived streams guard their own
//! activation: a trigger that arrives while the combining function is
//! already on the stack is recorded and replayed once after it returns.

use crate::error::{Error, Result};
use crate::runtime::Runtime;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

/// Something that reacts when a stream it is registered on is set.
pub(crate) trait Dependent {
    fn trigger(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Activation {
    Idle,
    Evaluating,
    ReplayPending,
}

/// Resets a node to idle when its combining function unwinds.
struct IdleOnDrop<'a>(&'a Cell<Activation>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.set(Activation::Idle);
        }
    }
}

pub(crate) struct Node {
    pub(crate) id: usize,
    pub(crate) runtime: Rc<Runtime>,
    dependents: RefCell<Vec<Weak<dyn Dependent>>>,
    // Wiring this node owns: its combinator and end watchers.
    upstream: RefCell<Vec<Rc<dyn Dependent>>>,
    activation: Cell<Activation>,
    activations: Cell<usize>,
}

impl Node {
    pub(crate) fn new(runtime: Rc<Runtime>) -> Self {
        Self {
            id: runtime.next_id(),
            runtime,
            dependents: RefCell::new(Vec::new()),
            upstream: RefCell::new(Vec::new()),
            activation: Cell::new(Activation::Idle),
            activations: Cell::new(0),
        }
    }

    /// Register `dependent` to be triggered after every `set` on this node.
    /// Registering the same dependent twice is a no-op.
    pub(crate) fn subscribe(&self, dependent: &Rc<dyn Dependent>) {
        let weak = Rc::downgrade(dependent);
        let mut dependents = self.dependents.borrow_mut();
        if !dependents.iter().any(|d| Weak::ptr_eq(d, &weak)) {
            dependents.push(weak);
        }
    }

    /// Keep `dependent` alive for as long as this node is.
    pub(crate) fn own(&self, dependent: Rc<dyn Dependent>) {
        self.upstream.borrow_mut().push(dependent);
    }

    pub(crate) fn is_evaluating(&self) -> bool {
        self.activation.get() != Activation::Idle
    }

    pub(crate) fn activations(&self) -> usize {
        self.activations.get()
    }

    /// Trigger every live dependent, in registration order.
    ///
    /// The list is snapshotted first, so dependents registered during the
    /// sweep are not visited by it. The first error aborts the sweep.
    pub(crate) fn notify(&self) -> Result<()> {
        let dependents: Vec<Rc<dyn Dependent>> = {
            let mut registered = self.dependents.borrow_mut();
            registered.retain(|d| d.strong_count() > 0);
            registered.iter().filter_map(Weak::upgrade).collect()
        };

        if !dependents.is_empty() {
            trace!(stream = self.id, dependents = dependents.len(), "notifying");
        }
        for dependent in dependents {
            dependent.trigger()?;
        }
        Ok(())
    }

    /// Run `run` under this node's reentrancy guard.
    ///
    /// If an activation is already on the stack the trigger only marks a
    /// replay as pending. Otherwise `run` executes while `ready` holds, and
    /// again once per run during which a replay was requested.
    pub(crate) fn activate<R, F>(&self, ready: R, mut run: F) -> Result<()>
    where
        R: Fn() -> bool,
        F: FnMut() -> Result<()>,
    {
        match self.activation.get() {
            Activation::Evaluating => {
                trace!(stream = self.id, "already evaluating, replay deferred");
                self.activation.set(Activation::ReplayPending);
                return Ok(());
            }
            Activation::ReplayPending => return Ok(()),
            Activation::Idle => {}
        }

        let limit = self.runtime.config().max_replays;
        let mut replays = 0;
        while ready() {
            self.activation.set(Activation::Evaluating);
            self.activations.set(self.activations.get() + 1);
            trace!(stream = self.id, replays, "activating");

            let reset = IdleOnDrop(&self.activation);
            let outcome = run();
            drop(reset);
            let replay = self.activation.replace(Activation::Idle) == Activation::ReplayPending;
            if let Err(err) = outcome {
                debug!(stream = self.id, error = %err, "activation failed");
                return Err(err);
            }
            if !replay {
                return Ok(());
            }

            replays += 1;
            if replays > limit {
                debug!(stream = self.id, limit, "replay limit exceeded");
                return Err(Error::ReentrancyOverflow {
                    stream: self.id,
                    limit,
                });
            }
        }

        trace!(stream = self.id, "not ready, activation skipped");
        Ok(())
    }
}

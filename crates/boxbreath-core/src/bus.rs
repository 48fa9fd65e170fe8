//! In-process publish/subscribe for phase events.
//!
//! One writer (the scheduler), any number of listeners. Delivery is
//! synchronous and in emission order. Each publish walks a snapshot of the
//! subscriber list, so attaching or detaching during a delivery pass only
//! takes effect on the next pass.

use std::cell::RefCell;
use std::rc::Rc;

use crate::events::{CycleEvent, PhaseEvent};

/// Anything that wants to hear about phase boundaries.
pub trait PhaseListener {
    /// Short name used in logs.
    fn name(&self) -> &str {
        "listener"
    }

    fn on_phase_event(&mut self, event: &PhaseEvent);

    /// A cycle just finished. Commands posted from here are applied before
    /// the next cycle begins.
    fn on_cycle_complete(&mut self, _event: &CycleEvent) {}
}

impl<F> PhaseListener for F
where
    F: FnMut(&PhaseEvent),
{
    fn on_phase_event(&mut self, event: &PhaseEvent) {
        self(event)
    }
}

/// Opaque subscription id returned by [`PhaseBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type SharedListener = Rc<RefCell<dyn PhaseListener>>;

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: Vec<(ListenerId, SharedListener)>,
}

/// Cloneable handle to a phase event bus.
///
/// Clones share the same subscriber list, so a listener holding a clone can
/// detach itself or others.
#[derive(Clone, Default)]
pub struct PhaseBus {
    inner: Rc<RefCell<BusInner>>,
}

impl PhaseBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener the bus owns outright.
    pub fn subscribe<L>(&self, listener: L) -> ListenerId
    where
        L: PhaseListener + 'static,
    {
        self.subscribe_shared(Rc::new(RefCell::new(listener)))
    }

    /// Attach a listener the caller keeps a handle to (e.g. to read a counter).
    pub fn subscribe_shared(&self, listener: SharedListener) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.subscribers.push((id, listener));
        id
    }

    /// Detach a listener. Returns `false` if it was not attached.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sid, _)| *sid != id);
        inner.subscribers.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every listener attached when the call began.
    ///
    /// Returns the number of listeners that received it.
    pub fn publish(&self, event: &PhaseEvent) -> usize {
        self.deliver(|l| l.on_phase_event(event))
    }

    /// Announce a finished cycle, same delivery rules as [`publish`](Self::publish).
    pub fn publish_cycle(&self, event: &CycleEvent) -> usize {
        self.deliver(|l| l.on_cycle_complete(event))
    }

    fn deliver(&self, mut call: impl FnMut(&mut dyn PhaseListener)) -> usize {
        let snapshot: Vec<(ListenerId, SharedListener)> = self
            .inner
            .borrow()
            .subscribers
            .iter()
            .map(|(id, l)| (*id, Rc::clone(l)))
            .collect();

        let mut delivered = 0;
        for (id, listener) in snapshot {
            match listener.try_borrow_mut() {
                Ok(mut l) => {
                    call(&mut *l);
                    delivered += 1;
                }
                Err(_) => {
                    tracing::warn!(?id, "listener busy (re-entrant publish), skipping delivery");
                }
            }
        }
        delivered
    }
}

impl std::fmt::Debug for PhaseBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseBus")
            .field("listeners", &self.len())
            .finish()
    }
}

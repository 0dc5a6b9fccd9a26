use std::cell::{Cell, RefCell};
use std::rc::Rc;

use smallvec::SmallVec;

/// Subscriber events on a single observable value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
	/// Fires with the outgoing value when a change is about to be
	/// published. The cell already holds the new value at this point;
	/// the payload carries the old one for transition detection.
	BeforeChange,
	/// Fires with the new value after a change.
	Change,
}

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Subscription {
	pub(crate) id: u64,
}

struct Entry<P: ?Sized> {
	id: u64,
	event: Event,
	callback: Rc<dyn Fn(&P)>,
}

/// Insertion-ordered subscriber list shared by cells, lists and computed
/// values. Notification iterates a snapshot, so callbacks may subscribe,
/// unsubscribe or write back into the same observable; the order of such
/// secondary effects is undefined but always converges.
pub(crate) struct Emitter<P: ?Sized> {
	entries: RefCell<SmallVec<[Entry<P>; 2]>>,
	next: Cell<u64>,
}

impl<P: ?Sized> Emitter<P> {
	pub const fn new() -> Self {
		Emitter {
			entries: RefCell::new(SmallVec::new_const()),
			next: Cell::new(0),
		}
	}

	pub fn on(&self, event: Event, callback: Rc<dyn Fn(&P)>) -> Subscription {
		let id = self.next.get();
		self.next.set(id + 1);
		self.entries.borrow_mut().push(Entry {
			id,
			event,
			callback,
		});
		Subscription { id }
	}

	pub fn off(&self, subscription: &Subscription) -> bool {
		let mut entries = self.entries.borrow_mut();
		let before = entries.len();
		entries.retain(|entry| entry.id != subscription.id);
		entries.len() != before
	}

	pub fn has(&self, event: Event) -> bool {
		self.entries.borrow().iter().any(|entry| entry.event == event)
	}

	pub fn fire(&self, event: Event, payload: &P) {
		let snapshot: SmallVec<[Rc<dyn Fn(&P)>; 4]> = self
			.entries
			.borrow()
			.iter()
			.filter(|entry| entry.event == event)
			.map(|entry| entry.callback.clone())
			.collect();

		for callback in snapshot {
			callback(payload);
		}
	}

	pub fn clear(&self) {
		self.entries.borrow_mut().clear();
	}
}

/// Like [`Emitter`] but for a single event kind; carries the structural
/// change payloads of [`crate::List`].
pub(crate) struct Listeners<P: ?Sized> {
	entries: RefCell<SmallVec<[(u64, Rc<dyn Fn(&P)>); 2]>>,
	next: Cell<u64>,
}

impl<P: ?Sized> Listeners<P> {
	pub const fn new() -> Self {
		Listeners {
			entries: RefCell::new(SmallVec::new_const()),
			next: Cell::new(0),
		}
	}

	pub fn on(&self, callback: Rc<dyn Fn(&P)>) -> Subscription {
		let id = self.next.get();
		self.next.set(id + 1);
		self.entries.borrow_mut().push((id, callback));
		Subscription { id }
	}

	pub fn off(&self, subscription: &Subscription) -> bool {
		let mut entries = self.entries.borrow_mut();
		let before = entries.len();
		entries.retain(|(id, _)| *id != subscription.id);
		entries.len() != before
	}

	pub fn fire(&self, payload: &P) {
		let snapshot: SmallVec<[Rc<dyn Fn(&P)>; 4]> = self
			.entries
			.borrow()
			.iter()
			.map(|(_, callback)| callback.clone())
			.collect();

		for callback in snapshot {
			callback(payload);
		}
	}
}

//! Process-wide named-event bus, independent of any single observable.
//!
//! One default instance per thread backs the free functions; it starts
//! empty and is never torn down (subscriptions are owner-scoped). Tests
//! and embedders that need isolation construct their own [`EventBus`]
//! instead of sharing the default one.

use std::cell::RefCell;
use std::rc::Rc;

use fxhash::FxHashMap;

use crate::Dynamic;

/// Handle for removing a listener. Rust closures are not comparable, so
/// removal is by id rather than by callback identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerId(u64);

struct Listener {
	id: u64,
	once: bool,
	callback: Rc<dyn Fn(&Dynamic)>,
}

/// A named-event registry used for lifecycle signals (e.g. "a binding
/// completed").
pub struct EventBus {
	inner: RefCell<BusInner>,
}

struct BusInner {
	listeners: FxHashMap<String, Vec<Listener>>,
	next: u64,
}

impl Default for EventBus {
	fn default() -> Self {
		EventBus::new()
	}
}

impl EventBus {
	pub fn new() -> Self {
		EventBus {
			inner: RefCell::new(BusInner {
				listeners: FxHashMap::default(),
				next: 0,
			}),
		}
	}

	pub fn on(&self, name: &str, callback: impl Fn(&Dynamic) + 'static) -> ListenerId {
		self.subscribe(name, Rc::new(callback), false)
	}

	/// Like [`on`], but the listener fires at most once and is removed
	/// before its callback runs.
	///
	/// [`on`]: EventBus::on
	pub fn once(&self, name: &str, callback: impl Fn(&Dynamic) + 'static) -> ListenerId {
		self.subscribe(name, Rc::new(callback), true)
	}

	fn subscribe(&self, name: &str, callback: Rc<dyn Fn(&Dynamic)>, once: bool) -> ListenerId {
		let mut inner = self.inner.borrow_mut();
		let id = inner.next;
		inner.next += 1;
		inner
			.listeners
			.entry(name.to_owned())
			.or_default()
			.push(Listener { id, once, callback });
		ListenerId(id)
	}

	pub fn remove_listener(&self, id: ListenerId) -> bool {
		let mut inner = self.inner.borrow_mut();
		for listeners in inner.listeners.values_mut() {
			let before = listeners.len();
			listeners.retain(|listener| listener.id != id.0);
			if listeners.len() != before {
				return true;
			}
		}
		false
	}

	/// Fires every listener registered for `name`, in subscription order.
	/// Once-listeners are removed before any callback runs, so a
	/// re-entrant emit cannot fire them twice.
	pub fn emit(&self, name: &str, payload: &Dynamic) {
		let snapshot: Vec<Rc<dyn Fn(&Dynamic)>> = {
			let mut inner = self.inner.borrow_mut();
			match inner.listeners.get_mut(name) {
				Some(listeners) => {
					let snapshot = listeners
						.iter()
						.map(|listener| listener.callback.clone())
						.collect();
					listeners.retain(|listener| !listener.once);
					snapshot
				}
				None => return,
			}
		};

		for callback in snapshot {
			callback(payload);
		}
	}
}

thread_local! {
	static BUS: EventBus = EventBus::new();
}

/// Subscribes to `name` on the default bus.
pub fn on(name: &str, callback: impl Fn(&Dynamic) + 'static) -> ListenerId {
	BUS.with(|bus| bus.on(name, callback))
}

/// Subscribes to one occurrence of `name` on the default bus.
pub fn once(name: &str, callback: impl Fn(&Dynamic) + 'static) -> ListenerId {
	BUS.with(|bus| bus.once(name, callback))
}

/// Removes a listener from the default bus.
pub fn remove_listener(id: ListenerId) -> bool {
	BUS.with(|bus| bus.remove_listener(id))
}

/// Emits `name` on the default bus.
pub fn emit(name: &str, payload: &Dynamic) {
	BUS.with(|bus| bus.emit(name, payload))
}

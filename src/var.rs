use std::cell::{Ref, RefCell};
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use crate::batch::{self, Flush};
use crate::dependencies::Dependents;
use crate::emitter::Emitter;
use crate::hashed::Hashed;
use crate::{track, Computed, Dependent, Event, Observable, Subscription};

type EqualityFn<T> = Box<dyn Fn(&T, &T) -> bool>;

/// A mutable observable cell.
///
/// Reading through [`get`] while a [`Computed`] evaluates registers this
/// cell as one of its dependencies. Writing through [`set`] notifies
/// subscribers and re-evaluates dependents synchronously, unless the new
/// value equals the old one under the cell's equality (by default, the
/// `fxhash` fingerprint of the value).
///
/// [`get`]: Var::get
/// [`set`]: Var::set
pub struct Var<T> {
	body: Rc<VarBody<T>>,
}

impl<T> Clone for Var<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

pub struct VarBody<T> {
	value: RefCell<Hashed<T>>,
	pending: RefCell<Option<Hashed<T>>>,
	equality: RefCell<Option<EqualityFn<T>>>,
	subscribers: Emitter<T>,
	dependents: Dependents,
	this: Weak<VarBody<T>>,
}

impl<T> Default for Var<T>
where
	T: Default + Hash + Clone + 'static,
{
	fn default() -> Self {
		Var::new(Default::default())
	}
}

pub trait Toggle {
	fn toggle(&mut self);
}

impl Toggle for bool {
	fn toggle(&mut self) {
		*self = !*self
	}
}

impl<T> Var<T>
where
	T: Hash + Clone + 'static,
{
	pub fn new(value: T) -> Self {
		Var {
			body: Rc::new_cyclic(|this| VarBody {
				value: RefCell::new(Hashed::new(value)),
				pending: RefCell::new(None),
				equality: RefCell::new(None),
				subscribers: Emitter::new(),
				dependents: Dependents::new(),
				this: this.clone(),
			}),
		}
	}

	/// Derives a computed cell from this one.
	pub fn map<F, R>(&self, func: F) -> Computed<R>
	where
		F: Fn(&T) -> R + 'static,
		R: Hash + Clone + 'static,
	{
		let this = self.body.clone();
		Computed::new(Box::new(move || func(&this.get())))
	}

	/// Current value; tracked when a computed evaluation is in flight.
	#[inline]
	pub fn get(&self) -> Ref<'_, T> {
		self.body.get()
	}

	/// Current value without dependency tracking.
	#[inline]
	pub fn peek(&self) -> Ref<'_, T> {
		self.body.peek()
	}

	/// Replaces the value; notifies only when it actually changed.
	#[inline]
	pub fn set(&self, value: T) {
		self.body.write(value, false);
	}

	/// Like [`set`], but notifies synchronously even inside an open
	/// batched-write window.
	///
	/// [`set`]: Var::set
	#[inline]
	pub fn set_immediate(&self, value: T) {
		self.body.write(value, true);
	}

	/// Replaces the value and returns the previous one.
	pub fn replace(&self, value: T) -> T {
		let old = self.peek().clone();
		self.set(value);
		old
	}

	/// Mutates the value in place; notifies like [`set`] when the
	/// mutation changed the fingerprint.
	///
	/// [`set`]: Var::set
	pub fn update(&self, func: impl FnOnce(&mut T)) {
		self.body.update(func);
	}

	#[inline]
	pub fn toggle(&self)
	where
		T: Toggle,
	{
		self.update(T::toggle)
	}

	/// Overrides the change-detection equality for this cell.
	pub fn set_equality(&self, equality: impl Fn(&T, &T) -> bool + 'static) {
		*self.body.equality.borrow_mut() = Some(Box::new(equality));
	}

	/// Subscribes `callback` to `event`. Callbacks fire in subscription
	/// order over a snapshot taken at notification time; a callback
	/// writing back into this cell converges instead of deadlocking, with
	/// the order of such secondary notifications undefined.
	pub fn on(&self, event: Event, callback: impl Fn(&T) + 'static) -> Subscription {
		self.body.subscribers.on(event, Rc::new(callback))
	}

	pub fn off(&self, subscription: &Subscription) -> bool {
		self.body.subscribers.off(subscription)
	}

	/// True iff at least one live node binding consumes this cell.
	pub fn is_bound(&self) -> bool {
		self.body.dependents.is_bound()
	}

	/// Manually declares that `computed` depends on this cell, for
	/// relationships the tracker cannot see (reads outside the evaluation
	/// window, e.g. in a deferred callback). The edge survives dependency
	/// re-swaps until the computed is disposed.
	pub fn add_computed_dependency<U>(&self, computed: &Computed<U>)
	where
		U: Hash + Clone + 'static,
	{
		computed.add_dependency(self.observable());
	}

	/// The type-erased source handle for this cell.
	pub fn observable(&self) -> Rc<dyn Observable> {
		self.body.clone()
	}

	pub(crate) fn addr(&self) -> usize {
		Rc::as_ptr(&self.body) as *const () as usize
	}
}

impl<T> VarBody<T>
where
	T: Hash + Clone + 'static,
{
	pub fn peek(&self) -> Ref<'_, T> {
		Ref::map(self.value.borrow(), |hashed| &hashed.value)
	}

	pub fn get(&self) -> Ref<'_, T> {
		if track::active() {
			track::record(self.this.upgrade().unwrap());
		}
		self.peek()
	}

	fn write(&self, value: T, immediate: bool) {
		let new = Hashed::new(value);
		let replaced = std::mem::replace(&mut *self.value.borrow_mut(), new);

		// The before-image is the oldest value not yet published.
		let old = match self.pending.borrow_mut().take() {
			Some(prior) => prior,
			None => replaced,
		};

		let changed = {
			let current = self.value.borrow();
			match &*self.equality.borrow() {
				Some(equal) => !equal(&old.value, &current.value),
				None => old.hash != current.hash,
			}
		};

		if !changed {
			return;
		}

		if !immediate && batch::in_batch() {
			*self.pending.borrow_mut() = Some(old);
			batch::enqueue(self.this.upgrade().unwrap());
			return;
		}

		self.notify(old.value);
	}

	fn update(&self, func: impl FnOnce(&mut T)) {
		let old = {
			let mut value = self.value.borrow_mut();
			let old = Hashed {
				value: value.value.clone(),
				hash: value.hash,
			};
			func(&mut value.value);
			value.rehash();
			if value.hash == old.hash {
				return;
			}
			old
		};

		let old = match self.pending.borrow_mut().take() {
			Some(prior) => prior,
			None => old,
		};

		if batch::in_batch() {
			*self.pending.borrow_mut() = Some(old);
			batch::enqueue(self.this.upgrade().unwrap());
			return;
		}

		self.notify(old.value);
	}

	// Delivery order: `BeforeChange`, dependent re-evaluation, `Change`.
	// Dependents settle first so `Change` callbacks observe a consistent
	// derived graph.
	fn notify(&self, old: T) {
		self.subscribers.fire(Event::BeforeChange, &old);
		self.dependents.notify();
		self.fire_change();
	}

	fn fire_change(&self) {
		if self.subscribers.has(Event::Change) {
			let current = self.value.borrow().value.clone();
			self.subscribers.fire(Event::Change, &current);
		}
	}
}

impl<T: 'static> Observable for VarBody<T> {
	fn used_by(&self, dependent: Weak<dyn Dependent>, binding: bool) {
		self.dependents.insert(dependent, binding);
	}

	fn not_used_by(&self, dependent: &Weak<dyn Dependent>) {
		self.dependents.remove(dependent);
	}
}

impl<T> Flush for VarBody<T>
where
	T: Hash + Clone + 'static,
{
	fn flush(&self) {
		let old = match self.pending.borrow_mut().take() {
			Some(old) => old,
			None => return,
		};

		let changed = {
			let current = self.value.borrow();
			match &*self.equality.borrow() {
				Some(equal) => !equal(&old.value, &current.value),
				None => old.hash != current.hash,
			}
		};

		if changed {
			self.notify(old.value);
		}
	}
}

impl<T> Hash for Var<T> {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		state.write_u64(self.body.value.borrow().hash);
	}
}

impl<T> Debug for Var<T>
where
	T: Hash + Clone + Debug + 'static,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.peek().fmt(f)
	}
}

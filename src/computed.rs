use std::cell::{Ref, RefCell};
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use crate::dependencies::{DependencySet, Dependents};
use crate::emitter::Emitter;
use crate::hashed::Hashed;
use crate::{track, Dependent, Event, Observable, Subscription};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Freshness {
	/// The cached value reflects current dependency values.
	Fresh,
	/// A dependency changed since the last evaluation.
	Stale,
}

/// A derived observable cell.
///
/// The evaluator runs once at construction inside a tracking frame;
/// observables it reads become dependencies. Re-evaluation is eager and
/// synchronous: a dependency change recomputes the value before the
/// triggering write returns, re-subscribing to newly read dependencies and
/// unsubscribing from ones no longer read. Reading a `Computed` inside
/// another evaluator registers it as a dependency, exactly like a cell.
pub struct Computed<T>
where
	T: Hash + Clone + 'static,
{
	body: Rc<ComputedBody<T>>,
}

impl<T> Clone for Computed<T>
where
	T: Hash + Clone + 'static,
{
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

pub struct ComputedBody<T>
where
	T: Hash + Clone + 'static,
{
	func: Box<dyn Fn() -> T>,
	value: RefCell<Option<Hashed<T>>>,
	subscribers: Emitter<T>,
	dependents: Dependents,
	inner: RefCell<ComputedInner<T>>,
}

struct ComputedInner<T>
where
	T: Hash + Clone + 'static,
{
	state: Freshness,
	binding: bool,
	disposed: bool,
	dependencies: DependencySet,
	pinned: DependencySet,
	this: Weak<ComputedBody<T>>,
}

impl<T> Drop for ComputedInner<T>
where
	T: Hash + Clone + 'static,
{
	fn drop(&mut self) {
		let this = self.this.clone() as Weak<dyn Dependent>;
		self.dependencies.release(&this);
		self.pinned.release(&this);
	}
}

impl<T> Computed<T>
where
	T: Hash + Clone + 'static,
{
	pub fn new(func: Box<dyn Fn() -> T>) -> Self {
		Self::construct(func, false)
	}

	/// A computed whose dependency edges are flagged as node bindings;
	/// cells it reads report `is_bound`.
	pub(crate) fn new_binding(func: Box<dyn Fn() -> T>) -> Self {
		Self::construct(func, true)
	}

	fn construct(func: Box<dyn Fn() -> T>, binding: bool) -> Self {
		let body = Rc::new_cyclic(|this| ComputedBody {
			func,
			value: RefCell::new(None),
			subscribers: Emitter::new(),
			dependents: Dependents::new(),
			inner: RefCell::new(ComputedInner {
				state: Freshness::Stale,
				binding,
				disposed: false,
				dependencies: DependencySet::new(),
				pinned: DependencySet::new(),
				this: this.clone(),
			}),
		});
		body.revalidate();
		Computed { body }
	}

	/// Current value; tracked when an outer computed evaluation is in
	/// flight. A stale value is never observable: reading mid-propagation
	/// re-evaluates on demand.
	#[inline]
	pub fn get(&self) -> Ref<'_, T> {
		self.body.get()
	}

	/// Current value without dependency tracking.
	#[inline]
	pub fn peek(&self) -> Ref<'_, T> {
		self.body.peek()
	}

	pub fn on(&self, event: Event, callback: impl Fn(&T) + 'static) -> Subscription {
		self.body.subscribers.on(event, Rc::new(callback))
	}

	pub fn off(&self, subscription: &Subscription) -> bool {
		self.body.subscribers.off(subscription)
	}

	/// True iff at least one live node binding consumes this value.
	pub fn is_bound(&self) -> bool {
		self.body.dependents.is_bound()
	}

	/// Pins `source` as a permanent dependency: changes re-evaluate this
	/// computed even though the tracker never saw the read, and the edge
	/// survives dependency re-swaps until disposal.
	pub fn add_dependency(&self, source: Rc<dyn Observable>) {
		let mut inner = self.body.inner.borrow_mut();
		if inner.disposed {
			return;
		}
		let this = inner.this.clone() as Weak<dyn Dependent>;
		let binding = inner.binding;
		if inner.pinned.insert(source.clone()) {
			source.used_by(this, binding);
		}
	}

	/// Unsubscribes from every dependency and drops all subscribers. The
	/// cached value remains readable; the evaluator never runs again.
	pub fn dispose(&self) {
		{
			let mut inner = self.body.inner.borrow_mut();
			if inner.disposed {
				return;
			}
			inner.disposed = true;
			inner.state = Freshness::Fresh;
			let this = inner.this.clone() as Weak<dyn Dependent>;
			let ComputedInner {
				dependencies,
				pinned,
				..
			} = &mut *inner;
			dependencies.release(&this);
			pinned.release(&this);
		}
		self.body.subscribers.clear();
	}

	/// The type-erased source handle for this value.
	pub fn observable(&self) -> Rc<dyn Observable> {
		self.body.clone()
	}

	pub(crate) fn addr(&self) -> usize {
		Rc::as_ptr(&self.body) as *const () as usize
	}
}

impl<T> ComputedBody<T>
where
	T: Hash + Clone + 'static,
{
	fn peek(&self) -> Ref<'_, T> {
		Ref::map(self.value.borrow(), |value| {
			&value.as_ref().expect("evaluated at construction").value
		})
	}

	fn get(&self) -> Ref<'_, T> {
		self.revalidate();
		if track::active() {
			track::record(self.inner.borrow().this.upgrade().unwrap());
		}
		self.peek()
	}

	/// Re-evaluates when stale. Publishes `BeforeChange`/`Change` and
	/// notifies dependents when the fingerprint moved, so propagation
	/// cascades through derived chains.
	fn revalidate(&self) {
		let (this, binding) = {
			let inner = self.inner.borrow();
			if inner.state == Freshness::Fresh && self.value.borrow().is_some() {
				return;
			}
			if inner.disposed {
				return;
			}
			// An evaluator reading itself would recurse forever; hand the
			// current cached value back instead.
			if track::evaluating(&(inner.this.clone() as Weak<dyn Dependent>)) {
				return;
			}
			(inner.this.clone(), inner.binding)
		};

		let guard = track::FrameGuard::open(this.clone() as Weak<dyn Dependent>);
		let value = (self.func)();
		let recorded = guard.finish();

		{
			let mut inner = self.inner.borrow_mut();
			inner.state = Freshness::Fresh;
			let dependent = this as Weak<dyn Dependent>;
			let ComputedInner {
				dependencies,
				pinned,
				..
			} = &mut *inner;
			dependencies.swap(recorded, &dependent, binding, pinned);
		}

		let new = Hashed::new(value);
		let old = self.value.borrow_mut().replace(new);

		match old {
			Some(old) if old.hash != self.value.borrow().as_ref().unwrap().hash => {
				tracing::trace!("computed value changed, notifying");
				self.subscribers.fire(Event::BeforeChange, &old.value);
				self.dependents.notify();
				if self.subscribers.has(Event::Change) {
					let current = self.value.borrow().as_ref().unwrap().value.clone();
					self.subscribers.fire(Event::Change, &current);
				}
			}
			_ => {}
		}
	}
}

impl<T> Observable for ComputedBody<T>
where
	T: Hash + Clone + 'static,
{
	fn used_by(&self, dependent: Weak<dyn Dependent>, binding: bool) {
		self.dependents.insert(dependent, binding);
	}

	fn not_used_by(&self, dependent: &Weak<dyn Dependent>) {
		self.dependents.remove(dependent);
	}
}

impl<T> Dependent for ComputedBody<T>
where
	T: Hash + Clone + 'static,
{
	fn dependency_changed(self: Rc<Self>) {
		{
			let mut inner = self.inner.borrow_mut();
			if inner.disposed {
				return;
			}
			inner.state = Freshness::Stale;
		}
		self.revalidate();
	}
}

impl<T> Hash for Computed<T>
where
	T: Hash + Clone + 'static,
{
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		if let Some(value) = &*self.body.value.borrow() {
			state.write_u64(value.hash);
		}
	}
}

impl<T> Debug for Computed<T>
where
	T: Hash + Clone + Debug + 'static,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.peek().fmt(f)
	}
}

use std::cell::{Ref, RefCell};
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use crate::batch::{self, Flush};
use crate::dependencies::Dependents;
use crate::emitter::{Emitter, Listeners};
use crate::error::ListError;
use crate::hashed::Hashed;
use crate::{track, Computed, Dependent, Event, Observable, Subscription};

/// A discrete structural change to a [`List`], distinct from whole-sequence
/// replacement. Indices refer to post-mutation positions and are always
/// consistent with the stored sequence the moment the mutator returns.
#[derive(Clone, Debug, PartialEq)]
pub enum Structure<T> {
	Insert { index: usize, items: Vec<T> },
	Remove { index: usize, items: Vec<T> },
	Splice {
		index: usize,
		removed: Vec<T>,
		inserted: Vec<T>,
	},
	/// The whole sequence was cleared in one bulk operation.
	Clear { items: Vec<T> },
}

/// A mutable observable sequence.
///
/// Whole-sequence access behaves like [`Var`]: tracked [`get`], fingerprint
/// short-circuited [`set`], `BeforeChange`/`Change` events. Structural
/// mutators additionally publish a [`Structure`] event, so list-rendering
/// consumers can avoid re-rendering on whole-value semantics and vice
/// versa: replacement via [`set`] never emits a structural event.
///
/// [`Var`]: crate::Var
/// [`get`]: List::get
/// [`set`]: List::set
pub struct List<T> {
	body: Rc<ListBody<T>>,
}

impl<T> Clone for List<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

pub struct ListBody<T> {
	items: RefCell<Hashed<Vec<T>>>,
	pending: RefCell<Pending<T>>,
	subscribers: Emitter<[T]>,
	structure: Listeners<Structure<T>>,
	dependents: Dependents,
	this: Weak<ListBody<T>>,
}

struct Pending<T> {
	old: Option<Hashed<Vec<T>>>,
	saw_replace: bool,
	events: Vec<Structure<T>>,
}

impl<T> Default for List<T>
where
	T: Hash + Clone + 'static,
{
	fn default() -> Self {
		List::new(Vec::new())
	}
}

impl<T> List<T>
where
	T: Hash + Clone + 'static,
{
	pub fn new(items: Vec<T>) -> Self {
		List {
			body: Rc::new_cyclic(|this| ListBody {
				items: RefCell::new(Hashed::new(items)),
				pending: RefCell::new(Pending {
					old: None,
					saw_replace: false,
					events: Vec::new(),
				}),
				subscribers: Emitter::new(),
				structure: Listeners::new(),
				dependents: Dependents::new(),
				this: this.clone(),
			}),
		}
	}

	/// Current contents; tracked when a computed evaluation is in flight.
	#[inline]
	pub fn get(&self) -> Ref<'_, Vec<T>> {
		self.body.get()
	}

	/// Current contents without dependency tracking.
	#[inline]
	pub fn peek(&self) -> Ref<'_, Vec<T>> {
		Ref::map(self.body.items.borrow(), |items| &items.value)
	}

	/// Tracked element count.
	pub fn len(&self) -> usize {
		self.get().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Replaces the whole sequence. Emits `BeforeChange`/`Change`, never a
	/// structural event.
	pub fn set(&self, items: Vec<T>) {
		self.body.write(items, false);
	}

	/// Like [`set`], but notifies synchronously even inside an open
	/// batched-write window.
	///
	/// [`set`]: List::set
	pub fn set_immediate(&self, items: Vec<T>) {
		self.body.write(items, true);
	}

	/// Appends an element; emits an insert at the new last index. Returns
	/// the new length.
	pub fn push(&self, item: T) -> usize {
		self.body.structural(|items| {
			items.push(item.clone());
			let index = items.len() - 1;
			(
				Some(Structure::Insert {
					index,
					items: vec![item],
				}),
				items.len(),
			)
		})
	}

	/// Prepends an element; emits an insert at index 0. Returns the new
	/// length.
	pub fn unshift(&self, item: T) -> usize {
		self.body.structural(|items| {
			items.insert(0, item.clone());
			(
				Some(Structure::Insert {
					index: 0,
					items: vec![item],
				}),
				items.len(),
			)
		})
	}

	/// Removes and returns the last element.
	pub fn pop(&self) -> Result<T, ListError> {
		self.body.structural(|items| match items.pop() {
			Some(item) => {
				let index = items.len();
				(
					Some(Structure::Remove {
						index,
						items: vec![item.clone()],
					}),
					Ok(item),
				)
			}
			None => (None, Err(ListError::Empty)),
		})
	}

	/// Removes `delete_count` elements starting at `start` (clamped to
	/// `[0, len]`) and inserts `items` there; returns the removed
	/// elements. Emits one combined splice event.
	pub fn splice(&self, start: usize, delete_count: usize, items: Vec<T>) -> Vec<T> {
		self.body.structural(|stored| {
			let start = start.min(stored.len());
			let end = start + delete_count.min(stored.len() - start);
			let inserted = items.clone();
			let removed: Vec<T> = stored.splice(start..end, items).collect();

			if removed.is_empty() && inserted.is_empty() {
				return (None, removed);
			}

			let event = Structure::Splice {
				index: start,
				removed: removed.clone(),
				inserted,
			};
			(Some(event), removed)
		})
	}

	/// Removes the first element equal to `item`; silently does nothing
	/// when absent.
	pub fn remove(&self, item: &T) -> Option<T>
	where
		T: PartialEq,
	{
		self.body.structural(|items| {
			match items.iter().position(|candidate| candidate == item) {
				Some(index) => {
					let removed = items.remove(index);
					(
						Some(Structure::Remove {
							index,
							items: vec![removed.clone()],
						}),
						Some(removed),
					)
				}
				None => (None, None),
			}
		})
	}

	/// Clears the sequence with a single bulk event, so list-rendering
	/// consumers re-render once instead of once per element.
	pub fn remove_all(&self) -> Vec<T> {
		self.body.structural(|items| {
			if items.is_empty() {
				return (None, Vec::new());
			}
			let removed = std::mem::take(items);
			(
				Some(Structure::Clear {
					items: removed.clone(),
				}),
				removed,
			)
		})
	}

	/// Subscribes to whole-sequence value events.
	pub fn on(&self, event: Event, callback: impl Fn(&[T]) + 'static) -> Subscription {
		self.body.subscribers.on(event, Rc::new(callback))
	}

	pub fn off(&self, subscription: &Subscription) -> bool {
		self.body.subscribers.off(subscription)
	}

	/// Subscribes to structural mutation events.
	pub fn on_structure(&self, callback: impl Fn(&Structure<T>) + 'static) -> Subscription {
		self.body.structure.on(Rc::new(callback))
	}

	pub fn off_structure(&self, subscription: &Subscription) -> bool {
		self.body.structure.off(subscription)
	}

	/// True iff at least one live node binding consumes this list.
	pub fn is_bound(&self) -> bool {
		self.body.dependents.is_bound()
	}

	/// Manually declares that `computed` depends on this list; see
	/// [`Var::add_computed_dependency`].
	///
	/// [`Var::add_computed_dependency`]: crate::Var::add_computed_dependency
	pub fn add_computed_dependency<U>(&self, computed: &Computed<U>)
	where
		U: Hash + Clone + 'static,
	{
		computed.add_dependency(self.observable());
	}

	/// The type-erased source handle for this list.
	pub fn observable(&self) -> Rc<dyn Observable> {
		self.body.clone()
	}

	pub(crate) fn addr(&self) -> usize {
		Rc::as_ptr(&self.body) as *const () as usize
	}
}

impl<T> ListBody<T>
where
	T: Hash + Clone + 'static,
{
	fn get(&self) -> Ref<'_, Vec<T>> {
		if track::active() {
			track::record(self.this.upgrade().unwrap());
		}
		Ref::map(self.items.borrow(), |items| &items.value)
	}

	fn write(&self, items: Vec<T>, immediate: bool) {
		let new = Hashed::new(items);
		let replaced = std::mem::replace(&mut *self.items.borrow_mut(), new);

		let old = match self.pending.borrow_mut().old.take() {
			Some(prior) => prior,
			None => replaced,
		};

		if old.hash == self.items.borrow().hash {
			return;
		}

		if !immediate && batch::in_batch() {
			let mut pending = self.pending.borrow_mut();
			pending.old = Some(old);
			pending.saw_replace = true;
			drop(pending);
			batch::enqueue(self.this.upgrade().unwrap());
			return;
		}

		self.subscribers.fire(Event::BeforeChange, &old.value);
		self.dependents.notify();
		self.fire_change();
	}

	/// Applies one structural mutation and publishes its event. Inside a
	/// batch the event queues in arrival order and value notification is
	/// deferred; otherwise everything fires before returning.
	fn structural<R>(&self, op: impl FnOnce(&mut Vec<T>) -> (Option<Structure<T>>, R)) -> R {
		let batching = batch::in_batch();
		if batching {
			let mut pending = self.pending.borrow_mut();
			if pending.old.is_none() {
				let items = self.items.borrow();
				pending.old = Some(Hashed {
					value: items.value.clone(),
					hash: items.hash,
				});
			}
		}

		let (event, result) = {
			let mut items = self.items.borrow_mut();
			let (event, result) = op(&mut items.value);
			items.rehash();
			(event, result)
		};

		let event = match event {
			Some(event) => event,
			None => return result,
		};

		if batching {
			self.pending.borrow_mut().events.push(event);
			batch::enqueue(self.this.upgrade().unwrap());
		} else {
			self.structure.fire(&event);
			self.dependents.notify();
			self.fire_change();
		}

		result
	}

	fn fire_change(&self) {
		if self.subscribers.has(Event::Change) {
			let snapshot = self.items.borrow().value.clone();
			self.subscribers.fire(Event::Change, &snapshot);
		}
	}
}

impl<T: 'static> Observable for ListBody<T> {
	fn used_by(&self, dependent: Weak<dyn Dependent>, binding: bool) {
		self.dependents.insert(dependent, binding);
	}

	fn not_used_by(&self, dependent: &Weak<dyn Dependent>) {
		self.dependents.remove(dependent);
	}
}

impl<T> Flush for ListBody<T>
where
	T: Hash + Clone + 'static,
{
	fn flush(&self) {
		let (old, saw_replace, events) = {
			let mut pending = self.pending.borrow_mut();
			let old = pending.old.take();
			let saw_replace = std::mem::take(&mut pending.saw_replace);
			let events = std::mem::take(&mut pending.events);
			(old, saw_replace, events)
		};

		for event in &events {
			self.structure.fire(event);
		}

		let old = match old {
			Some(old) => old,
			None => return,
		};

		if old.hash == self.items.borrow().hash {
			return;
		}

		if saw_replace {
			self.subscribers.fire(Event::BeforeChange, &old.value);
		}
		self.dependents.notify();
		self.fire_change();
	}
}

impl<T> Hash for List<T> {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		state.write_u64(self.body.items.borrow().hash);
	}
}

impl<T> Debug for List<T>
where
	T: Hash + Clone + Debug + 'static,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.peek().fmt(f)
	}
}

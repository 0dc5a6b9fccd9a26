use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

use crate::addr::{RcRef, WeakRef};
use crate::{Dependent, Observable};

/// The set of sources one dependent currently reads. Holds sources
/// strongly: a cell stays alive for as long as some computed value is
/// based on it.
pub(crate) struct DependencySet {
	based_on: BTreeSet<RcRef<dyn Observable>>,
}

impl Default for DependencySet {
	fn default() -> Self {
		DependencySet::new()
	}
}

impl DependencySet {
	pub fn new() -> Self {
		Self {
			based_on: BTreeSet::new(),
		}
	}

	pub fn insert(&mut self, source: Rc<dyn Observable>) -> bool {
		self.based_on.insert(RcRef::new(source))
	}

	fn contains(&self, source: &RcRef<dyn Observable>) -> bool {
		self.based_on.contains(source)
	}

	/// Unsubscribes `dependent` from every source and clears the set.
	pub fn release(&mut self, dependent: &Weak<dyn Dependent>) {
		for source in &self.based_on {
			source.not_used_by(dependent);
		}
		self.based_on.clear();
	}

	/// Replaces the set with the result of a fresh evaluation: newly read
	/// sources are subscribed, sources no longer read are unsubscribed.
	/// Sources in `pinned` are never unsubscribed here; explicit edges
	/// outlive evaluation churn.
	pub fn swap(
		&mut self,
		next: DependencySet,
		dependent: &Weak<dyn Dependent>,
		binding: bool,
		pinned: &DependencySet,
	) {
		for source in &next.based_on {
			if !self.based_on.contains(source) {
				source.used_by(dependent.clone(), binding);
			}
		}

		let prev = std::mem::replace(&mut self.based_on, next.based_on);
		prev.iter()
			.filter(|source| !self.based_on.contains(source) && !pinned.contains(source))
			.for_each(|source| source.not_used_by(dependent));
	}
}

/// Reverse edges: the dependents listening to one source, with the
/// binding flag under which each edge was created.
pub(crate) struct Dependents {
	edges: RefCell<BTreeMap<WeakRef<dyn Dependent>, bool>>,
}

impl Dependents {
	pub const fn new() -> Self {
		Dependents {
			edges: RefCell::new(BTreeMap::new()),
		}
	}

	pub fn insert(&self, dependent: Weak<dyn Dependent>, binding: bool) {
		self.edges
			.borrow_mut()
			.entry(WeakRef::new(dependent))
			.and_modify(|flag| *flag |= binding)
			.or_insert(binding);
	}

	pub fn remove(&self, dependent: &Weak<dyn Dependent>) {
		self.edges
			.borrow_mut()
			.remove(&WeakRef::new(dependent.clone()));
	}

	/// True iff at least one live binding-flagged dependent listens.
	pub fn is_bound(&self) -> bool {
		self.edges
			.borrow()
			.iter()
			.any(|(edge, binding)| *binding && edge.strong_count() > 0)
	}

	/// Delivers a change to every live dependent. Iterates a snapshot so
	/// re-evaluations may rewire edges mid-flight; dead edges are pruned
	/// along the way.
	pub fn notify(&self) {
		let live: Vec<Rc<dyn Dependent>> = {
			let mut edges = self.edges.borrow_mut();
			let mut live = Vec::with_capacity(edges.len());
			edges.retain(|edge, _| match edge.upgrade() {
				Some(dependent) => {
					live.push(dependent);
					true
				}
				None => false,
			});
			live
		};

		for dependent in live {
			dependent.dependency_changed();
		}
	}
}

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::{Computed, List, Var};

/// The model-facing value domain of the binding layer.
///
/// Primitives carry value semantics; `Seq`/`Map` are shared plain
/// containers; `Cell`/`List`/`Derived` are observables. Equality and the
/// change fingerprint follow the same rule: by value for primitives, by
/// shared-allocation identity for containers and observables.
#[derive(Clone)]
pub enum Dynamic {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(Rc<str>),
	Seq(Rc<RefCell<Vec<Dynamic>>>),
	Map(Rc<RefCell<BTreeMap<String, Dynamic>>>),
	Cell(Var<Dynamic>),
	List(List<Dynamic>),
	Derived(Computed<Dynamic>),
}

impl Dynamic {
	pub fn str(value: impl AsRef<str>) -> Dynamic {
		Dynamic::Str(Rc::from(value.as_ref()))
	}

	pub fn seq(items: Vec<Dynamic>) -> Dynamic {
		Dynamic::Seq(Rc::new(RefCell::new(items)))
	}

	pub fn map(entries: impl IntoIterator<Item = (String, Dynamic)>) -> Dynamic {
		Dynamic::Map(Rc::new(RefCell::new(entries.into_iter().collect())))
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Dynamic::Null)
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Dynamic::Bool(value) => Some(*value),
			_ => None,
		}
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			Dynamic::Int(value) => Some(*value),
			_ => None,
		}
	}

	pub fn as_float(&self) -> Option<f64> {
		match self {
			Dynamic::Float(value) => Some(*value),
			Dynamic::Int(value) => Some(*value as f64),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<Rc<str>> {
		match self {
			Dynamic::Str(value) => Some(value.clone()),
			_ => None,
		}
	}

	pub fn as_cell(&self) -> Option<&Var<Dynamic>> {
		match self {
			Dynamic::Cell(cell) => Some(cell),
			_ => None,
		}
	}

	pub fn as_list(&self) -> Option<&List<Dynamic>> {
		match self {
			Dynamic::List(list) => Some(list),
			_ => None,
		}
	}

	pub fn as_derived(&self) -> Option<&Computed<Dynamic>> {
		match self {
			Dynamic::Derived(derived) => Some(derived),
			_ => None,
		}
	}

	/// Looks up `key` in a `Map` value.
	pub fn entry(&self, key: &str) -> Option<Dynamic> {
		match self {
			Dynamic::Map(map) => map.borrow().get(key).cloned(),
			_ => None,
		}
	}

	/// Loose truthiness used by presence-style consumers: `Null`, `false`,
	/// zero and the empty string are false, everything else true.
	pub fn is_truthy(&self) -> bool {
		match self {
			Dynamic::Null => false,
			Dynamic::Bool(value) => *value,
			Dynamic::Int(value) => *value != 0,
			Dynamic::Float(value) => *value != 0.0,
			Dynamic::Str(value) => !value.is_empty(),
			_ => true,
		}
	}
}

/// True iff `value` is an observable (`Cell`, `List` or `Derived`).
pub fn is_observable(value: &Dynamic) -> bool {
	matches!(
		value,
		Dynamic::Cell(_) | Dynamic::List(_) | Dynamic::Derived(_)
	)
}

/// Reads through an observable.
///
/// Non-recursive: one read — `Cell`/`Derived` yield their current value,
/// `List` yields a fresh `Seq` of its items, anything else is returned
/// unchanged. Recursive: unwraps observable chains to a non-observable,
/// then traverses `Seq` and `Map` containers and unwrapped list elements
/// at any depth; opaque leaves are never traversed. Reads are tracked, so
/// unwrapping inside a computed evaluator registers dependencies. Cyclic
/// shared containers are the caller's responsibility.
pub fn unwrap_observable(value: &Dynamic, recursive: bool) -> Dynamic {
	let unwrapped = match value {
		Dynamic::Cell(cell) => cell.get().clone(),
		Dynamic::Derived(derived) => derived.get().clone(),
		Dynamic::List(list) => Dynamic::seq(list.get().clone()),
		other => other.clone(),
	};

	if !recursive {
		return unwrapped;
	}

	match unwrapped {
		// Chained observables unwrap all the way down.
		ref inner if is_observable(inner) => unwrap_observable(inner, true),
		Dynamic::Seq(items) => {
			let items = items
				.borrow()
				.iter()
				.map(|item| unwrap_observable(item, true))
				.collect();
			Dynamic::seq(items)
		}
		Dynamic::Map(entries) => {
			let entries = entries
				.borrow()
				.iter()
				.map(|(key, item)| (key.clone(), unwrap_observable(item, true)))
				.collect::<BTreeMap<_, _>>();
			Dynamic::Map(Rc::new(RefCell::new(entries)))
		}
		other => other,
	}
}

impl Default for Dynamic {
	fn default() -> Self {
		Dynamic::Null
	}
}

impl PartialEq for Dynamic {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Dynamic::Null, Dynamic::Null) => true,
			(Dynamic::Bool(a), Dynamic::Bool(b)) => a == b,
			(Dynamic::Int(a), Dynamic::Int(b)) => a == b,
			(Dynamic::Float(a), Dynamic::Float(b)) => a == b,
			(Dynamic::Str(a), Dynamic::Str(b)) => a == b,
			(Dynamic::Seq(a), Dynamic::Seq(b)) => Rc::ptr_eq(a, b),
			(Dynamic::Map(a), Dynamic::Map(b)) => Rc::ptr_eq(a, b),
			(Dynamic::Cell(a), Dynamic::Cell(b)) => a.addr() == b.addr(),
			(Dynamic::List(a), Dynamic::List(b)) => a.addr() == b.addr(),
			(Dynamic::Derived(a), Dynamic::Derived(b)) => a.addr() == b.addr(),
			_ => false,
		}
	}
}

impl Hash for Dynamic {
	fn hash<H: Hasher>(&self, state: &mut H) {
		std::mem::discriminant(self).hash(state);
		match self {
			Dynamic::Null => {}
			Dynamic::Bool(value) => value.hash(state),
			Dynamic::Int(value) => value.hash(state),
			Dynamic::Float(value) => value.to_bits().hash(state),
			Dynamic::Str(value) => value.hash(state),
			Dynamic::Seq(items) => (Rc::as_ptr(items) as usize).hash(state),
			Dynamic::Map(entries) => (Rc::as_ptr(entries) as usize).hash(state),
			Dynamic::Cell(cell) => cell.addr().hash(state),
			Dynamic::List(list) => list.addr().hash(state),
			Dynamic::Derived(derived) => derived.addr().hash(state),
		}
	}
}

impl Debug for Dynamic {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Dynamic::Null => f.write_str("null"),
			Dynamic::Bool(value) => value.fmt(f),
			Dynamic::Int(value) => value.fmt(f),
			Dynamic::Float(value) => value.fmt(f),
			Dynamic::Str(value) => value.fmt(f),
			Dynamic::Seq(items) => items.borrow().fmt(f),
			Dynamic::Map(entries) => entries.borrow().fmt(f),
			Dynamic::Cell(cell) => f.debug_tuple("Cell").field(&cell.peek()).finish(),
			Dynamic::List(list) => f.debug_tuple("List").field(&list.peek()).finish(),
			Dynamic::Derived(derived) => f.debug_tuple("Derived").field(&derived.peek()).finish(),
		}
	}
}

impl From<bool> for Dynamic {
	fn from(value: bool) -> Self {
		Dynamic::Bool(value)
	}
}

impl From<i64> for Dynamic {
	fn from(value: i64) -> Self {
		Dynamic::Int(value)
	}
}

impl From<f64> for Dynamic {
	fn from(value: f64) -> Self {
		Dynamic::Float(value)
	}
}

impl From<&str> for Dynamic {
	fn from(value: &str) -> Self {
		Dynamic::str(value)
	}
}

impl From<String> for Dynamic {
	fn from(value: String) -> Self {
		Dynamic::Str(Rc::from(value))
	}
}

impl From<Var<Dynamic>> for Dynamic {
	fn from(cell: Var<Dynamic>) -> Self {
		Dynamic::Cell(cell)
	}
}

impl From<List<Dynamic>> for Dynamic {
	fn from(list: List<Dynamic>) -> Self {
		Dynamic::List(list)
	}
}

impl From<Computed<Dynamic>> for Dynamic {
	fn from(derived: Computed<Dynamic>) -> Self {
		Dynamic::Derived(derived)
	}
}

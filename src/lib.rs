//! Observable cells, derived values and declarative node binding.
//!
//! The reactive core is a dependency graph between mutable cells ([`Var`],
//! [`List`]) and derived values ([`Computed`]). Reads performed while a
//! [`Computed`] evaluates are recorded as dependencies; a write that
//! actually changes a value re-evaluates its dependents synchronously,
//! before the write returns. The binding layer ([`Binder`]) attaches a
//! model to a node subtree through named [`BindingHandler`]s and keeps the
//! nodes up to date through the same graph.

pub mod events;
pub mod macros;

mod addr;
mod batch;
mod binder;
mod computed;
mod dependencies;
mod dynamic;
mod emitter;
mod error;
mod hashed;
mod list;
mod registry;
mod track;
mod var;

use std::hash::Hash;
use std::rc::{Rc, Weak};

pub use batch::{batch, in_batch};
pub use binder::{
	BindFailure, BindReport, Binder, BindingContext, Declaration, Element, NodeRef, Resolver,
	ScannedNode, Scanner, BINDING_COMPLETE,
};
pub use computed::Computed;
pub use dynamic::{is_observable, unwrap_observable, Dynamic};
pub use emitter::{Event, Subscription};
pub use error::{BindError, ListError, RegistryError};
pub use hashed::Hashed;
pub use list::{List, Structure};
pub use registry::{register_binding_handler, BindingHandler, BoxError, Registry};
pub use var::{Toggle, Var};

/// A change source in the dependency graph. Implemented by the shared
/// bodies of [`Var`], [`List`] and [`Computed`]; the binding layer and
/// explicit dependency lists handle sources only through this trait.
pub trait Observable: 'static {
	/// Notify this source that `dependent` started to listen. `binding`
	/// marks edges created on behalf of a live node binding; they feed
	/// `is_bound`.
	fn used_by(&self, dependent: Weak<dyn Dependent>, binding: bool);

	/// Notify this source that `dependent` stopped to listen.
	fn not_used_by(&self, dependent: &Weak<dyn Dependent>);
}

/// A change sink: something re-evaluated when one of its recorded
/// dependencies changes.
pub trait Dependent: 'static {
	fn dependency_changed(self: Rc<Self>);
}

/// Creates a mutable observable cell holding `value`.
pub fn observable<T>(value: T) -> Var<T>
where
	T: Hash + Clone + 'static,
{
	Var::new(value)
}

/// Creates a mutable observable sequence holding `items`.
pub fn observable_list<T>(items: Vec<T>) -> List<T>
where
	T: Hash + Clone + 'static,
{
	List::new(items)
}

/// Creates a derived cell. `evaluator` runs once immediately; observables
/// it reads become tracked dependencies, unioned with the explicit
/// `dependencies` list (which survives every re-evaluation, for
/// relationships the tracker cannot see).
pub fn computed<T>(
	evaluator: impl Fn() -> T + 'static,
	dependencies: Vec<Rc<dyn Observable>>,
) -> Computed<T>
where
	T: Hash + Clone + 'static,
{
	let computed = Computed::new(Box::new(evaluator));
	for dependency in dependencies {
		computed.add_dependency(dependency);
	}
	computed
}

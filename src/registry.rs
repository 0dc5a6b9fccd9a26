use std::cell::RefCell;
use std::rc::Rc;

use fxhash::FxHashMap;

use crate::binder::{BindingContext, Declaration, NodeRef};
use crate::error::{BindError, RegistryError};
use crate::Dynamic;

pub type BoxError = Box<dyn std::error::Error>;

type InitializeFn = Box<dyn Fn(&Dynamic, &NodeRef, &Rc<BindingContext>) -> Result<bool, BoxError>>;
type UpdateFn = Box<dyn Fn(&Dynamic, &NodeRef, &Rc<BindingContext>) -> Result<(), BoxError>>;
type CleanupFn = Box<dyn Fn(&NodeRef)>;

/// Lifecycle callbacks of one named binding handler.
///
/// Each slot is an optional capability: a handler that only renders
/// populates `update`, one that only wires node state populates
/// `initialize`, and so on. `initialize` runs once per node; returning
/// `false` declines every `update` invocation on that node (including the
/// first bind-time pass) without affecting dependent handlers. `update`
/// runs at bind time and again whenever an observable read while resolving
/// the binding's expression changes. `cleanup` runs at unbind, in reverse
/// dependency order, and must tolerate a partially initialized node.
#[derive(Default)]
pub struct BindingHandler {
	pub(crate) initialize: Option<InitializeFn>,
	pub(crate) update: Option<UpdateFn>,
	pub(crate) cleanup: Option<CleanupFn>,
}

impl BindingHandler {
	pub fn new() -> Self {
		Default::default()
	}

	pub fn initialize(
		mut self,
		callback: impl Fn(&Dynamic, &NodeRef, &Rc<BindingContext>) -> Result<bool, BoxError> + 'static,
	) -> Self {
		self.initialize = Some(Box::new(callback));
		self
	}

	pub fn update(
		mut self,
		callback: impl Fn(&Dynamic, &NodeRef, &Rc<BindingContext>) -> Result<(), BoxError> + 'static,
	) -> Self {
		self.update = Some(Box::new(callback));
		self
	}

	pub fn cleanup(mut self, callback: impl Fn(&NodeRef) + 'static) -> Self {
		self.cleanup = Some(Box::new(callback));
		self
	}
}

pub(crate) struct Registration {
	pub handler: BindingHandler,
	pub dependencies: Vec<String>,
}

/// Named registry of binding handlers.
///
/// A process-wide default instance backs [`register_binding_handler`];
/// isolated instances (e.g. per test) come from [`Registry::new`] and are
/// handed to [`Binder::with_registry`].
///
/// [`Binder::with_registry`]: crate::Binder::with_registry
#[derive(Default)]
pub struct Registry {
	handlers: RefCell<FxHashMap<String, Rc<Registration>>>,
}

impl Registry {
	pub fn new() -> Self {
		Default::default()
	}

	/// Registers `handler` under `name`, with `dependencies` naming
	/// handlers that must complete `initialize` on the same node first.
	/// Fails when `name` is taken, unless `replace` is set.
	pub fn register(
		&self,
		name: &str,
		handler: BindingHandler,
		dependencies: &[&str],
		replace: bool,
	) -> Result<(), RegistryError> {
		let mut handlers = self.handlers.borrow_mut();
		if !replace && handlers.contains_key(name) {
			return Err(RegistryError::Duplicate {
				name: name.to_owned(),
			});
		}

		handlers.insert(
			name.to_owned(),
			Rc::new(Registration {
				handler,
				dependencies: dependencies.iter().map(|dep| (*dep).to_owned()).collect(),
			}),
		);
		Ok(())
	}

	pub fn unregister(&self, name: &str) -> bool {
		let removed = self.handlers.borrow_mut().remove(name).is_some();
		if !removed {
			tracing::warn!(handler = name, "unregistering a handler that is not registered");
		}
		removed
	}

	pub fn is_registered(&self, name: &str) -> bool {
		self.handlers.borrow().contains_key(name)
	}

	/// Resolves the declarations of one node into execution order.
	///
	/// Every declared handler and every handler it names as a dependency
	/// must be registered; dependencies also declared on the node order
	/// before their dependents, others impose no constraint. Declaration
	/// order breaks ties, so the result is deterministic. A cycle among
	/// the node's declared handlers fails fast.
	pub(crate) fn order(
		&self,
		declarations: &[Declaration],
	) -> Result<Vec<(usize, Rc<Registration>)>, BindError> {
		let handlers = self.handlers.borrow();

		let mut registrations = Vec::with_capacity(declarations.len());
		let mut declared: FxHashMap<&str, usize> = FxHashMap::default();
		for (position, declaration) in declarations.iter().enumerate() {
			let registration = handlers
				.get(&declaration.handler)
				.ok_or_else(|| BindError::UnknownHandler(declaration.handler.clone()))?;
			for dependency in &registration.dependencies {
				if !handlers.contains_key(dependency) {
					return Err(BindError::UnknownHandler(dependency.clone()));
				}
			}
			declared.insert(declaration.handler.as_str(), position);
			registrations.push(registration.clone());
		}

		// Kahn's algorithm over the declared handlers, picking the
		// earliest declaration among those with no unmet dependencies.
		let mut remaining: Vec<usize> = (0..declarations.len()).collect();
		let mut emitted = vec![false; declarations.len()];
		let mut order = Vec::with_capacity(declarations.len());

		while !remaining.is_empty() {
			let ready = remaining.iter().position(|&candidate| {
				registrations[candidate]
					.dependencies
					.iter()
					.all(|dependency| match declared.get(dependency.as_str()) {
						Some(&position) => emitted[position],
						None => true,
					})
			});

			match ready {
				Some(slot) => {
					let position = remaining.remove(slot);
					emitted[position] = true;
					order.push((position, registrations[position].clone()));
				}
				None => {
					let mut cycle: Vec<String> = remaining
						.iter()
						.map(|&position| declarations[position].handler.clone())
						.collect();
					cycle.sort();
					return Err(BindError::HandlerCycle(cycle));
				}
			}
		}

		Ok(order)
	}
}

thread_local! {
	static REGISTRY: Rc<Registry> = Rc::new(Registry::new());
}

/// The process-wide default registry.
pub(crate) fn global() -> Rc<Registry> {
	REGISTRY.with(|registry| registry.clone())
}

/// Registers a binding handler on the default registry.
pub fn register_binding_handler(
	name: &str,
	handler: BindingHandler,
	dependencies: &[&str],
	replace: bool,
) -> Result<(), RegistryError> {
	global().register(name, handler, dependencies, replace)
}

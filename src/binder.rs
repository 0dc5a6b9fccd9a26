use std::any::Any;
use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use crate::dynamic::unwrap_observable;
use crate::error::BindError;
use crate::events;
use crate::registry::{self, BoxError, Registration, Registry};
use crate::{Computed, Dynamic, Event, Subscription};

/// Emitted on the default event bus after every successful
/// [`Binder::bind_model`].
pub const BINDING_COMPLETE: &str = "binding:complete";

/// An opaque bound node. The binder never inspects nodes beyond identity;
/// handlers downcast through `as_any` to whatever node type the embedding
/// template layer uses.
pub trait Element: 'static {
	fn as_any(&self) -> &dyn Any;
}

pub type NodeRef = Rc<dyn Element>;

fn node_addr(node: &NodeRef) -> usize {
	Rc::as_ptr(node).cast::<()>() as usize
}

/// One raw binding declaration on a node: a handler name and the source
/// expression to resolve against the node's context.
#[derive(Clone, Debug)]
pub struct Declaration {
	pub handler: String,
	pub expression: String,
}

/// A node together with its binding declarations, as produced by a
/// [`Scanner`].
pub struct ScannedNode {
	pub node: NodeRef,
	pub bindings: Vec<Declaration>,
}

/// The template-scanning collaborator: walks a node subtree and yields the
/// nodes carrying binding declarations, in document order.
pub trait Scanner {
	fn scan(&self, root: &NodeRef) -> Vec<ScannedNode>;
}

/// The expression-resolution collaborator: evaluates a source expression
/// against a binding context. Observables read during resolution are
/// tracked, so resolving inside a binding wrapper registers dependencies.
pub trait Resolver {
	fn resolve(&self, expression: &str, context: &Rc<BindingContext>) -> Dynamic;
}

/// A chain of model references. Each bound subtree carries exactly one
/// context, inherited by descendants; handlers that iterate (one child
/// context per item) introduce new links with [`child`].
///
/// [`child`]: BindingContext::child
pub struct BindingContext {
	model: Dynamic,
	parent: Option<Rc<BindingContext>>,
}

impl BindingContext {
	pub fn root(model: Dynamic) -> Rc<Self> {
		Rc::new(BindingContext {
			model,
			parent: None,
		})
	}

	pub fn child(self: &Rc<Self>, model: Dynamic) -> Rc<Self> {
		Rc::new(BindingContext {
			model,
			parent: Some(self.clone()),
		})
	}

	pub fn model(&self) -> &Dynamic {
		&self.model
	}

	pub fn parent(&self) -> Option<&Rc<BindingContext>> {
		self.parent.as_ref()
	}

	/// The top of the chain (the model passed to `bind_model`).
	pub fn root_context(self: &Rc<Self>) -> Rc<BindingContext> {
		let mut current = self.clone();
		while let Some(parent) = &current.parent {
			let parent = parent.clone();
			current = parent;
		}
		current
	}
}

/// One per-node initialization failure reported by [`Binder::bind_model`].
pub struct BindFailure {
	pub node: NodeRef,
	pub handler: String,
	pub error: BoxError,
}

impl Debug for BindFailure {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BindFailure")
			.field("node", &node_addr(&self.node))
			.field("handler", &self.handler)
			.field("error", &self.error.to_string())
			.finish()
	}
}

/// Aggregate report of per-node failures. Configuration errors abort the
/// bind with [`BindError`] instead; everything listed here left the other
/// nodes bound and working.
#[derive(Debug, Default)]
pub struct BindReport {
	pub failures: Vec<BindFailure>,
}

impl BindReport {
	pub fn is_clean(&self) -> bool {
		self.failures.is_empty()
	}
}

struct ActiveBinding {
	declaration: Declaration,
	registration: Rc<Registration>,
	accepts_updates: bool,
	wrapper: Option<(Computed<Dynamic>, Subscription)>,
}

struct BoundNode {
	node: NodeRef,
	bindings: Vec<ActiveBinding>,
}

struct Region {
	model: Dynamic,
	root: NodeRef,
	nodes: Vec<BoundNode>,
}

/// Attaches models to node subtrees.
///
/// The binder owns no template knowledge: a [`Scanner`] discovers
/// declarations, a [`Resolver`] evaluates expressions, and registered
/// [`BindingHandler`]s do the actual node work. What the binder adds is
/// lifecycle: per-node handler ordering, one `initialize` per handler per
/// node, a change-tracked wrapper around each `update`, and teardown.
///
/// [`BindingHandler`]: crate::BindingHandler
pub struct Binder {
	registry: Rc<Registry>,
	scanner: Rc<dyn Scanner>,
	resolver: Rc<dyn Resolver>,
	regions: RefCell<Vec<Region>>,
}

impl Binder {
	/// A binder over the process-wide default registry.
	pub fn new(scanner: Rc<dyn Scanner>, resolver: Rc<dyn Resolver>) -> Self {
		Self::with_registry(scanner, resolver, registry::global())
	}

	pub fn with_registry(
		scanner: Rc<dyn Scanner>,
		resolver: Rc<dyn Resolver>,
		registry: Rc<Registry>,
	) -> Self {
		Binder {
			registry,
			scanner,
			resolver,
			regions: RefCell::new(Vec::new()),
		}
	}

	/// Binds `model` to the subtree rooted at `root`.
	///
	/// Scans the subtree, validates every node's declarations against the
	/// registry (unknown handlers and dependency cycles fail fast, before
	/// any handler runs), then per node, in dependency order, initializes
	/// each handler and wires its `update` through a tracked wrapper.
	/// A handler `initialize` error skips that node's remaining handlers
	/// and lands in the returned [`BindReport`]; other nodes still bind.
	///
	/// Rebinding the same root with the identical model is a no-op; with a
	/// different model it fails with [`BindError::AlreadyBound`].
	pub fn bind_model(&self, model: Dynamic, root: &NodeRef) -> Result<BindReport, BindError> {
		if let Some(region) = self
			.regions
			.borrow()
			.iter()
			.find(|region| node_addr(&region.root) == node_addr(root))
		{
			if region.model == model {
				return Ok(BindReport::default());
			}
			return Err(BindError::AlreadyBound);
		}

		let scanned = self.scanner.scan(root);

		let mut plans = Vec::with_capacity(scanned.len());
		for node in &scanned {
			plans.push(self.registry.order(&node.bindings)?);
		}

		tracing::debug!(nodes = scanned.len(), "binding model to subtree");

		let context = BindingContext::root(model.clone());
		let mut report = BindReport::default();
		let mut nodes = Vec::with_capacity(scanned.len());

		for (scanned_node, plan) in scanned.into_iter().zip(plans) {
			let bound =
				self.bind_node(&scanned_node.node, &scanned_node.bindings, plan, &context, &mut report);
			nodes.push(BoundNode {
				node: scanned_node.node,
				bindings: bound,
			});
		}

		self.regions.borrow_mut().push(Region {
			model,
			root: root.clone(),
			nodes,
		});

		events::emit(BINDING_COMPLETE, &Dynamic::Null);
		Ok(report)
	}

	/// Two passes over one node's handlers, both in dependency order:
	/// every `initialize` completes before the first `update` runs. An
	/// `initialize` error abandons the node — remaining handlers and all
	/// update wiring are skipped, handlers already initialized stay bound
	/// for cleanup at unbind.
	fn bind_node(
		&self,
		node: &NodeRef,
		declarations: &[Declaration],
		plan: Vec<(usize, Rc<Registration>)>,
		context: &Rc<BindingContext>,
		report: &mut BindReport,
	) -> Vec<ActiveBinding> {
		let mut bound = Vec::with_capacity(plan.len());

		for (position, registration) in plan {
			let declaration = &declarations[position];

			let accepts_updates = match &registration.handler.initialize {
				Some(initialize) => {
					let raw = self.resolver.resolve(&declaration.expression, context);
					match initialize(&raw, node, context) {
						Ok(accepts) => accepts,
						Err(error) => {
							tracing::error!(
								handler = declaration.handler.as_str(),
								node = node_addr(node),
								%error,
								"handler initialization failed, skipping rest of node"
							);
							report.failures.push(BindFailure {
								node: node.clone(),
								handler: declaration.handler.clone(),
								error,
							});
							return bound;
						}
					}
				}
				None => true,
			};

			bound.push(ActiveBinding {
				declaration: declaration.clone(),
				registration,
				accepts_updates,
				wrapper: None,
			});
		}

		for binding in &mut bound {
			if binding.registration.handler.update.is_some() && binding.accepts_updates {
				binding.wrapper = Some(self.wrap_update(
					node,
					&binding.declaration,
					&binding.registration,
					context,
				));
			}
		}

		bound
	}

	/// Wraps one binding's value resolution in a binding-flagged computed:
	/// re-resolving the expression re-reads its observables, so any change
	/// re-invokes `update` with the freshly unwrapped value.
	fn wrap_update(
		&self,
		node: &NodeRef,
		declaration: &Declaration,
		registration: &Rc<Registration>,
		context: &Rc<BindingContext>,
	) -> (Computed<Dynamic>, Subscription) {
		let wrapper = {
			let resolver = self.resolver.clone();
			let expression = declaration.expression.clone();
			let context = context.clone();
			Computed::new_binding(Box::new(move || {
				unwrap_observable(&resolver.resolve(&expression, &context), false)
			}))
		};

		let subscription = {
			let registration = registration.clone();
			let name = declaration.handler.clone();
			let node = node.clone();
			let context = context.clone();
			wrapper.on(Event::Change, move |value: &Dynamic| {
				if let Some(update) = &registration.handler.update {
					if let Err(error) = update(value, &node, &context) {
						tracing::error!(
							handler = name.as_str(),
							node = node_addr(&node),
							%error,
							"handler update failed"
						);
					}
				}
			})
		};

		// First pass runs at bind time; afterwards changes drive it.
		if let Some(update) = &registration.handler.update {
			let value = wrapper.peek().clone();
			if let Err(error) = update(&value, node, context) {
				tracing::error!(
					handler = declaration.handler.as_str(),
					node = node_addr(node),
					%error,
					"handler update failed"
				);
			}
		}

		(wrapper, subscription)
	}

	/// Detaches every region bound to `model`: per node in reverse
	/// document order and reverse dependency order, runs `cleanup`, then
	/// disposes the update wrapper, unsubscribing it from every
	/// dependency. After this returns no `update` fires again, even when a
	/// previously bound observable is written. Safe to call when
	/// initialization partially failed; returns whether anything was
	/// bound.
	pub fn unbind_model(&self, model: &Dynamic) -> bool {
		let removed: Vec<Region> = {
			let mut regions = self.regions.borrow_mut();
			let mut removed = Vec::new();
			let mut index = 0;
			while index < regions.len() {
				if regions[index].model == *model {
					removed.push(regions.remove(index));
				} else {
					index += 1;
				}
			}
			removed
		};

		if removed.is_empty() {
			return false;
		}

		for region in &removed {
			tracing::debug!(nodes = region.nodes.len(), "unbinding model from subtree");
			for node in region.nodes.iter().rev() {
				for binding in node.bindings.iter().rev() {
					if let Some(cleanup) = &binding.registration.handler.cleanup {
						cleanup(&node.node);
					}
					if let Some((wrapper, subscription)) = &binding.wrapper {
						wrapper.off(subscription);
						wrapper.dispose();
					}
					tracing::trace!(
						handler = binding.declaration.handler.as_str(),
						node = node_addr(&node.node),
						"binding detached"
					);
				}
			}
		}

		true
	}
}

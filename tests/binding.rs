use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use bindery::{
	events, observable, BindError, Binder, BindingContext, BindingHandler, Declaration, Dynamic,
	Element, NodeRef, Registry, RegistryError, Resolver, ScannedNode, Scanner, Var,
	BINDING_COMPLETE,
};

struct TestNode {
	#[allow(unused)]
	label: &'static str,
	text: RefCell<String>,
}

impl Element for TestNode {
	fn as_any(&self) -> &dyn Any {
		self
	}
}

fn node(label: &'static str) -> NodeRef {
	Rc::new(TestNode {
		label,
		text: RefCell::new(String::new()),
	})
}

fn text_of(node: &NodeRef) -> String {
	node.as_any()
		.downcast_ref::<TestNode>()
		.unwrap()
		.text
		.borrow()
		.clone()
}

/// Scanner returning a canned set of nodes, standing in for the template
/// layer.
struct StaticScanner {
	nodes: Vec<(NodeRef, Vec<Declaration>)>,
}

impl StaticScanner {
	fn new(nodes: Vec<(NodeRef, Vec<Declaration>)>) -> Rc<Self> {
		Rc::new(StaticScanner { nodes })
	}
}

impl Scanner for StaticScanner {
	fn scan(&self, _root: &NodeRef) -> Vec<ScannedNode> {
		self.nodes
			.iter()
			.map(|(node, bindings)| ScannedNode {
				node: node.clone(),
				bindings: bindings.clone(),
			})
			.collect()
	}
}

/// Resolver treating expressions as model map keys.
struct PathResolver;

impl Resolver for PathResolver {
	fn resolve(&self, expression: &str, context: &Rc<BindingContext>) -> Dynamic {
		context.model().entry(expression).unwrap_or(Dynamic::Null)
	}
}

fn decl(handler: &str, expression: &str) -> Declaration {
	Declaration {
		handler: handler.to_owned(),
		expression: expression.to_owned(),
	}
}

type Log = Rc<RefCell<Vec<String>>>;

fn logging_handler(log: &Log, name: &'static str) -> BindingHandler {
	BindingHandler::new()
		.initialize({
			let log = log.clone();
			move |_, _, _| {
				log.borrow_mut().push(format!("init:{name}"));
				Ok(true)
			}
		})
		.update({
			let log = log.clone();
			move |_, _, _| {
				log.borrow_mut().push(format!("update:{name}"));
				Ok(())
			}
		})
		.cleanup({
			let log = log.clone();
			move |_| log.borrow_mut().push(format!("cleanup:{name}"))
		})
}

fn model_with_name(value: &str) -> (Dynamic, Var<Dynamic>) {
	let cell = observable(Dynamic::str(value));
	let model = Dynamic::map([("name".to_owned(), Dynamic::Cell(cell.clone()))]);
	(model, cell)
}

#[test]
fn initialize_runs_in_dependency_order() {
	let registry = Rc::new(Registry::new());
	let log: Log = Default::default();

	registry
		.register("a", logging_handler(&log, "a"), &[], false)
		.unwrap();
	registry
		.register("b", logging_handler(&log, "b"), &["a"], false)
		.unwrap();

	let root = node("root");
	// Declared out of order on purpose.
	let scanner = StaticScanner::new(vec![(
		root.clone(),
		vec![decl("b", "name"), decl("a", "name")],
	)]);
	let binder = Binder::with_registry(scanner, Rc::new(PathResolver), registry);

	let (model, _cell) = model_with_name("x");
	let report = binder.bind_model(model, &root).unwrap();
	assert!(report.is_clean());

	assert_eq!(
		*log.borrow(),
		vec!["init:a", "init:b", "update:a", "update:b"]
	);
}

#[test]
fn update_tracks_the_resolved_expression() {
	let registry = Rc::new(Registry::new());
	registry
		.register(
			"text",
			BindingHandler::new().update(|value, node, _| {
				let target = node.as_any().downcast_ref::<TestNode>().unwrap();
				*target.text.borrow_mut() =
					value.as_str().map(|s| s.to_string()).unwrap_or_default();
				Ok(())
			}),
			&[],
			false,
		)
		.unwrap();

	let root = node("root");
	let scanner = StaticScanner::new(vec![(root.clone(), vec![decl("text", "name")])]);
	let binder = Binder::with_registry(scanner, Rc::new(PathResolver), registry);

	let (model, cell) = model_with_name("hello");
	binder.bind_model(model, &root).unwrap();
	assert_eq!(text_of(&root), "hello");

	cell.set(Dynamic::str("world"));
	assert_eq!(text_of(&root), "world");
}

#[test]
fn bind_unbind_is_a_full_round_trip() {
	let registry = Rc::new(Registry::new());
	let log: Log = Default::default();
	registry
		.register("watch", logging_handler(&log, "watch"), &[], false)
		.unwrap();

	let root = node("root");
	let scanner = StaticScanner::new(vec![(root.clone(), vec![decl("watch", "name")])]);
	let binder = Binder::with_registry(scanner, Rc::new(PathResolver), registry);

	let (model, cell) = model_with_name("first");
	binder.bind_model(model.clone(), &root).unwrap();
	assert!(cell.is_bound());

	cell.set(Dynamic::str("second"));
	let updates_before = log.borrow().len();

	assert!(binder.unbind_model(&model));
	assert!(!cell.is_bound());
	assert_eq!(log.borrow().last().unwrap(), "cleanup:watch");

	// Writes after unbind reach no handler.
	cell.set(Dynamic::str("third"));
	assert_eq!(log.borrow().len(), updates_before + 1);

	assert!(!binder.unbind_model(&model));
}

#[test]
fn rebinding_is_idempotent_for_the_same_model_only() {
	let registry = Rc::new(Registry::new());
	let log: Log = Default::default();
	registry
		.register("watch", logging_handler(&log, "watch"), &[], false)
		.unwrap();

	let root = node("root");
	let scanner = StaticScanner::new(vec![(root.clone(), vec![decl("watch", "name")])]);
	let binder = Binder::with_registry(scanner, Rc::new(PathResolver), registry);

	let (model, _cell) = model_with_name("x");
	binder.bind_model(model.clone(), &root).unwrap();
	let entries = log.borrow().len();

	// Same model: a no-op, nothing initializes twice.
	binder.bind_model(model.clone(), &root).unwrap();
	assert_eq!(log.borrow().len(), entries);

	let (other, _) = model_with_name("y");
	assert_eq!(
		binder.bind_model(other, &root).unwrap_err(),
		BindError::AlreadyBound
	);
}

#[test]
fn unknown_handlers_fail_before_anything_runs() {
	let registry = Rc::new(Registry::new());
	let log: Log = Default::default();
	// `foo` itself is registered, but depends on an unregistered handler.
	registry
		.register("foo", logging_handler(&log, "foo"), &["bar"], false)
		.unwrap();

	let root = node("root");
	let scanner = StaticScanner::new(vec![(root.clone(), vec![decl("foo", "name")])]);
	let binder = Binder::with_registry(scanner, Rc::new(PathResolver), registry);

	let (model, _cell) = model_with_name("x");
	assert_eq!(
		binder.bind_model(model.clone(), &root).unwrap_err(),
		BindError::UnknownHandler("bar".to_owned())
	);
	assert!(log.borrow().is_empty());

	// A declaration naming an unregistered handler fails the same way.
	let root2 = node("root2");
	let scanner2 = StaticScanner::new(vec![(root2.clone(), vec![decl("nope", "name")])]);
	let binder2 = Binder::with_registry(scanner2, Rc::new(PathResolver), Rc::new(Registry::new()));
	assert_eq!(
		binder2.bind_model(model, &root2).unwrap_err(),
		BindError::UnknownHandler("nope".to_owned())
	);
}

#[test]
fn handler_cycles_fail_fast() {
	let registry = Rc::new(Registry::new());
	let log: Log = Default::default();
	registry
		.register("x", logging_handler(&log, "x"), &["y"], false)
		.unwrap();
	registry
		.register("y", logging_handler(&log, "y"), &["x"], false)
		.unwrap();

	let root = node("root");
	let scanner = StaticScanner::new(vec![(
		root.clone(),
		vec![decl("x", "name"), decl("y", "name")],
	)]);
	let binder = Binder::with_registry(scanner, Rc::new(PathResolver), registry);

	let (model, _cell) = model_with_name("x");
	assert_eq!(
		binder.bind_model(model, &root).unwrap_err(),
		BindError::HandlerCycle(vec!["x".to_owned(), "y".to_owned()])
	);
	assert!(log.borrow().is_empty());
}

#[test]
fn duplicate_registration_requires_replace() {
	let registry = Registry::new();
	registry
		.register("dup", BindingHandler::new(), &[], false)
		.unwrap();

	assert_eq!(
		registry.register("dup", BindingHandler::new(), &[], false),
		Err(RegistryError::Duplicate {
			name: "dup".to_owned()
		})
	);

	registry
		.register("dup", BindingHandler::new(), &[], true)
		.unwrap();
	assert!(registry.is_registered("dup"));

	assert!(registry.unregister("dup"));
	assert!(!registry.unregister("dup"));
}

#[test]
fn initialize_false_declines_updates_without_blocking_dependents() {
	let registry = Rc::new(Registry::new());
	let log: Log = Default::default();

	registry
		.register(
			"quiet",
			BindingHandler::new()
				.initialize({
					let log = log.clone();
					move |_, _, _| {
						log.borrow_mut().push("init:quiet".to_owned());
						Ok(false)
					}
				})
				.update({
					let log = log.clone();
					move |_, _, _| {
						log.borrow_mut().push("update:quiet".to_owned());
						Ok(())
					}
				}),
			&[],
			false,
		)
		.unwrap();
	registry
		.register("loud", logging_handler(&log, "loud"), &["quiet"], false)
		.unwrap();

	let root = node("root");
	let scanner = StaticScanner::new(vec![(
		root.clone(),
		vec![decl("quiet", "name"), decl("loud", "name")],
	)]);
	let binder = Binder::with_registry(scanner, Rc::new(PathResolver), registry);

	let (model, cell) = model_with_name("x");
	binder.bind_model(model, &root).unwrap();
	assert_eq!(*log.borrow(), vec!["init:quiet", "init:loud", "update:loud"]);

	// Changes keep reaching `loud`; `quiet` stays declined.
	cell.set(Dynamic::str("y"));
	assert_eq!(log.borrow().last().unwrap(), "update:loud");
	assert!(!log.borrow().iter().any(|entry| entry == "update:quiet"));
}

#[test]
fn node_failures_are_isolated_and_reported() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();

	let registry = Rc::new(Registry::new());
	let log: Log = Default::default();

	registry
		.register(
			"bad",
			BindingHandler::new().initialize(|_, _, _| Err("boom".into())),
			&[],
			false,
		)
		.unwrap();
	registry
		.register("never", logging_handler(&log, "never"), &["bad"], false)
		.unwrap();
	registry
		.register("good", logging_handler(&log, "good"), &[], false)
		.unwrap();

	let failing = node("failing");
	let healthy = node("healthy");
	let scanner = StaticScanner::new(vec![
		(
			failing.clone(),
			vec![decl("bad", "name"), decl("never", "name")],
		),
		(healthy.clone(), vec![decl("good", "name")]),
	]);
	let binder = Binder::with_registry(scanner, Rc::new(PathResolver), registry);

	let (model, cell) = model_with_name("x");
	let report = binder.bind_model(model, &failing).unwrap();

	assert_eq!(report.failures.len(), 1);
	assert_eq!(report.failures[0].handler, "bad");

	// The failing node skipped its remaining handlers; the healthy node
	// bound and keeps updating.
	assert!(!log.borrow().iter().any(|entry| entry == "init:never"));
	assert!(log.borrow().iter().any(|entry| entry == "init:good"));

	cell.set(Dynamic::str("y"));
	assert_eq!(log.borrow().last().unwrap(), "update:good");
}

#[test]
fn cleanup_runs_in_reverse_dependency_order() {
	let registry = Rc::new(Registry::new());
	let log: Log = Default::default();

	registry
		.register("a", logging_handler(&log, "a"), &[], false)
		.unwrap();
	registry
		.register("b", logging_handler(&log, "b"), &["a"], false)
		.unwrap();

	let root = node("root");
	let scanner = StaticScanner::new(vec![(
		root.clone(),
		vec![decl("a", "name"), decl("b", "name")],
	)]);
	let binder = Binder::with_registry(scanner, Rc::new(PathResolver), registry);

	let (model, _cell) = model_with_name("x");
	binder.bind_model(model.clone(), &root).unwrap();

	log.borrow_mut().clear();
	binder.unbind_model(&model);
	assert_eq!(*log.borrow(), vec!["cleanup:b", "cleanup:a"]);
}

#[test]
fn a_completed_bind_is_announced_on_the_bus() {
	let registry = Rc::new(Registry::new());
	registry
		.register("noop", BindingHandler::new(), &[], false)
		.unwrap();

	let announced = Rc::new(RefCell::new(false));
	events::once(BINDING_COMPLETE, {
		let announced = announced.clone();
		move |_| *announced.borrow_mut() = true
	});

	let root = node("root");
	let scanner = StaticScanner::new(vec![(root.clone(), vec![decl("noop", "name")])]);
	let binder = Binder::with_registry(scanner, Rc::new(PathResolver), registry);

	let (model, _cell) = model_with_name("x");
	binder.bind_model(model, &root).unwrap();
	assert!(*announced.borrow());
}

#[test]
fn contexts_chain_to_the_root() {
	let (root_model, _) = model_with_name("root");
	let item_model = Dynamic::map([("name".to_owned(), Dynamic::str("item"))]);

	let root = BindingContext::root(root_model.clone());
	let child = root.child(item_model.clone());

	assert_eq!(child.model(), &item_model);
	assert_eq!(child.parent().unwrap().model(), &root_model);
	assert_eq!(child.root_context().model(), &root_model);
	assert!(root.parent().is_none());
}

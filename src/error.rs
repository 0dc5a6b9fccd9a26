use thiserror::Error;

/// Failures of structural [`List`] operations.
///
/// [`List`]: crate::List
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ListError {
	#[error("cannot pop from an empty list")]
	Empty,
}

/// Failures of binding-handler registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
	#[error("binding handler `{name}` is already registered")]
	Duplicate { name: String },
}

/// Configuration failures surfaced by [`Binder::bind_model`]. These
/// indicate a programming or template error and abort the bind before any
/// handler runs; per-node initialization failures are reported through
/// [`BindReport`] instead.
///
/// [`Binder::bind_model`]: crate::Binder::bind_model
/// [`BindReport`]: crate::BindReport
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindError {
	#[error("node is already bound to a different model")]
	AlreadyBound,
	#[error("binding handler `{0}` is not registered")]
	UnknownHandler(String),
	#[error("binding handlers form a dependency cycle: {}", .0.join(" -> "))]
	HandlerCycle(Vec<String>),
}

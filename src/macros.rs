pub use enclose::*;

/// Constructs a [`Computed`] from an expression, optionally clone-capturing
/// the listed handles first:
///
/// ```ignore
/// let doubled = computed!((n) => *n.get() * 2);
/// ```
///
/// [`Computed`]: crate::Computed
#[macro_export]
macro_rules! computed {
	(( $($d_tt:tt)* ) => $($b:tt)*) => {
		$crate::Computed::new($crate::macros::enclose!(($( $d_tt )*) Box::new(move || { $($b)* })))
	};
	($($b:tt)*) => {
		$crate::Computed::new(Box::new(move || { $($b)* }))
	};
}

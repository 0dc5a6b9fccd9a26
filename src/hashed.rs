use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Deref;

/// A value paired with its `fxhash` fingerprint. The fingerprint backs the
/// default change short-circuit: a write producing the same fingerprint
/// notifies nobody.
pub struct Hashed<T> {
	pub value: T,
	pub hash: u64,
}

impl<T> Hashed<T> {
	pub fn new(value: T) -> Self
	where
		T: Hash,
	{
		let hash = fxhash::hash64(&value);
		Self { value, hash }
	}

	/// Recompute the fingerprint after an in-place mutation.
	pub fn rehash(&mut self)
	where
		T: Hash,
	{
		self.hash = fxhash::hash64(&self.value);
	}
}

impl<T> Deref for Hashed<T> {
	type Target = T;
	fn deref(&self) -> &Self::Target {
		&self.value
	}
}

impl<T> Debug for Hashed<T>
where
	T: Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.value.fmt(f)
	}
}

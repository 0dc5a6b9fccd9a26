use std::cmp::Ordering;
use std::ops::Deref;
use std::rc::{Rc, Weak};

/// A strong handle ordered by the address of its allocation. The address is
/// captured at construction so ordering never touches vtable metadata.
pub(crate) struct RcRef<T: ?Sized> {
	ptr: Rc<T>,
	addr: usize,
}

impl<T: ?Sized> RcRef<T> {
	pub fn new(ptr: Rc<T>) -> Self {
		let addr = Rc::as_ptr(&ptr).cast::<()>() as usize;
		RcRef { ptr, addr }
	}
}

impl<T: ?Sized> Clone for RcRef<T> {
	fn clone(&self) -> Self {
		RcRef {
			ptr: self.ptr.clone(),
			addr: self.addr,
		}
	}
}

impl<T: ?Sized> Deref for RcRef<T> {
	type Target = Rc<T>;
	fn deref(&self) -> &Self::Target {
		&self.ptr
	}
}

impl<T: ?Sized> PartialEq for RcRef<T> {
	fn eq(&self, other: &Self) -> bool {
		self.addr == other.addr
	}
}

impl<T: ?Sized> Eq for RcRef<T> {}

impl<T: ?Sized> Ord for RcRef<T> {
	fn cmp(&self, other: &Self) -> Ordering {
		self.addr.cmp(&other.addr)
	}
}

impl<T: ?Sized> PartialOrd for RcRef<T> {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

/// Weak counterpart of [`RcRef`]. The captured address stays valid for
/// ordering and removal even once the referent has been dropped.
pub(crate) struct WeakRef<T: ?Sized> {
	ptr: Weak<T>,
	addr: usize,
}

impl<T: ?Sized> WeakRef<T> {
	pub fn new(ptr: Weak<T>) -> Self {
		let addr = ptr.as_ptr().cast::<()>() as usize;
		WeakRef { ptr, addr }
	}
}

impl<T: ?Sized> Clone for WeakRef<T> {
	fn clone(&self) -> Self {
		WeakRef {
			ptr: self.ptr.clone(),
			addr: self.addr,
		}
	}
}

impl<T: ?Sized> Deref for WeakRef<T> {
	type Target = Weak<T>;
	fn deref(&self) -> &Self::Target {
		&self.ptr
	}
}

impl<T: ?Sized> PartialEq for WeakRef<T> {
	fn eq(&self, other: &Self) -> bool {
		self.addr == other.addr
	}
}

impl<T: ?Sized> Eq for WeakRef<T> {}

impl<T: ?Sized> Ord for WeakRef<T> {
	fn cmp(&self, other: &Self) -> Ordering {
		self.addr.cmp(&other.addr)
	}
}

impl<T: ?Sized> PartialOrd for WeakRef<T> {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

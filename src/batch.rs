use std::cell::{Cell, RefCell};
use std::rc::Rc;

// One deferred-notification window per thread. Values mutate immediately
// inside a window; only notifications queue, one entry per cell, drained
// when the outermost `batch` closes.
thread_local! {
	static OPEN: Cell<bool> = const { Cell::new(false) };
	static QUEUE: RefCell<Vec<(usize, Rc<dyn Flush>)>> = const { RefCell::new(Vec::new()) };
}

/// A cell with a deferred notification pending.
pub(crate) trait Flush {
	fn flush(&self);
}

/// True while a batched-write window is open.
pub fn in_batch() -> bool {
	OPEN.with(|open| open.get())
}

/// Runs `func` inside a batched-write window. Writes still take effect
/// immediately, but change notifications and dependent re-evaluation are
/// queued, deduplicated per cell, and delivered when the outermost window
/// closes. A cell whose final value equals its pre-batch value notifies
/// nobody. Nested calls coalesce into the outermost window.
pub fn batch<R>(func: impl FnOnce() -> R) -> R {
	if in_batch() {
		return func();
	}

	OPEN.with(|open| open.set(true));
	let guard = CloseGuard;
	let result = func();
	drop(guard);

	drain();
	result
}

struct CloseGuard;

impl Drop for CloseGuard {
	fn drop(&mut self) {
		OPEN.with(|open| open.set(false));
	}
}

/// Queues a pending flush unless this cell is already queued.
pub(crate) fn enqueue(cell: Rc<dyn Flush>) {
	let addr = Rc::as_ptr(&cell).cast::<()>() as usize;
	QUEUE.with(|queue| {
		let mut queue = queue.borrow_mut();
		if !queue.iter().any(|(queued, _)| *queued == addr) {
			queue.push((addr, cell));
		}
	});
}

fn drain() {
	loop {
		let pending = QUEUE.with(|queue| std::mem::take(&mut *queue.borrow_mut()));
		if pending.is_empty() {
			break;
		}

		tracing::trace!(cells = pending.len(), "draining batched notifications");
		for (_, cell) in pending {
			cell.flush();
		}
	}
}

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::dependencies::DependencySet;
use crate::{Dependent, Observable};

// The "currently evaluating" state: a strictly nested stack of frames, one
// per computed evaluation in flight. Single-threaded by design, so the
// stack lives in a thread local.
thread_local! {
	static STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

struct Frame {
	dependent: Weak<dyn Dependent>,
	recorded: DependencySet,
}

/// Scope guard for one evaluation frame. Opening pushes the frame;
/// dropping the guard pops it again, so a panicking evaluator unwinds the
/// stack correctly. Recorded edges are subscribed only by [`finish`] —
/// an abandoned frame leaves the graph untouched.
///
/// [`finish`]: FrameGuard::finish
pub(crate) struct FrameGuard {
	finished: bool,
}

impl FrameGuard {
	pub fn open(dependent: Weak<dyn Dependent>) -> FrameGuard {
		STACK.with(|stack| {
			stack.borrow_mut().push(Frame {
				dependent,
				recorded: DependencySet::new(),
			})
		});
		FrameGuard { finished: false }
	}

	/// Closes the frame and returns the dependencies its evaluation read.
	pub fn finish(mut self) -> DependencySet {
		self.finished = true;
		let frame = STACK
			.with(|stack| stack.borrow_mut().pop())
			.expect("tracking frames are strictly nested");
		frame.recorded
	}
}

impl Drop for FrameGuard {
	fn drop(&mut self) {
		if !self.finished {
			STACK.with(|stack| stack.borrow_mut().pop());
		}
	}
}

/// True while some computed evaluation is in flight. Readers use this to
/// skip the type-erased handle clone on untracked reads.
pub(crate) fn active() -> bool {
	STACK.with(|stack| !stack.borrow().is_empty())
}

/// True while `dependent` has an evaluation frame somewhere on the stack.
/// Guards against an evaluator re-entering itself through its own reads.
pub(crate) fn evaluating(dependent: &Weak<dyn Dependent>) -> bool {
	let addr = dependent.as_ptr().cast::<()>() as usize;
	STACK.with(|stack| {
		stack
			.borrow()
			.iter()
			.any(|frame| frame.dependent.as_ptr().cast::<()>() as usize == addr)
	})
}

/// Records `source` as a dependency of the innermost evaluation.
/// Re-recording an already recorded source is a no-op. Outside any frame
/// this does nothing.
pub(crate) fn record(source: Rc<dyn Observable>) {
	STACK.with(|stack| {
		if let Some(frame) = stack.borrow_mut().last_mut() {
			frame.recorded.insert(source);
		}
	});
}

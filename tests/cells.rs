use std::cell::RefCell;
use std::rc::Rc;

use bindery::{observable, Event};

use crate::mock::{SharedMock, Spy};

#[test]
fn reads_last_written_value() {
	let n = observable(10i64);
	assert_eq!(*n.get(), 10);

	n.set(20);
	assert_eq!(*n.get(), 20);
	assert_eq!(*n.peek(), 20);
}

#[test]
fn equal_write_fires_no_change() {
	let n = observable(10i64);
	let mock = SharedMock::new();

	n.on(Event::Change, {
		let mock = mock.clone();
		move |value| mock.get().trigger(*value)
	});

	mock.get().expect_trigger().times(0).return_const(());
	n.set(10);
	mock.get().checkpoint();

	mock.get().expect_trigger().times(1).return_const(());
	n.set(20);
	mock.get().checkpoint();
}

#[test]
fn before_change_carries_outgoing_value() {
	let n = observable(1i64);
	let log: Rc<RefCell<Vec<(&'static str, i64)>>> = Rc::new(RefCell::new(Vec::new()));

	n.on(Event::BeforeChange, {
		let log = log.clone();
		move |value| log.borrow_mut().push(("before", *value))
	});
	n.on(Event::Change, {
		let log = log.clone();
		move |value| log.borrow_mut().push(("change", *value))
	});

	n.set(5);
	assert_eq!(*log.borrow(), vec![("before", 1), ("change", 5)]);
}

#[test]
fn subscribers_fire_in_subscription_order() {
	let n = observable(0i64);
	let log: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));

	for tag in 1..=3u8 {
		n.on(Event::Change, {
			let log = log.clone();
			move |_| log.borrow_mut().push(tag)
		});
	}

	n.set(1);
	assert_eq!(*log.borrow(), vec![1, 2, 3]);
}

#[test]
fn unsubscribe_stops_delivery() {
	let n = observable(0i64);
	let mock = SharedMock::new();

	let subscription = n.on(Event::Change, {
		let mock = mock.clone();
		move |value| mock.get().trigger(*value)
	});

	mock.get().expect_trigger().times(1).return_const(());
	n.set(1);
	mock.get().checkpoint();

	assert!(n.off(&subscription));
	assert!(!n.off(&subscription));

	mock.get().expect_trigger().times(0).return_const(());
	n.set(2);
	mock.get().checkpoint();
}

#[test]
fn custom_equality_overrides_fingerprint() {
	let n = observable(10i64);
	n.set_equality(|a, b| a % 10 == b % 10);

	let mock = SharedMock::new();
	n.on(Event::Change, {
		let mock = mock.clone();
		move |value| mock.get().trigger(*value)
	});

	mock.get().expect_trigger().times(0).return_const(());
	n.set(20);
	mock.get().checkpoint();

	mock.get().expect_trigger().times(1).return_const(());
	n.set(11);
	mock.get().checkpoint();
}

#[test]
fn reentrant_write_converges() {
	let n = observable(0i64);

	n.on(Event::Change, {
		let n = n.clone();
		move |value| {
			if *value < 3 {
				n.set(*value + 1);
			}
		}
	});

	n.set(1);
	assert_eq!(*n.peek(), 3);
}

#[test]
fn replace_returns_previous_value() {
	let n = observable(1i64);
	assert_eq!(n.replace(2), 1);
	assert_eq!(*n.peek(), 2);
}

#[test]
fn update_mutates_in_place() {
	let words = observable(String::from("left"));
	let mock = SharedMock::new();

	words.on(Event::Change, {
		let mock = mock.clone();
		move |value| mock.get().trigger(value.len() as i64)
	});

	mock.get().expect_trigger().times(1).return_const(());
	words.update(|value| value.push_str("-right"));
	mock.get().checkpoint();

	assert_eq!(*words.peek(), "left-right");

	// A mutation that leaves the value untouched notifies nobody.
	mock.get().expect_trigger().times(0).return_const(());
	words.update(|_| {});
	mock.get().checkpoint();
}

#[test]
fn toggle_flips_booleans() {
	let flag = observable(false);
	flag.toggle();
	assert!(*flag.peek());
}

#[test]
fn unbound_by_default() {
	let n = observable(1i64);
	assert!(!n.is_bound());
}

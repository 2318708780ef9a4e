use std::sync::Arc;

use parking_lot::Mutex;

use super::{Device, Inert, probe_service, ranked};
use crate::core::Properties;
use crate::events::ServiceEventKind;
use crate::framework::Framework;

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
	Arc::new(Mutex::new(Vec::new()))
}

#[test]
fn listeners_run_in_subscription_order() {
	let framework = Framework::new();
	let ctx = framework.context();
	let seen = log();
	for label in ["first", "second", "third"] {
		let seen = seen.clone();
		ctx.add_service_listener(None, move |event| {
			seen.lock().push(format!("{label}:{:?}", event.kind));
		})
		.unwrap();
	}

	let reg = ctx.register_service(probe_service("x"), Properties::new()).unwrap();
	reg.unregister().unwrap();

	assert_eq!(
		seen.lock().as_slice(),
		[
			"first:Registered",
			"second:Registered",
			"third:Registered",
			"first:Unregistering",
			"second:Unregistering",
			"third:Unregistering",
		]
	);
}

#[test]
fn unregistering_listeners_can_still_resolve_the_service() {
	let framework = Framework::new();
	let ctx = framework.context();
	let resolved = log();
	{
		let ctx = ctx.clone();
		let resolved = resolved.clone();
		ctx.clone()
			.add_service_listener(None, move |event| {
				if event.kind == ServiceEventKind::Unregistering {
					let obj = ctx.get_service::<dyn Device>(&event.reference).unwrap().unwrap();
					resolved.lock().push(obj.kind().to_string());
				}
			})
			.unwrap();
	}

	let reg = ctx.register_service(probe_service("teardown"), Properties::new()).unwrap();
	reg.unregister().unwrap();
	assert_eq!(resolved.lock().as_slice(), ["teardown"]);
}

#[test]
fn listener_filters_select_events() {
	let framework = Framework::new();
	let ctx = framework.context();
	let seen = log();
	{
		let seen = seen.clone();
		ctx.add_service_listener(Some("(category=io)"), move |event| {
			seen.lock().push(format!("{:?}", event.kind));
		})
		.unwrap();
	}

	ctx.register_service(probe_service("net"), Properties::new().with("category", "net")).unwrap();
	let io = ctx.register_service(probe_service("io"), Properties::new().with("category", "io")).unwrap();
	// Re-ranking keeps the category; the listener sees the modification.
	io.set_properties(ranked(4).with("category", "io")).unwrap();

	assert_eq!(seen.lock().as_slice(), ["Registered", "Modified"]);
}

#[test]
fn one_panicking_listener_does_not_stop_delivery() {
	let framework = Framework::new();
	let ctx = framework.context();
	let seen = log();
	ctx.add_service_listener(None, |_| panic!("broken listener")).unwrap();
	{
		let seen = seen.clone();
		ctx.add_service_listener(None, move |event| {
			seen.lock().push(format!("{:?}", event.kind));
		})
		.unwrap();
	}

	ctx.register_service(probe_service("x"), Properties::new()).unwrap();
	assert_eq!(seen.lock().as_slice(), ["Registered"]);
}

#[test]
fn listeners_added_during_dispatch_start_with_the_next_event() {
	let framework = Framework::new();
	let ctx = framework.context();
	let seen = log();
	{
		let ctx = ctx.clone();
		let seen = seen.clone();
		ctx.clone()
			.add_service_listener(None, move |_| {
				let seen = seen.clone();
				let mut first = seen.lock();
				if first.is_empty() {
					first.push("outer".to_string());
					drop(first);
					let seen = seen.clone();
					ctx.add_service_listener(None, move |event| {
						seen.lock().push(format!("inner:{:?}", event.kind));
					})
					.unwrap();
				}
			})
			.unwrap();
	}

	ctx.register_service(probe_service("a"), Properties::new()).unwrap();
	assert_eq!(seen.lock().as_slice(), ["outer"], "the listener added mid-dispatch must not see the current event");

	ctx.register_service(probe_service("b"), Properties::new()).unwrap();
	assert_eq!(seen.lock().last().map(String::as_str), Some("inner:Registered"));
}

#[test]
fn removed_listeners_stay_silent() {
	let framework = Framework::new();
	let ctx = framework.context();
	let seen = log();
	let token = {
		let seen = seen.clone();
		ctx.add_service_listener(None, move |_| seen.lock().push("hit".into())).unwrap()
	};

	ctx.register_service(probe_service("a"), Properties::new()).unwrap();
	assert!(ctx.remove_service_listener(token));
	assert!(!ctx.remove_service_listener(token), "second removal is a no-op");
	ctx.register_service(probe_service("b"), Properties::new()).unwrap();

	assert_eq!(seen.lock().len(), 1);
}

#[test]
fn module_lifecycle_event_order() {
	let framework = Framework::new();
	let ctx = framework.context();
	let seen = log();
	{
		let seen = seen.clone();
		ctx.add_module_listener(move |event| {
			seen.lock().push(format!("{:?}:{}", event.kind, event.module.name()));
		})
		.unwrap();
	}

	let id = framework.install("imaging", "2.1", Box::new(Inert)).unwrap();
	framework.uninstall(id).unwrap();

	assert_eq!(
		seen.lock().as_slice(),
		["Loaded:imaging", "Unloading:imaging", "Unloaded:imaging"]
	);
}

use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier};

use super::{CountingFactory, Device, Inert, probe_service};
use crate::core::{InterfaceMap, Properties, ServiceError, interface_id};
use crate::factory::ServiceFactory;
use crate::framework::Framework;
use crate::interface_ids;
use crate::module::Module;
use crate::registration::ServiceRegistration;

#[test]
fn scoped_objects_are_per_consumer_module() {
	let framework = Framework::new();
	let provider = framework.context();
	let factory = CountingFactory::new();
	provider
		.register_factory(&interface_ids![dyn Device], factory.clone(), Properties::new())
		.unwrap();

	let m1 = framework.install("consumer-one", "1.0", Box::new(Inert)).unwrap();
	let m2 = framework.install("consumer-two", "1.0", Box::new(Inert)).unwrap();
	let c1 = framework.module_context(m1).unwrap();
	let c2 = framework.module_context(m2).unwrap();

	let reference = c1.get_service_reference_for::<dyn Device>().unwrap().unwrap();
	let first = c1.get_service::<dyn Device>(&reference).unwrap().unwrap();
	let again = c1.get_service::<dyn Device>(&reference).unwrap().unwrap();
	let other = c2.get_service::<dyn Device>(&reference).unwrap().unwrap();

	assert!(Arc::ptr_eq(&first, &again), "same consumer sees the same cached object");
	assert!(!Arc::ptr_eq(&first, &other), "different consumers get independent objects");
	assert_eq!(factory.created.load(Ordering::SeqCst), 2);
}

#[test]
fn use_count_gates_the_unget_callback() {
	let framework = Framework::new();
	let ctx = framework.context();
	let factory = CountingFactory::new();
	ctx.register_factory(&interface_ids![dyn Device], factory.clone(), Properties::new()).unwrap();

	let reference = ctx.get_service_reference_for::<dyn Device>().unwrap().unwrap();
	let _one = ctx.get_service::<dyn Device>(&reference).unwrap().unwrap();
	let _two = ctx.get_service::<dyn Device>(&reference).unwrap().unwrap();
	assert_eq!(factory.created.load(Ordering::SeqCst), 1);

	assert!(ctx.unget_service(&reference).unwrap());
	assert_eq!(factory.released.load(Ordering::SeqCst), 0, "one use is still outstanding");

	assert!(ctx.unget_service(&reference).unwrap());
	assert_eq!(factory.released.load(Ordering::SeqCst), 1);

	assert!(!ctx.unget_service(&reference).unwrap(), "nothing left to release");
	assert_eq!(factory.released.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_first_access_invokes_the_factory_once() {
	const THREADS: usize = 8;

	struct SlowFactory(CountingFactory);

	impl ServiceFactory for SlowFactory {
		fn get_service(&self, module: &Module, registration: &ServiceRegistration) -> Result<InterfaceMap, ServiceError> {
			std::thread::sleep(std::time::Duration::from_millis(20));
			self.0.get_service(module, registration)
		}

		fn unget_service(&self, module: &Module, registration: &ServiceRegistration, service: &InterfaceMap) {
			self.0.unget_service(module, registration, service);
		}
	}

	let framework = Framework::new();
	let ctx = framework.context();
	let factory = Arc::new(SlowFactory(CountingFactory {
		created: std::sync::atomic::AtomicUsize::new(0),
		released: std::sync::atomic::AtomicUsize::new(0),
		released_for: parking_lot::Mutex::new(Vec::new()),
	}));
	ctx.register_factory(&interface_ids![dyn Device], factory.clone(), Properties::new()).unwrap();
	let reference = ctx.get_service_reference_for::<dyn Device>().unwrap().unwrap();

	let barrier = Barrier::new(THREADS);
	let objects = std::thread::scope(|scope| {
		let handles: Vec<_> = (0..THREADS)
			.map(|_| {
				let ctx = ctx.clone();
				let reference = reference.clone();
				let barrier = &barrier;
				scope.spawn(move || {
					barrier.wait();
					ctx.get_service::<dyn Device>(&reference).unwrap().unwrap()
				})
			})
			.collect();
		handles.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>()
	});

	assert_eq!(factory.0.created.load(Ordering::SeqCst), 1, "factory must run exactly once per pair");
	for obj in &objects[1..] {
		assert!(Arc::ptr_eq(&objects[0], obj));
	}
}

#[test]
fn factory_failure_surfaces_and_leaves_registration_live() {
	struct FlakyFactory {
		fail_first: std::sync::atomic::AtomicBool,
	}

	impl ServiceFactory for FlakyFactory {
		fn get_service(&self, _module: &Module, _registration: &ServiceRegistration) -> Result<InterfaceMap, ServiceError> {
			if self.fail_first.swap(false, Ordering::SeqCst) {
				return Err(ServiceError::Other("backing store offline".into()));
			}
			Ok(probe_service("recovered"))
		}

		fn unget_service(&self, _module: &Module, _registration: &ServiceRegistration, _service: &InterfaceMap) {}
	}

	let framework = Framework::new();
	let ctx = framework.context();
	let factory = Arc::new(FlakyFactory { fail_first: std::sync::atomic::AtomicBool::new(true) });
	ctx.register_factory(&interface_ids![dyn Device], factory, Properties::new()).unwrap();
	let reference = ctx.get_service_reference_for::<dyn Device>().unwrap().unwrap();

	assert!(matches!(ctx.get_service::<dyn Device>(&reference), Err(ServiceError::Other(_))));
	assert!(reference.is_valid(), "a failing factory does not unregister the service");
	let recovered = ctx.get_service::<dyn Device>(&reference).unwrap().unwrap();
	assert_eq!(recovered.kind(), "recovered");
}

#[test]
fn missing_declared_interface_is_a_contract_violation() {
	struct Partial;

	impl ServiceFactory for Partial {
		fn get_service(&self, _module: &Module, _registration: &ServiceRegistration) -> Result<InterfaceMap, ServiceError> {
			// Declares `dyn Device` and `String`, delivers only the former.
			Ok(probe_service("partial"))
		}

		fn unget_service(&self, _module: &Module, _registration: &ServiceRegistration, _service: &InterfaceMap) {}
	}

	let framework = Framework::new();
	let ctx = framework.context();
	ctx.register_factory(&interface_ids![dyn Device, String], Arc::new(Partial), Properties::new()).unwrap();
	let reference = ctx.get_service_reference_for::<dyn Device>().unwrap().unwrap();

	let err = ctx.get_service::<dyn Device>(&reference).unwrap_err();
	assert!(matches!(err, ServiceError::FactoryContract { ref interface, .. } if interface == interface_id::<String>()));
	assert!(reference.is_valid());
}

#[test]
fn revoking_the_provider_force_releases_every_consumer() {
	let framework = Framework::new();
	let factory = CountingFactory::new();
	let factory_for_load = factory.clone();
	let provider = framework
		.install(
			"provider",
			"1.0",
			Box::new(super::WithLoad(move |ctx: &crate::context::ModuleContext| {
				ctx.register_factory(&interface_ids![dyn Device], factory_for_load.clone(), Properties::new())?;
				Ok(())
			})),
		)
		.unwrap();

	let m1 = framework.install("consumer-one", "1.0", Box::new(Inert)).unwrap();
	let m2 = framework.install("consumer-two", "1.0", Box::new(Inert)).unwrap();
	let c1 = framework.module_context(m1).unwrap();
	let c2 = framework.module_context(m2).unwrap();

	let reference = c1.get_service_reference_for::<dyn Device>().unwrap().unwrap();
	let _o1 = c1.get_service::<dyn Device>(&reference).unwrap().unwrap();
	let _o2 = c2.get_service::<dyn Device>(&reference).unwrap().unwrap();
	assert_eq!(factory.created.load(Ordering::SeqCst), 2);

	framework.uninstall(provider).unwrap();

	assert_eq!(factory.released.load(Ordering::SeqCst), 2, "both consumers must be force-released");
	let mut released = factory.released_for.lock().clone();
	released.sort();
	assert_eq!(released, vec!["consumer-one".to_string(), "consumer-two".to_string()]);

	assert!(!reference.is_valid());
	assert!(c1.get_service::<dyn Device>(&reference).unwrap().is_none());
	assert!(c2.get_service::<dyn Device>(&reference).unwrap().is_none());
}

#[test]
fn unloading_a_consumer_releases_what_it_held() {
	let framework = Framework::new();
	let provider = framework.context();
	let factory = CountingFactory::new();
	provider.register_factory(&interface_ids![dyn Device], factory.clone(), Properties::new()).unwrap();

	let consumer = framework.install("consumer", "1.0", Box::new(Inert)).unwrap();
	let ctx = framework.module_context(consumer).unwrap();
	let reference = ctx.get_service_reference_for::<dyn Device>().unwrap().unwrap();
	let _obj = ctx.get_service::<dyn Device>(&reference).unwrap().unwrap();
	assert_eq!(ctx.services_in_use(), vec![reference.id()]);

	framework.uninstall(consumer).unwrap();

	assert_eq!(factory.released.load(Ordering::SeqCst), 1);
	assert_eq!(factory.released_for.lock().as_slice(), ["consumer"]);
	assert!(reference.is_valid(), "the provider side is untouched");
}

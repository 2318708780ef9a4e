use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Returns the interface identifier for a type.
///
/// The id is derived from the type's path and is deterministic within a
/// build. Two distinct types mapping to the same id shadow each other
/// silently; callers own that risk.
pub fn interface_id<T: ?Sized>() -> &'static str {
	core::any::type_name::<T>()
}

/// Expands to an array of interface ids, for declaring the interface set of
/// a factory registration.
#[macro_export]
macro_rules! interface_ids {
	($($ty:ty),+ $(,)?) => {
		[$($crate::interface_id::<$ty>()),+]
	};
}

type Handle = Arc<dyn Any + Send + Sync>;

/// The set of interfaces one concrete service implements, as an ordered map
/// from interface id to the published object.
///
/// Several ids may alias the same underlying object; within one map each id
/// appears at most once. Entries cannot be null by construction, so the only
/// invalid map a caller can build is an empty one.
#[derive(Clone, Default)]
pub struct InterfaceMap {
	entries: BTreeMap<Box<str>, Handle>,
}

impl InterfaceMap {
	pub fn new() -> Self {
		Self::default()
	}

	/// Single-interface map.
	pub fn of<T: ?Sized + Send + Sync + 'static>(service: Arc<T>) -> Self {
		Self::new().and::<T>(service)
	}

	/// Builder-style insertion under the id of `T`.
	///
	/// `T` is usually a trait object type: `map.and::<dyn Greeter>(arc)`.
	pub fn and<T: ?Sized + Send + Sync + 'static>(mut self, service: Arc<T>) -> Self {
		self.insert::<T>(service);
		self
	}

	pub fn insert<T: ?Sized + Send + Sync + 'static>(&mut self, service: Arc<T>) {
		self.entries.insert(Box::from(interface_id::<T>()), Arc::new(service));
	}

	/// Resolves the entry published under the id of `T`.
	pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
		self.entries.get(interface_id::<T>()).and_then(|h| h.downcast_ref::<Arc<T>>()).cloned()
	}

	pub fn contains(&self, interface: &str) -> bool {
		self.entries.contains_key(interface)
	}

	/// Interface ids in map order.
	pub fn interface_ids(&self) -> impl Iterator<Item = &str> {
		self.entries.keys().map(|k| &**k)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

impl core::fmt::Debug for InterfaceMap {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_set().entries(self.entries.keys()).finish()
	}
}

use rustc_hash::FxHashMap;

/// Property keys maintained by the framework.
pub mod keys {
	/// Registration id, pinned by the framework on every registration.
	pub const SERVICE_ID: &str = "service.id";
	/// Caller-supplied ranking used to order providers of one interface.
	pub const SERVICE_RANKING: &str = "service.ranking";
	/// Interface ids the registration publishes, pinned by the framework.
	pub const INTERFACES: &str = "interfaces";
}

/// The value of a registration property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
	/// Boolean value (true/false).
	Bool(bool),
	/// Integer value.
	Int(i64),
	/// String value.
	Str(String),
	/// List of strings; filter items match when any element matches.
	List(Vec<String>),
}

impl PropValue {
	/// Returns the boolean value if this is a `Bool` variant.
	pub fn as_bool(&self) -> Option<bool> {
		match self {
			PropValue::Bool(v) => Some(*v),
			_ => None,
		}
	}

	/// Returns the integer value if this is an `Int` variant.
	pub fn as_int(&self) -> Option<i64> {
		match self {
			PropValue::Int(v) => Some(*v),
			_ => None,
		}
	}

	/// Returns the string value if this is a `Str` variant.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			PropValue::Str(v) => Some(v),
			_ => None,
		}
	}

	/// Returns the element slice if this is a `List` variant.
	pub fn as_list(&self) -> Option<&[String]> {
		match self {
			PropValue::List(v) => Some(v),
			_ => None,
		}
	}

	/// Returns the type name of this value.
	pub fn type_name(&self) -> &'static str {
		match self {
			PropValue::Bool(_) => "bool",
			PropValue::Int(_) => "int",
			PropValue::Str(_) => "string",
			PropValue::List(_) => "list",
		}
	}
}

impl From<bool> for PropValue {
	fn from(v: bool) -> Self {
		PropValue::Bool(v)
	}
}

impl From<i64> for PropValue {
	fn from(v: i64) -> Self {
		PropValue::Int(v)
	}
}

impl From<String> for PropValue {
	fn from(v: String) -> Self {
		PropValue::Str(v)
	}
}

impl From<&str> for PropValue {
	fn from(v: &str) -> Self {
		PropValue::Str(v.to_string())
	}
}

impl From<Vec<String>> for PropValue {
	fn from(v: Vec<String>) -> Self {
		PropValue::List(v)
	}
}

/// Property bag of a service registration.
///
/// Keys are matched case-insensitively; they are folded to lowercase on
/// insertion, so iteration yields lowercase keys.
#[derive(Debug, Clone, Default)]
pub struct Properties {
	entries: FxHashMap<Box<str>, PropValue>,
}

impl Properties {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder-style insertion.
	pub fn with(mut self, key: &str, value: impl Into<PropValue>) -> Self {
		self.insert(key, value);
		self
	}

	pub fn insert(&mut self, key: &str, value: impl Into<PropValue>) {
		self.entries.insert(fold_key(key), value.into());
	}

	pub fn remove(&mut self, key: &str) -> Option<PropValue> {
		self.entries.remove(&fold_key(key))
	}

	pub fn get(&self, key: &str) -> Option<&PropValue> {
		self.entries.get(&fold_key(key))
	}

	/// The `service.ranking` property, or 0 when absent or not an integer.
	pub fn ranking(&self) -> i64 {
		self.get(keys::SERVICE_RANKING).and_then(PropValue::as_int).unwrap_or(0)
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.entries.keys().map(|k| &**k)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

fn fold_key(key: &str) -> Box<str> {
	if key.bytes().any(|b| b.is_ascii_uppercase()) {
		key.to_ascii_lowercase().into_boxed_str()
	} else {
		Box::from(key)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn keys_fold_case() {
		let mut props = Properties::new();
		props.insert("Vendor", "acme");
		assert_eq!(props.get("vendor").and_then(PropValue::as_str), Some("acme"));
		assert_eq!(props.get("VENDOR").and_then(PropValue::as_str), Some("acme"));
	}

	#[test]
	fn ranking_defaults_to_zero() {
		let props = Properties::new().with("other", 7i64);
		assert_eq!(props.ranking(), 0);
		let props = props.with(keys::SERVICE_RANKING, 12i64);
		assert_eq!(props.ranking(), 12);
	}
}

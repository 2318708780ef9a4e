//! RFC-1960 search filters over registration properties.
//!
//! Grammar: `(attr=value)` with `*` wildcards, `(attr=*)` presence,
//! `(attr>=v)` / `(attr<=v)` ordering, `(attr~=v)` approximate match, and
//! `!` / `&` / `|` composition. `\` escapes `(`, `)`, `*` and itself inside
//! values. Attribute names match case-insensitively. Syntax errors are
//! reported when the filter is built, never at match time.

use thiserror::Error;

use crate::core::properties::{PropValue, Properties};

/// Why a filter string failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FilterErrorKind {
	#[error("unexpected end of filter")]
	UnexpectedEnd,
	#[error("expected `(`")]
	ExpectedOpen,
	#[error("expected `)`")]
	ExpectedClose,
	#[error("empty attribute name")]
	EmptyAttribute,
	#[error("expected `=`, `>=`, `<=` or `~=`")]
	InvalidOperator,
	#[error("trailing input after filter")]
	TrailingInput,
	#[error("dangling escape")]
	DanglingEscape,
	#[error("empty `&`/`|` operand list")]
	EmptyCompound,
}

/// Filter parse failure with the byte offset of the offending input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("filter syntax error at byte {pos}: {kind}")]
pub struct FilterError {
	pub pos: usize,
	pub kind: FilterErrorKind,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
	And(Vec<Node>),
	Or(Vec<Node>),
	Not(Box<Node>),
	Present(Box<str>),
	Eq(Box<str>, Box<str>),
	/// Equality with wildcards; the pattern keeps the literal segments
	/// between the `*`s, including possibly-empty edge segments.
	Substr(Box<str>, Pattern),
	Approx(Box<str>, Box<str>),
	Ge(Box<str>, Box<str>),
	Le(Box<str>, Box<str>),
}

/// Wildcard pattern, split on unescaped `*`.
#[derive(Debug, Clone, PartialEq)]
struct Pattern {
	/// Literal segments; empty strings mark the pattern edges touching `*`.
	parts: Vec<Box<str>>,
}

impl Pattern {
	fn matches(&self, text: &str) -> bool {
		debug_assert!(self.parts.len() >= 2);
		let first = &self.parts[0];
		let last = &self.parts[self.parts.len() - 1];
		if !text.starts_with(&**first) || text.len() < first.len() + last.len() || !text.ends_with(&**last) {
			return false;
		}
		let mut rest = &text[first.len()..text.len() - last.len()];
		for part in &self.parts[1..self.parts.len() - 1] {
			match rest.find(&**part) {
				Some(at) => rest = &rest[at + part.len()..],
				None => return false,
			}
		}
		true
	}
}

/// A parsed, immutable service filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
	source: Box<str>,
	node: Node,
}

impl Filter {
	/// Parses `source`, rejecting malformed input up front.
	pub fn new(source: &str) -> Result<Self, FilterError> {
		let mut parser = Parser { input: source.as_bytes(), pos: 0 };
		parser.skip_ws();
		let node = parser.parse_filter()?;
		parser.skip_ws();
		if parser.pos != parser.input.len() {
			return Err(parser.err(FilterErrorKind::TrailingInput));
		}
		Ok(Self { source: Box::from(source), node })
	}

	/// Evaluates the filter against a property bag.
	pub fn matches(&self, props: &Properties) -> bool {
		eval(&self.node, props)
	}
}

impl core::fmt::Display for Filter {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.write_str(&self.source)
	}
}

fn eval(node: &Node, props: &Properties) -> bool {
	match node {
		Node::And(nodes) => nodes.iter().all(|n| eval(n, props)),
		Node::Or(nodes) => nodes.iter().any(|n| eval(n, props)),
		Node::Not(inner) => !eval(inner, props),
		Node::Present(attr) => props.get(attr).is_some(),
		Node::Eq(attr, value) => with_values(props, attr, |v| eq_value(v, value)),
		Node::Substr(attr, pattern) => with_values(props, attr, |v| match v {
			Scalar::Str(s) => pattern.matches(s),
			_ => false,
		}),
		Node::Approx(attr, value) => with_values(props, attr, |v| approx_value(v, value)),
		Node::Ge(attr, value) => with_values(props, attr, |v| ord_value(v, value).is_some_and(|o| o.is_ge())),
		Node::Le(attr, value) => with_values(props, attr, |v| ord_value(v, value).is_some_and(|o| o.is_le())),
	}
}

/// One scalar drawn from a property; list properties contribute each element.
enum Scalar<'a> {
	Bool(bool),
	Int(i64),
	Str(&'a str),
}

fn with_values(props: &Properties, attr: &str, mut pred: impl FnMut(Scalar<'_>) -> bool) -> bool {
	match props.get(attr) {
		None => false,
		Some(PropValue::Bool(b)) => pred(Scalar::Bool(*b)),
		Some(PropValue::Int(i)) => pred(Scalar::Int(*i)),
		Some(PropValue::Str(s)) => pred(Scalar::Str(s)),
		Some(PropValue::List(items)) => items.iter().any(|s| pred(Scalar::Str(s))),
	}
}

fn eq_value(scalar: Scalar<'_>, value: &str) -> bool {
	match scalar {
		Scalar::Str(s) => s == value,
		Scalar::Int(i) => value.parse::<i64>() == Ok(i),
		Scalar::Bool(b) => value.eq_ignore_ascii_case(if b { "true" } else { "false" }),
	}
}

fn approx_value(scalar: Scalar<'_>, value: &str) -> bool {
	match scalar {
		Scalar::Str(s) => s.trim().eq_ignore_ascii_case(value.trim()),
		other => eq_value(other, value),
	}
}

/// Ordering is numeric for int properties, lexicographic for strings,
/// undefined (no match) for booleans and unparsable numbers.
fn ord_value(scalar: Scalar<'_>, value: &str) -> Option<core::cmp::Ordering> {
	match scalar {
		Scalar::Int(i) => value.parse::<i64>().ok().map(|v| i.cmp(&v)),
		Scalar::Str(s) => Some(s.cmp(value)),
		Scalar::Bool(_) => None,
	}
}

struct Parser<'a> {
	input: &'a [u8],
	pos: usize,
}

impl<'a> Parser<'a> {
	fn err(&self, kind: FilterErrorKind) -> FilterError {
		FilterError { pos: self.pos, kind }
	}

	fn peek(&self) -> Option<u8> {
		self.input.get(self.pos).copied()
	}

	fn skip_ws(&mut self) {
		while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
			self.pos += 1;
		}
	}

	fn expect(&mut self, byte: u8, kind: FilterErrorKind) -> Result<(), FilterError> {
		if self.peek() == Some(byte) {
			self.pos += 1;
			Ok(())
		} else {
			Err(self.err(kind))
		}
	}

	fn parse_filter(&mut self) -> Result<Node, FilterError> {
		self.expect(b'(', FilterErrorKind::ExpectedOpen)?;
		let node = match self.peek() {
			None => return Err(self.err(FilterErrorKind::UnexpectedEnd)),
			Some(b'&') => {
				self.pos += 1;
				Node::And(self.parse_list()?)
			}
			Some(b'|') => {
				self.pos += 1;
				Node::Or(self.parse_list()?)
			}
			Some(b'!') => {
				self.pos += 1;
				self.skip_ws();
				Node::Not(Box::new(self.parse_filter()?))
			}
			Some(_) => self.parse_item()?,
		};
		self.skip_ws();
		self.expect(b')', FilterErrorKind::ExpectedClose)?;
		Ok(node)
	}

	fn parse_list(&mut self) -> Result<Vec<Node>, FilterError> {
		let mut nodes = Vec::new();
		loop {
			self.skip_ws();
			match self.peek() {
				Some(b'(') => nodes.push(self.parse_filter()?),
				_ if nodes.is_empty() => return Err(self.err(FilterErrorKind::EmptyCompound)),
				_ => return Ok(nodes),
			}
		}
	}

	fn parse_item(&mut self) -> Result<Node, FilterError> {
		let attr = self.parse_attr()?;
		match self.peek() {
			Some(b'=') => {
				self.pos += 1;
				self.parse_eq_rhs(attr)
			}
			Some(b'>') => {
				self.pos += 1;
				self.expect(b'=', FilterErrorKind::InvalidOperator)?;
				Ok(Node::Ge(attr, self.parse_value()?.into_literal()))
			}
			Some(b'<') => {
				self.pos += 1;
				self.expect(b'=', FilterErrorKind::InvalidOperator)?;
				Ok(Node::Le(attr, self.parse_value()?.into_literal()))
			}
			Some(b'~') => {
				self.pos += 1;
				self.expect(b'=', FilterErrorKind::InvalidOperator)?;
				Ok(Node::Approx(attr, self.parse_value()?.into_literal()))
			}
			_ => Err(self.err(FilterErrorKind::InvalidOperator)),
		}
	}

	fn parse_attr(&mut self) -> Result<Box<str>, FilterError> {
		let start = self.pos;
		while let Some(b) = self.peek() {
			if matches!(b, b'=' | b'<' | b'>' | b'~' | b'(' | b')' | b'*') {
				break;
			}
			self.pos += 1;
		}
		let raw = core::str::from_utf8(&self.input[start..self.pos]).expect("attr split on ascii bytes");
		let attr = raw.trim_end();
		if attr.is_empty() {
			return Err(self.err(FilterErrorKind::EmptyAttribute));
		}
		Ok(attr.to_ascii_lowercase().into_boxed_str())
	}

	fn parse_eq_rhs(&mut self, attr: Box<str>) -> Result<Node, FilterError> {
		let value = self.parse_value()?;
		Ok(match value {
			Value::Literal(text) => Node::Eq(attr, text),
			Value::AnyValue => Node::Present(attr),
			Value::Pattern(pattern) => Node::Substr(attr, pattern),
		})
	}

	fn parse_value(&mut self) -> Result<Value, FilterError> {
		let mut parts: Vec<Box<str>> = Vec::new();
		let mut current = String::new();
		loop {
			match self.peek() {
				None | Some(b')') => break,
				Some(b'(') => break,
				Some(b'*') => {
					self.pos += 1;
					parts.push(current.split_off(0).into_boxed_str());
				}
				Some(b'\\') => {
					self.pos += 1;
					let Some(escaped) = self.peek() else {
						return Err(self.err(FilterErrorKind::DanglingEscape));
					};
					self.pos += 1;
					current.push(escaped as char);
				}
				Some(_) => {
					// Values may hold arbitrary UTF-8; copy whole code points.
					let rest = core::str::from_utf8(&self.input[self.pos..]).expect("input is str");
					let ch = rest.chars().next().expect("peeked non-empty");
					self.pos += ch.len_utf8();
					current.push(ch);
				}
			}
		}
		if parts.is_empty() {
			return Ok(Value::Literal(current.into_boxed_str()));
		}
		if parts.len() == 1 && parts[0].is_empty() && current.is_empty() {
			return Ok(Value::AnyValue);
		}
		parts.push(current.into_boxed_str());
		Ok(Value::Pattern(Pattern { parts }))
	}
}

enum Value {
	Literal(Box<str>),
	/// A bare `*`: presence test.
	AnyValue,
	Pattern(Pattern),
}

impl Value {
	/// Ordering/approx operators take the right-hand side verbatim; a `*`
	/// there is an ordinary character.
	fn into_literal(self) -> Box<str> {
		match self {
			Value::Literal(text) => text,
			Value::AnyValue => Box::from("*"),
			Value::Pattern(pattern) => {
				let mut out = String::new();
				for (i, part) in pattern.parts.iter().enumerate() {
					if i > 0 {
						out.push('*');
					}
					out.push_str(part);
				}
				out.into_boxed_str()
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn props() -> Properties {
		Properties::new()
			.with("category", "io")
			.with("rank", 10i64)
			.with("enabled", true)
			.with("interfaces", vec!["a::Reader".to_string(), "a::Writer".to_string()])
	}

	fn matches(filter: &str, props: &Properties) -> bool {
		Filter::new(filter).unwrap().matches(props)
	}

	#[test]
	fn equality_and_presence() {
		let p = props();
		assert!(matches("(category=io)", &p));
		assert!(!matches("(category=net)", &p));
		assert!(matches("(category=*)", &p));
		assert!(!matches("(missing=*)", &p));
		assert!(matches("(enabled=true)", &p));
	}

	#[test]
	fn attribute_names_fold_case() {
		let p = props();
		assert!(matches("(CATEGORY=io)", &p));
		assert!(matches("(Rank>=10)", &p));
	}

	#[test]
	fn numeric_and_lexicographic_ordering() {
		let p = props();
		assert!(matches("(rank>=8)", &p));
		assert!(matches("(rank<=10)", &p));
		assert!(!matches("(rank>=11)", &p));
		assert!(matches("(category>=im)", &p));
		assert!(!matches("(category<=ia)", &p));
	}

	#[test]
	fn wildcards() {
		let p = props();
		assert!(matches("(category=i*)", &p));
		assert!(matches("(category=*o)", &p));
		assert!(matches("(category=i*o)", &p));
		assert!(!matches("(category=x*)", &p));
		assert!(matches("(interfaces=a::*)", &p));
	}

	#[test]
	fn list_membership() {
		let p = props();
		assert!(matches("(interfaces=a::Writer)", &p));
		assert!(!matches("(interfaces=a::Codec)", &p));
	}

	#[test]
	fn composition() {
		let p = props();
		assert!(matches("(&(category=io)(rank>=8))", &p));
		assert!(!matches("(&(category=io)(rank>=11))", &p));
		assert!(matches("(|(category=net)(rank>=8))", &p));
		assert!(matches("(!(category=net))", &p));
		assert!(matches("(&(|(category=io)(category=net))(!(rank<=5)))", &p));
	}

	#[test]
	fn approx_ignores_case_and_whitespace() {
		let p = Properties::new().with("vendor", " Acme ");
		assert!(matches("(vendor~=acme)", &p));
		assert!(!matches("(vendor=acme)", &p));
	}

	#[test]
	fn escapes() {
		let p = Properties::new().with("path", "a(b)*c");
		assert!(matches(r"(path=a\(b\)\*c)", &p));
	}

	#[test]
	fn syntax_errors_carry_position() {
		assert_eq!(Filter::new("category=io").unwrap_err().kind, FilterErrorKind::ExpectedOpen);
		assert_eq!(Filter::new("(=io)").unwrap_err().kind, FilterErrorKind::EmptyAttribute);
		assert_eq!(Filter::new("(category>io)").unwrap_err().kind, FilterErrorKind::InvalidOperator);
		assert_eq!(Filter::new("(category=io").unwrap_err().kind, FilterErrorKind::ExpectedClose);
		assert_eq!(Filter::new("(category=io))").unwrap_err().kind, FilterErrorKind::TrailingInput);
		assert_eq!(Filter::new("(&)").unwrap_err().kind, FilterErrorKind::EmptyCompound);
		let err = Filter::new(r"(a=b\").unwrap_err();
		assert_eq!(err.kind, FilterErrorKind::DanglingEscape);
		assert_eq!(err.pos, 5);
	}
}

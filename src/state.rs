//! Per-component state with dotted-path access.
//!
//! Paths use dot and bracket notation interchangeably: `user.name`, `items[0].text` and `items.0.text` all resolve the same way.
//! Intermediate containers that are missing on [`StateStore::set`] are created as lists if the *next* segment is numeric and as mappings otherwise.

use crate::error::PathError;
use core::{fmt, str::FromStr};
use hashbrown::HashMap;
use serde_json::{Map, Value};
use tracing::{debug, instrument, trace};

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
	Key(String),
	Index(usize),
}

impl Segment {
	fn parse(text: &str) -> Self {
		match text.parse::<usize>() {
			Ok(index) if !text.starts_with('+') => Self::Index(index),
			_ => Self::Key(text.to_owned()),
		}
	}

	fn empty_container(&self) -> Value {
		match self {
			Self::Index(_) => Value::Array(Vec::new()),
			Self::Key(_) => Value::Object(Map::new()),
		}
	}
}

/// A parsed state path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path(Vec<Segment>);

impl Path {
	/// Parses dot/bracket notation.
	///
	/// # Errors
	///
	/// Iff `text` is empty, contains an empty segment or an unterminated `[`.
	pub fn parse(text: &str) -> Result<Self, PathError> {
		let text = text.trim();
		if text.is_empty() {
			return Err(PathError::Empty);
		}

		let mut segments = Vec::new();
		let mut rest = text;
		let mut offset = 0;
		while !rest.is_empty() {
			if let Some(inner) = rest.strip_prefix('[') {
				let end = inner.find(']').ok_or_else(|| PathError::UnterminatedBracket(text.to_owned()))?;
				let raw = inner[..end].trim();
				let unquoted = raw
					.strip_prefix('\'')
					.and_then(|r| r.strip_suffix('\''))
					.or_else(|| raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')));
				match unquoted {
					Some(key) => segments.push(Segment::Key(key.to_owned())),
					None if raw.is_empty() => return Err(PathError::EmptySegment(offset, text.to_owned())),
					None => segments.push(Segment::parse(raw)),
				}
				offset += end + 2;
				rest = &inner[end + 1..];
				continue;
			}

			if !segments.is_empty() {
				match rest.strip_prefix('.') {
					Some(tail) if !tail.is_empty() => {
						offset += 1;
						rest = tail;
					}
					_ => return Err(PathError::EmptySegment(offset + 1, text.to_owned())),
				}
			}

			let end = rest.find(|c: char| c == '.' || c == '[').unwrap_or_else(|| rest.len());
			if end == 0 {
				return Err(PathError::EmptySegment(offset, text.to_owned()));
			}
			segments.push(Segment::parse(&rest[..end]));
			offset += end;
			rest = &rest[end..];
		}

		Ok(Self(segments))
	}

	pub(crate) fn from_segments(segments: Vec<Segment>) -> Self {
		Self(segments)
	}

	#[must_use]
	pub fn segments(&self) -> &[Segment] {
		&self.0
	}

	/// Whether `self` equals `other` or is an ancestor of it.
	#[must_use]
	pub fn is_prefix_of(&self, other: &Self) -> bool {
		other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
	}

	/// Whether a change at either path can affect a view of the other one.
	#[must_use]
	pub fn is_related(&self, other: &Self) -> bool {
		self.is_prefix_of(other) || other.is_prefix_of(self)
	}

	/// Appends `other`'s segments.
	#[must_use]
	pub fn join(&self, other: &Self) -> Self {
		let mut segments = self.0.clone();
		segments.extend(other.0.iter().cloned());
		Self(segments)
	}

	#[must_use]
	pub fn child(&self, segment: Segment) -> Self {
		let mut segments = self.0.clone();
		segments.push(segment);
		Self(segments)
	}

	/// Resolves this path below `root`.
	///
	/// Numeric segments index into lists and look up string keys in mappings. `length` on a list or string yields its length.
	#[must_use]
	pub fn resolve<'a>(&self, root: &'a Value) -> Option<Resolved<'a>> {
		let mut current = root;
		let mut segments = self.0.iter().peekable();
		while let Some(segment) = segments.next() {
			current = match (current, segment) {
				(Value::Object(map), Segment::Key(key)) => map.get(key)?,
				(Value::Object(map), Segment::Index(index)) => map.get(&index.to_string())?,
				(Value::Array(items), Segment::Index(index)) => items.get(*index)?,
				(Value::Array(items), Segment::Key(key)) if key == "length" && segments.peek().is_none() => return Some(Resolved::Length(items.len())),
				(Value::String(text), Segment::Key(key)) if key == "length" && segments.peek().is_none() => {
					return Some(Resolved::Length(text.encode_utf16().count()))
				}
				_ => return None,
			};
		}
		Some(Resolved::Value(current))
	}
}

impl FromStr for Path {
	type Err = PathError;

	fn from_str(text: &str) -> Result<Self, Self::Err> {
		Self::parse(text)
	}
}

impl fmt::Display for Path {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, segment) in self.0.iter().enumerate() {
			match segment {
				Segment::Key(key) if i == 0 => f.write_str(key)?,
				Segment::Key(key) => write!(f, ".{}", key)?,
				Segment::Index(index) => write!(f, "[{}]", index)?,
			}
		}
		Ok(())
	}
}

/// The result of [`Path::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<'a> {
	Value(&'a Value),
	/// A synthesized `.length`.
	Length(usize),
}

impl Resolved<'_> {
	#[must_use]
	pub fn into_owned(self) -> Value {
		match self {
			Self::Value(value) => value.clone(),
			Self::Length(length) => Value::from(length),
		}
	}
}

/// Identifies a component instance (its `data-ui-id`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(String);

impl ComponentId {
	#[must_use]
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ComponentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for ComponentId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

/// All component states, keyed by component id.
///
/// This is a plain store without change notification; the [`Runtime`](`crate::Runtime`) wraps [`set`](`StateStore::set`) to propagate changes to views.
#[derive(Debug, Default, Clone)]
pub struct StateStore {
	states: HashMap<ComponentId, Value>,
}

impl StateStore {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Installs `state` as the full state of `id`, replacing any previous state.
	///
	/// Non-mapping states are wrapped as `{"value": state}` so that the root stays addressable by path.
	pub fn insert(&mut self, id: ComponentId, state: Value) {
		self.replace(id, state);
	}

	/// Like [`insert`](`StateStore::insert`), but hands back the state that was replaced.
	pub fn replace(&mut self, id: ComponentId, state: Value) -> Option<Value> {
		let state = match state {
			Value::Object(_) => state,
			Value::Null => Value::Object(Map::new()),
			other => {
				debug!(component = %id, "Wrapping non-mapping root state under `value`.");
				let mut map = Map::new();
				map.insert("value".to_owned(), other);
				Value::Object(map)
			}
		};
		self.states.insert(id, state)
	}

	pub fn remove(&mut self, id: &ComponentId) -> Option<Value> {
		self.states.remove(id)
	}

	#[must_use]
	pub fn contains(&self, id: &ComponentId) -> bool {
		self.states.contains_key(id)
	}

	pub fn clear(&mut self) {
		self.states.clear()
	}

	pub fn ids(&self) -> impl Iterator<Item = &ComponentId> {
		self.states.keys()
	}

	/// The whole state of `id`.
	#[must_use]
	pub fn snapshot(&self, id: &ComponentId) -> Option<&Value> {
		self.states.get(id)
	}

	/// Reads `path` of `id`. [`None`] means undefined.
	#[must_use]
	pub fn get(&self, id: &ComponentId, path: &Path) -> Option<Value> {
		path.resolve(self.states.get(id)?).map(Resolved::into_owned)
	}

	/// Writes `value` at `path` of `id`, creating the component state and any missing intermediate containers.
	///
	/// Returns the previous value ([`None`] if it was undefined).
	#[instrument(skip(self, value), fields(%id, %path))]
	pub fn set(&mut self, id: &ComponentId, path: &Path, value: Value) -> Option<Value> {
		let root = self.states.entry(id.clone()).or_insert_with(|| Value::Object(Map::new()));
		let (last, parents) = match path.0.split_last() {
			Some(split) => split,
			None => return None,
		};

		let mut current = root;
		for (i, segment) in parents.iter().enumerate() {
			let next = parents.get(i + 1).unwrap_or(last);
			current = match slot(current, segment, || next.empty_container()) {
				Some(slot) => slot,
				None => {
					debug!("Segment {:?} can't be created; ignoring write.", segment);
					return None;
				}
			};
			if !matches!(current, Value::Object(_) | Value::Array(_)) {
				trace!("Replacing primitive intermediate at segment {:?}.", segment);
				*current = next.empty_container();
			}
		}

		let existed = has_child(current, last);
		let slot = match slot(current, last, || Value::Null) {
			Some(slot) => slot,
			None => {
				debug!("Final segment {:?} can't be created; ignoring write.", last);
				return None;
			}
		};
		#[cfg(feature = "dangerous-logging")]
		trace!(?value, "Writing value.");
		let previous = core::mem::replace(slot, value);
		if existed {
			Some(previous)
		} else {
			None
		}
	}

	/// Shallow-merges `partial` into the root mapping of `id`.
	///
	/// Returns the keys that were written.
	pub fn merge(&mut self, id: &ComponentId, partial: Map<String, Value>) -> Vec<String> {
		let root = self.states.entry(id.clone()).or_insert_with(|| Value::Object(Map::new()));
		if !root.is_object() {
			*root = Value::Object(Map::new());
		}
		let mut keys = Vec::with_capacity(partial.len());
		if let Value::Object(map) = root {
			for (key, value) in partial {
				keys.push(key.clone());
				map.insert(key, value);
			}
		}
		keys
	}
}

fn has_child(container: &Value, segment: &Segment) -> bool {
	match (container, segment) {
		(Value::Object(map), Segment::Key(key)) => map.contains_key(key),
		(Value::Object(map), Segment::Index(index)) => map.contains_key(&index.to_string()),
		(Value::Array(items), Segment::Index(index)) => *index < items.len(),
		_ => false,
	}
}

/// How many `null`s a single write may pad a list with.
pub const MAX_INDEX_GAP: usize = 10_000;

/// Gets or creates the child slot of `container` at `segment`.
fn slot<'a>(container: &'a mut Value, segment: &Segment, create: impl FnOnce() -> Value) -> Option<&'a mut Value> {
	match (container, segment) {
		(Value::Object(map), Segment::Key(key)) => Some(map.entry(key.clone()).or_insert_with(create)),
		(Value::Object(map), Segment::Index(index)) => Some(map.entry(index.to_string()).or_insert_with(create)),
		(Value::Array(items), Segment::Index(index)) => {
			if index.saturating_sub(items.len()) > MAX_INDEX_GAP {
				debug!(length = items.len(), "Index {} is too far past the end of the list.", index);
				return None;
			}
			if items.len() <= *index {
				items.resize(*index, Value::Null);
				items.push(create());
			}
			items.get_mut(*index)
		}
		_ => None,
	}
}

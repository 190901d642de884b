//! Named state transitions.
//!
//! A [`StateAction`] describes a change relative to the current state (increment a counter, append to a list…) instead of
//! the final value, which lets handlers, servers and realtime peers express updates without reading state first.
//! Actions serialize as `{"type": "INCREMENT", "payload": {"path": "count", "amount": 2}}`.

use crate::{
	error::PathError,
	expr::truthy,
	state::{ComponentId, Path, StateStore},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

/// A state transition, applied through [`Runtime::apply`](`crate::Runtime::apply`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateAction {
	/// Shallow merge into the root mapping.
	SetState(Map<String, Value>),
	SetValue { path: String, value: Value },
	/// Appends `item`, turning a missing or non-list value into a one-element list.
	AppendToList { path: String, item: Value },
	/// Removes the element at `index` or, without one, the first element equal to `value`.
	RemoveFromList {
		path: String,
		#[serde(default)]
		index: Option<usize>,
		#[serde(default)]
		value: Option<Value>,
	},
	ToggleBoolean { path: String },
	/// Adds `amount` (default 1) to a number. Missing values count as 0.
	Increment {
		path: String,
		#[serde(default = "one")]
		amount: Number,
	},
	/// Replaces the whole state.
	Reset {
		#[serde(default)]
		state: Map<String, Value>,
	},
}

fn one() -> Number {
	Number::from(1)
}

impl StateAction {
	/// The `SCREAMING_SNAKE_CASE` name of this action.
	#[must_use]
	pub fn name(&self) -> &'static str {
		match self {
			Self::SetState(_) => "SET_STATE",
			Self::SetValue { .. } => "SET_VALUE",
			Self::AppendToList { .. } => "APPEND_TO_LIST",
			Self::RemoveFromList { .. } => "REMOVE_FROM_LIST",
			Self::ToggleBoolean { .. } => "TOGGLE_BOOLEAN",
			Self::Increment { .. } => "INCREMENT",
			Self::Reset { .. } => "RESET",
		}
	}

	/// Works out the write this action amounts to against `id`'s current state in `store`.
	///
	/// # Errors
	///
	/// Iff the action's path is malformed.
	pub fn reduce(&self, store: &StateStore, id: &ComponentId) -> Result<Reduced, PathError> {
		Ok(match self {
			Self::SetState(partial) => Reduced::Merge(partial.clone()),
			Self::Reset { state } => Reduced::Replace(Value::Object(state.clone())),
			Self::SetValue { path, value } => Reduced::Write(Path::parse(path)?, value.clone()),
			Self::AppendToList { path, item } => {
				let path = Path::parse(path)?;
				let list = match store.get(id, &path) {
					Some(Value::Array(mut items)) => {
						items.push(item.clone());
						items
					}
					_ => vec![item.clone()],
				};
				Reduced::Write(path, Value::Array(list))
			}
			Self::RemoveFromList { path, index, value } => {
				let path = Path::parse(path)?;
				let mut items = match store.get(id, &path) {
					Some(Value::Array(items)) => items,
					_ => {
						debug!("Nothing to remove from {}, which isn't a list.", path);
						return Ok(Reduced::Unchanged);
					}
				};
				let position = match (index, value) {
					(Some(index), _) => Some(*index).filter(|index| *index < items.len()),
					(None, Some(value)) => items.iter().position(|item| item == value),
					(None, None) => None,
				};
				match position {
					Some(position) => {
						items.remove(position);
						Reduced::Write(path, Value::Array(items))
					}
					None => {
						debug!("No matching element in {}.", path);
						Reduced::Unchanged
					}
				}
			}
			Self::ToggleBoolean { path } => {
				let path = Path::parse(path)?;
				let current = store.get(id, &path);
				Reduced::Write(path, Value::Bool(!truthy(&current)))
			}
			Self::Increment { path, amount } => {
				let path = Path::parse(path)?;
				match store.get(id, &path) {
					None | Some(Value::Null) => Reduced::Write(path, Value::Number(amount.clone())),
					Some(Value::Number(current)) => match add(&current, amount) {
						Some(sum) => Reduced::Write(path, Value::Number(sum)),
						None => {
							warn!("Can't increment {}: the result isn't a finite number.", path);
							Reduced::Unchanged
						}
					},
					Some(_) => {
						warn!("Can't increment {}, which isn't a number.", path);
						Reduced::Unchanged
					}
				}
			}
		})
	}
}

/// Integer addition where both sides are integers and it doesn't overflow, float addition otherwise.
fn add(a: &Number, b: &Number) -> Option<Number> {
	if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
		if let Some(sum) = a.checked_add(b) {
			return Some(Number::from(sum));
		}
	}
	Number::from_f64(a.as_f64()? + b.as_f64()?)
}

/// What a [`StateAction`] comes down to.
#[derive(Debug, Clone, PartialEq)]
pub enum Reduced {
	Write(Path, Value),
	Merge(Map<String, Value>),
	Replace(Value),
	Unchanged,
}

/// One applied action in [`Runtime::history`](`crate::Runtime::history`).
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
	pub component: ComponentId,
	pub action: StateAction,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn store(state: Value) -> (StateStore, ComponentId) {
		let mut store = StateStore::new();
		let id = ComponentId::new("c");
		store.insert(id.clone(), state);
		(store, id)
	}

	fn write(reduced: Reduced) -> (String, Value) {
		match reduced {
			Reduced::Write(path, value) => (path.to_string(), value),
			other => panic!("expected a write, got {:?}", other),
		}
	}

	#[test]
	fn deserializes_tagged_actions() {
		let action: StateAction = serde_json::from_value(json!({ "type": "INCREMENT", "payload": { "path": "count" } })).unwrap();
		assert_eq!(
			action,
			StateAction::Increment {
				path: "count".to_owned(),
				amount: Number::from(1),
			}
		);
		let action: StateAction = serde_json::from_value(json!({ "type": "REMOVE_FROM_LIST", "payload": { "path": "tags", "value": "x" } })).unwrap();
		assert_eq!(action.name(), "REMOVE_FROM_LIST");
		assert!(serde_json::from_value::<StateAction>(json!({ "type": "EXPLODE", "payload": {} })).is_err());
	}

	#[test]
	fn increments_integers_and_floats() {
		let (store, id) = store(json!({ "count": 2, "ratio": 0.5, "label": "x" }));
		let increment = |path: &str, amount: Value| StateAction::Increment {
			path: path.to_owned(),
			amount: serde_json::from_value(amount).unwrap(),
		};
		assert_eq!(write(increment("count", json!(3)).reduce(&store, &id).unwrap()), ("count".to_owned(), json!(5)));
		assert_eq!(write(increment("ratio", json!(1)).reduce(&store, &id).unwrap()), ("ratio".to_owned(), json!(1.5)));
		assert_eq!(write(increment("missing", json!(-1)).reduce(&store, &id).unwrap()), ("missing".to_owned(), json!(-1)));
		assert_eq!(increment("label", json!(1)).reduce(&store, &id).unwrap(), Reduced::Unchanged);
	}

	#[test]
	fn list_operations() {
		let (store, id) = store(json!({ "tags": ["a", "b", "a"], "name": "n" }));
		let append = StateAction::AppendToList {
			path: "tags".to_owned(),
			item: json!("c"),
		};
		assert_eq!(write(append.reduce(&store, &id).unwrap()).1, json!(["a", "b", "a", "c"]));
		let append_new = StateAction::AppendToList {
			path: "name".to_owned(),
			item: json!(1),
		};
		assert_eq!(write(append_new.reduce(&store, &id).unwrap()).1, json!([1]));

		let remove = |index: Option<usize>, value: Option<Value>| StateAction::RemoveFromList {
			path: "tags".to_owned(),
			index,
			value,
		};
		assert_eq!(write(remove(Some(1), None).reduce(&store, &id).unwrap()).1, json!(["a", "a"]));
		assert_eq!(write(remove(None, Some(json!("a"))).reduce(&store, &id).unwrap()).1, json!(["b", "a"]));
		assert_eq!(remove(Some(9), None).reduce(&store, &id).unwrap(), Reduced::Unchanged);
		assert_eq!(remove(None, Some(json!("z"))).reduce(&store, &id).unwrap(), Reduced::Unchanged);
	}

	#[test]
	fn toggles_by_truthiness() {
		let (store, id) = store(json!({ "on": true, "text": "" }));
		let toggle = |path: &str| write(StateAction::ToggleBoolean { path: path.to_owned() }.reduce(&store, &id).unwrap()).1;
		assert_eq!(toggle("on"), json!(false));
		assert_eq!(toggle("text"), json!(true));
		assert_eq!(toggle("missing"), json!(true));
	}

	#[test]
	fn malformed_paths_are_errors() {
		let (store, id) = store(json!({}));
		assert!(StateAction::ToggleBoolean { path: "a..b".to_owned() }.reduce(&store, &id).is_err());
	}
}

//! Runtime settings: attribute prefix, default messages and the realtime reconnection policy.

use crate::error::ConfigError;
use core::time::Duration;
use serde::Deserialize;

/// Runtime configuration.
///
/// Every field is optional in serialized form:
///
/// ```
/// use declarative_dom::Config;
///
/// let config = Config::from_json(r#"{ "attribute_prefix": "data-x-", "max_reconnect_attempts": 2 }"#).unwrap();
/// assert_eq!(config.attr("bind"), "data-x-bind");
/// assert_eq!(config.empty_message, "No items to display");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Prepended to every declarative attribute name (`bind`, `show`, `click`…).
	pub attribute_prefix: String,
	/// Shown by lists without `data-ui-empty` when their array is empty.
	pub empty_message: String,
	/// Class toggled on elements while they are loading.
	pub loading_class: String,
	/// Fixed delay between realtime reconnection attempts.
	pub reconnect_delay_ms: u64,
	pub max_reconnect_attempts: u32,
	/// HTTP method for AJAX actions without `data-ui-method`.
	pub default_method: String,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			attribute_prefix: "data-ui-".to_owned(),
			empty_message: "No items to display".to_owned(),
			loading_class: "ui-loading".to_owned(),
			reconnect_delay_ms: 3000,
			max_reconnect_attempts: 5,
			default_method: "POST".to_owned(),
		}
	}
}

impl Config {
	/// Parses a (partial) JSON configuration.
	///
	/// # Errors
	///
	/// Iff the JSON is malformed or the attribute prefix is empty.
	pub fn from_json(json: &str) -> Result<Self, ConfigError> {
		let config: Self = serde_json::from_str(json)?;
		if config.attribute_prefix.is_empty() {
			return Err(ConfigError::EmptyPrefix);
		}
		Ok(config)
	}

	/// The full name of declarative attribute `name`.
	#[must_use]
	pub fn attr(&self, name: &str) -> String {
		let mut full = String::with_capacity(self.attribute_prefix.len() + name.len());
		full.push_str(&self.attribute_prefix);
		full.push_str(name);
		full
	}

	#[must_use]
	pub fn reconnect_delay(&self) -> Duration {
		Duration::from_millis(self.reconnect_delay_ms)
	}
}

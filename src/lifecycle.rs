//! Component lifecycle hooks.

use crate::{dom::Dom, error::HookError, runtime::Runtime, state::ComponentId};
use core::fmt;
use hashbrown::HashMap;
use serde_json::Value;
use std::rc::Rc;

/// Lifecycle points a component can hook into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookName {
	/// Once per component id, after its state is loaded and before the first render.
	Init,
	/// After the first full render.
	Mounted,
	/// Before a state change reaches the DOM. May [veto](`HookOutcome::Veto`) the view refresh.
	BeforeUpdate,
	/// Deferred until the triggering update completed.
	Updated,
	BeforeDestroy,
	Destroyed,
}

impl HookName {
	pub const ALL: [Self; 6] = [Self::Init, Self::Mounted, Self::BeforeUpdate, Self::Updated, Self::BeforeDestroy, Self::Destroyed];

	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Init => "init",
			Self::Mounted => "mounted",
			Self::BeforeUpdate => "beforeUpdate",
			Self::Updated => "updated",
			Self::BeforeDestroy => "beforeDestroy",
			Self::Destroyed => "destroyed",
		}
	}

	#[must_use]
	pub fn from_name(name: &str) -> Option<Self> {
		Self::ALL.iter().copied().find(|hook| hook.as_str() == name)
	}
}

impl fmt::Display for HookName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// What a hook asks of the update that fired it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
	Continue,
	/// Only meaningful from [`HookName::BeforeUpdate`]: the state change is kept, but views aren't refreshed.
	Veto,
}

/// Passed to every hook.
#[derive(Debug, Clone)]
pub struct HookContext<N> {
	pub component: String,
	pub id: ComponentId,
	pub element: N,
	pub hook: HookName,
	/// Hook-specific data. For `beforeUpdate`/`updated` this is `{ path, value, previous }` or `{ merged: [keys] }`.
	pub payload: Value,
}

pub type Hook<D> = Rc<dyn Fn(&mut Runtime<D>, &HookContext<<D as Dom>::Node>) -> Result<HookOutcome, HookError>>;

/// A set of hooks for one component name.
pub struct Hooks<D: Dom> {
	hooks: HashMap<HookName, Hook<D>>,
}

impl<D: Dom> Default for Hooks<D> {
	fn default() -> Self {
		Self { hooks: HashMap::new() }
	}
}

impl<D: Dom> Clone for Hooks<D> {
	fn clone(&self) -> Self {
		Self { hooks: self.hooks.clone() }
	}
}

impl<D: Dom> fmt::Debug for Hooks<D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_set().entries(self.hooks.keys()).finish()
	}
}

impl<D: Dom> Hooks<D> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds or replaces the hook for `name`.
	#[must_use]
	pub fn on(mut self, name: HookName, hook: impl Fn(&mut Runtime<D>, &HookContext<D::Node>) -> Result<HookOutcome, HookError> + 'static) -> Self {
		self.hooks.insert(name, Rc::new(hook));
		self
	}

	#[must_use]
	pub fn get(&self, name: HookName) -> Option<Hook<D>> {
		self.hooks.get(&name).cloned()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.hooks.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.hooks.is_empty()
	}
}

/// Hooks by component name.
///
/// Firing lives on [`Runtime::fire_hook`], since hooks receive the runtime.
pub struct LifecycleHub<D: Dom> {
	components: HashMap<String, Hooks<D>>,
}

impl<D: Dom> Default for LifecycleHub<D> {
	fn default() -> Self {
		Self { components: HashMap::new() }
	}
}

impl<D: Dom> fmt::Debug for LifecycleHub<D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_map().entries(self.components.iter()).finish()
	}
}

impl<D: Dom> LifecycleHub<D> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Merges `hooks` into `component`'s. Later registrations win per hook name.
	pub fn register(&mut self, component: &str, hooks: Hooks<D>) {
		let existing = self.components.entry(component.to_owned()).or_default();
		existing.hooks.extend(hooks.hooks);
	}

	#[must_use]
	pub fn hook(&self, component: &str, name: HookName) -> Option<Hook<D>> {
		self.components.get(component).and_then(|hooks| hooks.get(name))
	}

	pub fn clear(&mut self) {
		self.components.clear()
	}
}

//! `show`, `hide` and `toggle` visibility.

use crate::{
	component,
	config::Config,
	dom::Dom,
	error::ExprError,
	expr::{decode_entities, Expr, Scope},
};
use hashbrown::HashMap;
use serde_json::Value;
use tracing::{debug, error, trace, trace_span};

/// Parses and evaluates visibility conditions, caching parsed expressions by source text.
#[derive(Debug, Default)]
pub struct ConditionalEngine {
	cache: HashMap<String, Result<Expr, ExprError>>,
}

impl ConditionalEngine {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Evaluates `source` against `scope`.
	///
	/// Unparsable conditions are logged once and evaluate to `false`. References that don't resolve are simply falsy.
	pub fn evaluate(&mut self, source: &str, scope: &dyn Scope) -> bool {
		let parsed = self.cache.entry_ref(source).or_insert_with(|| {
			let decoded = decode_entities(source);
			let parsed = Expr::parse(&decoded);
			if let Err(parse_error) = &parsed {
				error!("Condition {:?} could not be parsed: {}", source, parse_error);
			}
			parsed
		});
		match parsed {
			Ok(expr) => expr.evaluate_bool(scope),
			Err(parse_error) => {
				debug!("Condition {:?} evaluates to false: {}", source, parse_error);
				false
			}
		}
	}

	/// Number of distinct condition sources seen.
	#[must_use]
	pub fn cached(&self) -> usize {
		self.cache.len()
	}

	pub fn clear(&mut self) {
		self.cache.clear()
	}

	/// Re-evaluates every condition in `component` against `state`.
	pub fn apply<D: Dom>(&mut self, dom: &mut D, config: &Config, component: &D::Node, state: &Value) {
		let span = trace_span!("apply_conditionals");
		let _enter = span.enter();

		let show = config.attr("show");
		for node in component::scoped(dom, config, component, &show) {
			if let Some(source) = dom.attribute(&node, &show) {
				let visible = self.evaluate(&source, state);
				set_visible(dom, &node, visible);
			}
		}

		let hide = config.attr("hide");
		for node in component::scoped(dom, config, component, &hide) {
			if let Some(source) = dom.attribute(&node, &hide) {
				let hidden = self.evaluate(&source, state);
				set_visible(dom, &node, !hidden);
			}
		}

		let toggle = config.attr("toggle");
		let when = config.attr("when");
		for node in component::scoped(dom, config, component, &toggle) {
			if let Some(source) = dom.attribute(&node, &toggle) {
				let result = self.evaluate(&source, state);
				for child in dom.children(&node) {
					match dom.attribute(&child, &when) {
						Some(branch) => set_visible(dom, &child, branch.trim() == if result { "true" } else { "false" }),
						None => trace!("Toggle child without {} left alone.", when),
					}
				}
			}
		}
	}
}

/// Hides with `display: none`, shows by removing the inline `display` so the stylesheet decides.
pub fn set_visible<D: Dom>(dom: &mut D, node: &D::Node, visible: bool) {
	if visible {
		if dom.style(node, "display").is_some() {
			dom.set_style(node, "display", None)
		}
	} else {
		dom.set_style(node, "display", Some("none"))
	}
}

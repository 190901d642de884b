//! `{placeholder}` substitution for list item templates.

use crate::{
	binding::display_text,
	expr::{Expr, Operand, Scope},
	state::{Path, Segment},
};
use serde_json::Value;
use tracing::trace;

/// Name resolution for one list item.
///
/// `{item.text}` and `{text}` both read the item, `{index}` is the position, anything else falls back to the component state.
#[derive(Debug, Clone, Copy)]
pub struct ItemScope<'a> {
	pub item: &'a Value,
	pub index: usize,
	pub item_var: &'a str,
	pub index_var: &'a str,
	pub state: &'a Value,
}

impl Scope for ItemScope<'_> {
	fn lookup(&self, path: &Path) -> Operand {
		match path.segments().split_first() {
			Some((Segment::Key(head), rest)) if head == self.item_var => {
				Path::from_segments(rest.to_vec()).resolve(self.item).map(crate::state::Resolved::into_owned)
			}
			Some((Segment::Key(head), [])) if head == self.index_var => Some(Value::from(self.index)),
			_ => path
				.resolve(self.item)
				.or_else(|| path.resolve(self.state))
				.map(crate::state::Resolved::into_owned),
		}
	}
}

/// Escapes text for use in HTML content and quoted attribute values.
#[must_use]
pub fn escape_html(text: &str) -> String {
	let mut escaped = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'&' => escaped.push_str("&amp;"),
			'<' => escaped.push_str("&lt;"),
			'>' => escaped.push_str("&gt;"),
			'"' => escaped.push_str("&quot;"),
			'\'' => escaped.push_str("&#39;"),
			c => escaped.push(c),
		}
	}
	escaped
}

/// Replaces every `{…}` placeholder in `template`.
///
/// Placeholders are either a path or a restricted expression (usually a ternary).
/// Values are HTML-escaped. Placeholders that don't parse are left verbatim.
///
/// ```
/// use declarative_dom::template::{substitute, ItemScope};
/// use serde_json::json;
///
/// let item = json!({ "text": "Milk & eggs", "done": true });
/// let state = json!({});
/// let scope = ItemScope { item: &item, index: 2, item_var: "item", index_var: "index", state: &state };
/// assert_eq!(
/// 	substitute("<span>{index}: {item.text}</span><i>{done ? 'yes' : 'no'}</i>", &scope),
/// 	"<span>2: Milk &amp; eggs</span><i>yes</i>",
/// );
/// ```
#[must_use]
pub fn substitute(template: &str, scope: &ItemScope<'_>) -> String {
	let mut output = String::with_capacity(template.len());
	let mut rest = template;
	while let Some(open) = rest.find('{') {
		output.push_str(&rest[..open]);
		let after = &rest[open + 1..];
		let close = match after.find('}') {
			Some(close) => close,
			None => {
				rest = &rest[open..];
				break;
			}
		};
		let placeholder = &after[..close];
		match evaluate_placeholder(placeholder, scope) {
			Some(value) => output.push_str(&escape_html(&display_text(value.as_ref()))),
			None => {
				trace!("Leaving placeholder {{{}}} as is.", placeholder);
				output.push('{');
				output.push_str(placeholder);
				output.push('}');
			}
		}
		rest = &after[close + 1..];
	}
	output.push_str(rest);
	output
}

/// [`None`] iff `source` isn't a placeholder at all.
fn evaluate_placeholder(source: &str, scope: &ItemScope<'_>) -> Option<Operand> {
	let source = source.trim();
	if source.is_empty() {
		return None;
	}
	Expr::parse(source).ok().map(|expr| expr.evaluate(scope))
}

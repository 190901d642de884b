//! A small, safe expression language for conditions and template ternaries.
//!
//! Expressions are parsed once into an [`Expr`] tree and interpreted against a read-only [`Scope`].
//! There is no assignment, no calls and no access to anything but the scope, so evaluation can't mutate state.
//!
//! Supported: number/string literals, `true`, `false`, `null`, `undefined`, dotted and bracketed paths (including `.length`),
//! `===` `!==` `==` `!=` `>` `>=` `<` `<=`, `&&` `||` `!`, unary `-`, grouping and `cond ? a : b`.
//!
//! References that don't resolve evaluate to *undefined* (falsy) rather than failing.

use crate::{
	error::ExprError,
	state::{Path, Segment},
};
use core::{cmp::Ordering, fmt};
use serde_json::Value;
use std::borrow::Cow;

/// The value of an evaluated (sub-)expression. [`None`] is JavaScript's `undefined`.
pub type Operand = Option<Value>;

/// Read-only name resolution for [`Expr::evaluate`].
pub trait Scope {
	fn lookup(&self, path: &Path) -> Operand;
}

impl Scope for Value {
	fn lookup(&self, path: &Path) -> Operand {
		path.resolve(self).map(crate::state::Resolved::into_owned)
	}
}

impl<S: Scope + ?Sized> Scope for &S {
	fn lookup(&self, path: &Path) -> Operand {
		(**self).lookup(path)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
	StrictEq,
	StrictNe,
	LooseEq,
	LooseNe,
	Lt,
	Le,
	Gt,
	Ge,
}

impl fmt::Display for BinaryOp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::StrictEq => "===",
			Self::StrictNe => "!==",
			Self::LooseEq => "==",
			Self::LooseNe => "!=",
			Self::Lt => "<",
			Self::Le => "<=",
			Self::Gt => ">",
			Self::Ge => ">=",
		})
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
	Literal(Value),
	Undefined,
	Path(Path),
	Not(Box<Expr>),
	Neg(Box<Expr>),
	Binary(BinaryOp, Box<Expr>, Box<Expr>),
	And(Box<Expr>, Box<Expr>),
	Or(Box<Expr>, Box<Expr>),
	Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
}

impl Expr {
	/// Parses `source`.
	///
	/// # Errors
	///
	/// Iff `source` isn't a complete expression of the supported grammar.
	pub fn parse(source: &str) -> Result<Self, ExprError> {
		let tokens = tokenize(source)?;
		let mut parser = Parser { tokens: &tokens, position: 0 };
		let expr = parser.conditional()?;
		match parser.tokens.get(parser.position) {
			None => Ok(expr),
			Some(&(_, at)) => Err(ExprError::Trailing(at)),
		}
	}

	/// Evaluates with JavaScript-like semantics (`&&`/`||` yield operands, loose truthiness).
	#[must_use]
	pub fn evaluate(&self, scope: &dyn Scope) -> Operand {
		match self {
			Self::Literal(value) => Some(value.clone()),
			Self::Undefined => None,
			Self::Path(path) => scope.lookup(path),
			Self::Not(inner) => Some(Value::Bool(!truthy(&inner.evaluate(scope)))),
			Self::Neg(inner) => Some(number_value(-to_number(&inner.evaluate(scope)))),
			Self::Binary(op, left, right) => {
				let (left, right) = (left.evaluate(scope), right.evaluate(scope));
				Some(Value::Bool(compare(*op, &left, &right)))
			}
			Self::And(left, right) => {
				let left = left.evaluate(scope);
				if truthy(&left) {
					right.evaluate(scope)
				} else {
					left
				}
			}
			Self::Or(left, right) => {
				let left = left.evaluate(scope);
				if truthy(&left) {
					left
				} else {
					right.evaluate(scope)
				}
			}
			Self::Conditional(condition, then, otherwise) => {
				if truthy(&condition.evaluate(scope)) {
					then.evaluate(scope)
				} else {
					otherwise.evaluate(scope)
				}
			}
		}
	}

	#[must_use]
	pub fn evaluate_bool(&self, scope: &dyn Scope) -> bool {
		truthy(&self.evaluate(scope))
	}
}

/// JavaScript truthiness.
#[must_use]
pub fn truthy(operand: &Operand) -> bool {
	match operand {
		None | Some(Value::Null) => false,
		Some(Value::Bool(b)) => *b,
		Some(Value::Number(n)) => n.as_f64().map_or(false, |n| n != 0.0 && !n.is_nan()),
		Some(Value::String(s)) => !s.is_empty(),
		Some(Value::Array(_)) | Some(Value::Object(_)) => true,
	}
}

/// JavaScript `ToNumber`, close enough for comparisons.
fn to_number(operand: &Operand) -> f64 {
	match operand {
		None => f64::NAN,
		Some(Value::Null) => 0.0,
		Some(Value::Bool(b)) => f64::from(u8::from(*b)),
		Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
		Some(Value::String(s)) => {
			let s = s.trim();
			if s.is_empty() {
				0.0
			} else {
				s.parse().unwrap_or(f64::NAN)
			}
		}
		Some(Value::Array(_)) | Some(Value::Object(_)) => f64::NAN,
	}
}

fn number_value(n: f64) -> Value {
	serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
}

fn strict_eq(left: &Operand, right: &Operand) -> bool {
	match (left, right) {
		(None, None) => true,
		(Some(Value::Number(a)), Some(Value::Number(b))) => a.as_f64() == b.as_f64(),
		(Some(a), Some(b)) => a == b,
		_ => false,
	}
}

fn loose_eq(left: &Operand, right: &Operand) -> bool {
	match (left, right) {
		(None, None) | (None, Some(Value::Null)) | (Some(Value::Null), None) => true,
		(None, _) | (_, None) | (Some(Value::Null), _) | (_, Some(Value::Null)) => false,
		(Some(Value::String(a)), Some(Value::String(b))) => a == b,
		(Some(Value::Array(_)), _) | (Some(Value::Object(_)), _) | (_, Some(Value::Array(_))) | (_, Some(Value::Object(_))) => strict_eq(left, right),
		_ => to_number(left) == to_number(right),
	}
}

fn compare(op: BinaryOp, left: &Operand, right: &Operand) -> bool {
	let ordering = || match (left, right) {
		(Some(Value::String(a)), Some(Value::String(b))) => Some(a.cmp(b)),
		_ => to_number(left).partial_cmp(&to_number(right)),
	};
	match op {
		BinaryOp::StrictEq => strict_eq(left, right),
		BinaryOp::StrictNe => !strict_eq(left, right),
		BinaryOp::LooseEq => loose_eq(left, right),
		BinaryOp::LooseNe => !loose_eq(left, right),
		BinaryOp::Lt => ordering() == Some(Ordering::Less),
		BinaryOp::Le => matches!(ordering(), Some(Ordering::Less) | Some(Ordering::Equal)),
		BinaryOp::Gt => ordering() == Some(Ordering::Greater),
		BinaryOp::Ge => matches!(ordering(), Some(Ordering::Greater) | Some(Ordering::Equal)),
	}
}

/// Undoes attribute-level HTML escaping, for expressions that were escaped twice by a template engine.
#[must_use]
pub fn decode_entities(text: &str) -> Cow<'_, str> {
	if !text.contains('&') {
		return Cow::Borrowed(text);
	}

	const ENTITIES: &[(&str, char)] = &[("&amp;", '&'), ("&lt;", '<'), ("&gt;", '>'), ("&quot;", '"'), ("&#39;", '\''), ("&#x27;", '\''), ("&apos;", '\'')];
	let mut decoded = String::with_capacity(text.len());
	let mut rest = text;
	'outer: while let Some(start) = rest.find('&') {
		decoded.push_str(&rest[..start]);
		rest = &rest[start..];
		for (entity, replacement) in ENTITIES {
			if let Some(tail) = rest.strip_prefix(entity) {
				decoded.push(*replacement);
				rest = tail;
				continue 'outer;
			}
		}
		decoded.push('&');
		rest = &rest[1..];
	}
	decoded.push_str(rest);
	Cow::Owned(decoded)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
	Number(f64),
	Str(String),
	Ident(String),
	Punct(&'static str),
}

impl fmt::Display for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Number(n) => write!(f, "{}", n),
			Self::Str(s) => write!(f, "{:?}", s),
			Self::Ident(i) => f.write_str(i),
			Self::Punct(p) => write!(f, "`{}`", p),
		}
	}
}

const PUNCTUATION: &[&str] = &["===", "!==", "==", "!=", ">=", "<=", "&&", "||", ">", "<", "!", "(", ")", "?", ":", ".", "[", "]", "-"];

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ExprError> {
	let mut tokens = Vec::new();
	let mut chars = source.char_indices().peekable();
	while let Some(&(at, c)) = chars.peek() {
		if c.is_whitespace() {
			chars.next();
		} else if c.is_ascii_digit() {
			let mut end = at;
			let mut seen_dot = false;
			while let Some(&(i, c)) = chars.peek() {
				if c.is_ascii_digit() {
					end = i + 1;
					chars.next();
				} else if c == '.' && !seen_dot && source[i + 1..].starts_with(|c: char| c.is_ascii_digit()) {
					seen_dot = true;
					end = i + 1;
					chars.next();
				} else {
					break;
				}
			}
			let literal = &source[at..end];
			let number = literal.parse().map_err(|_| ExprError::InvalidNumber(literal.to_owned()))?;
			tokens.push((Token::Number(number), at));
		} else if c == '\'' || c == '"' {
			chars.next();
			let mut literal = String::new();
			let mut closed = false;
			while let Some((_, next)) = chars.next() {
				match next {
					'\\' => {
						if let Some((_, escaped)) = chars.next() {
							literal.push(escaped);
						}
					}
					quote if quote == c => {
						closed = true;
						break;
					}
					other => literal.push(other),
				}
			}
			if !closed {
				return Err(ExprError::UnterminatedString(at));
			}
			tokens.push((Token::Str(literal), at));
		} else if c.is_alphabetic() || c == '_' || c == '$' {
			let mut end = at;
			while let Some(&(i, c)) = chars.peek() {
				if c.is_alphanumeric() || c == '_' || c == '$' {
					end = i + c.len_utf8();
					chars.next();
				} else {
					break;
				}
			}
			tokens.push((Token::Ident(source[at..end].to_owned()), at));
		} else {
			let punct = PUNCTUATION
				.iter()
				.find(|p| source[at..].starts_with(**p))
				.ok_or(ExprError::UnexpectedChar { found: c, at })?;
			for _ in 0..punct.len() {
				chars.next();
			}
			tokens.push((Token::Punct(punct), at));
		}
	}
	Ok(tokens)
}

struct Parser<'a> {
	tokens: &'a [(Token, usize)],
	position: usize,
}

impl Parser<'_> {
	fn peek(&self) -> Option<&Token> {
		self.tokens.get(self.position).map(|(token, _)| token)
	}

	fn eat(&mut self, punct: &str) -> bool {
		if matches!(self.peek(), Some(Token::Punct(p)) if *p == punct) {
			self.position += 1;
			true
		} else {
			false
		}
	}

	fn next(&mut self) -> Result<(Token, usize), ExprError> {
		let token = self.tokens.get(self.position).cloned().ok_or(ExprError::UnexpectedEnd)?;
		self.position += 1;
		Ok(token)
	}

	fn unexpected((token, at): (Token, usize)) -> ExprError {
		ExprError::UnexpectedToken { found: token.to_string(), at }
	}

	fn conditional(&mut self) -> Result<Expr, ExprError> {
		let condition = self.or()?;
		if !self.eat("?") {
			return Ok(condition);
		}
		let then = self.conditional()?;
		if !self.eat(":") {
			return Err(match self.next() {
				Ok(token) => Self::unexpected(token),
				Err(error) => error,
			});
		}
		let otherwise = self.conditional()?;
		Ok(Expr::Conditional(Box::new(condition), Box::new(then), Box::new(otherwise)))
	}

	fn or(&mut self) -> Result<Expr, ExprError> {
		let mut left = self.and()?;
		while self.eat("||") {
			left = Expr::Or(Box::new(left), Box::new(self.and()?));
		}
		Ok(left)
	}

	fn and(&mut self) -> Result<Expr, ExprError> {
		let mut left = self.equality()?;
		while self.eat("&&") {
			left = Expr::And(Box::new(left), Box::new(self.equality()?));
		}
		Ok(left)
	}

	fn equality(&mut self) -> Result<Expr, ExprError> {
		let mut left = self.relational()?;
		loop {
			let op = match self.peek() {
				Some(Token::Punct("===")) => BinaryOp::StrictEq,
				Some(Token::Punct("!==")) => BinaryOp::StrictNe,
				Some(Token::Punct("==")) => BinaryOp::LooseEq,
				Some(Token::Punct("!=")) => BinaryOp::LooseNe,
				_ => return Ok(left),
			};
			self.position += 1;
			left = Expr::Binary(op, Box::new(left), Box::new(self.relational()?));
		}
	}

	fn relational(&mut self) -> Result<Expr, ExprError> {
		let mut left = self.unary()?;
		loop {
			let op = match self.peek() {
				Some(Token::Punct("<")) => BinaryOp::Lt,
				Some(Token::Punct("<=")) => BinaryOp::Le,
				Some(Token::Punct(">")) => BinaryOp::Gt,
				Some(Token::Punct(">=")) => BinaryOp::Ge,
				_ => return Ok(left),
			};
			self.position += 1;
			left = Expr::Binary(op, Box::new(left), Box::new(self.unary()?));
		}
	}

	fn unary(&mut self) -> Result<Expr, ExprError> {
		if self.eat("!") {
			Ok(Expr::Not(Box::new(self.unary()?)))
		} else if self.eat("-") {
			Ok(Expr::Neg(Box::new(self.unary()?)))
		} else {
			self.primary()
		}
	}

	fn primary(&mut self) -> Result<Expr, ExprError> {
		match self.next()? {
			(Token::Number(n), _) => Ok(Expr::Literal(number_value(n))),
			(Token::Str(s), _) => Ok(Expr::Literal(Value::String(s))),
			(Token::Punct("("), _) => {
				let inner = self.conditional()?;
				if self.eat(")") {
					Ok(inner)
				} else {
					Err(match self.next() {
						Ok(token) => Self::unexpected(token),
						Err(error) => error,
					})
				}
			}
			(Token::Ident(ident), _) => match ident.as_str() {
				"true" => Ok(Expr::Literal(Value::Bool(true))),
				"false" => Ok(Expr::Literal(Value::Bool(false))),
				"null" => Ok(Expr::Literal(Value::Null)),
				"undefined" => Ok(Expr::Undefined),
				_ => self.path(ident),
			},
			token => Err(Self::unexpected(token)),
		}
	}

	fn path(&mut self, root: String) -> Result<Expr, ExprError> {
		let mut segments = vec![Segment::Key(root)];
		loop {
			if self.eat(".") {
				segments.push(match self.next()? {
					(Token::Ident(key), _) => Segment::Key(key),
					(Token::Number(n), at) => index_segment(n).ok_or_else(|| Self::unexpected((Token::Number(n), at)))?,
					token => return Err(Self::unexpected(token)),
				});
			} else if self.eat("[") {
				segments.push(match self.next()? {
					(Token::Str(key), _) => Segment::Key(key),
					(Token::Number(n), at) => index_segment(n).ok_or_else(|| Self::unexpected((Token::Number(n), at)))?,
					token => return Err(Self::unexpected(token)),
				});
				if !self.eat("]") {
					return Err(match self.next() {
						Ok(token) => Self::unexpected(token),
						Err(error) => error,
					});
				}
			} else {
				return Ok(Expr::Path(Path::from_segments(segments)));
			}
		}
	}
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn index_segment(n: f64) -> Option<Segment> {
	if n >= 0.0 && n.fract() == 0.0 && n <= usize::MAX as f64 {
		Some(Segment::Index(n as usize))
	} else {
		None
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn eval(source: &str, state: &Value) -> bool {
		Expr::parse(source).unwrap().evaluate_bool(state)
	}

	#[test]
	fn comparisons_and_logic() {
		let state = json!({ "count": 3, "name": "ada", "flags": { "on": true }, "items": [1, 2] });
		assert!(eval("count > 2 && count <= 3", &state));
		assert!(eval("name === 'ada' || missing", &state));
		assert!(eval("!(count === 4)", &state));
		assert!(eval("flags.on", &state));
		assert!(eval("items.length === 2", &state));
		assert!(eval("items[1] >= 2", &state));
		assert!(eval("count == '3'", &state));
		assert!(!eval("count === '3'", &state));
		assert!(eval("-1 < count", &state));
	}

	#[test]
	fn undefined_references_are_falsy() {
		let state = json!({});
		assert!(!eval("missing", &state));
		assert!(!eval("missing.deeper.still", &state));
		assert!(eval("!missing", &state));
		assert!(!eval("missing > 0", &state));
		assert!(eval("missing === undefined", &state));
		assert!(eval("missing == null", &state));
		assert!(!eval("missing === null", &state));
	}

	#[test]
	fn ternary_yields_operands() {
		let state = json!({ "done": true });
		let expr = Expr::parse("done ? 'completed' : ''").unwrap();
		assert_eq!(expr.evaluate(&state), Some(json!("completed")));
	}

	#[test]
	fn parse_errors() {
		assert!(matches!(Expr::parse("count >"), Err(ExprError::UnexpectedEnd)));
		assert!(matches!(Expr::parse("a = 1"), Err(ExprError::UnexpectedChar { found: '=', .. })));
		assert!(matches!(Expr::parse("'open"), Err(ExprError::UnterminatedString(0))));
		assert!(matches!(Expr::parse("a b"), Err(ExprError::Trailing(2))));
		assert!(matches!(Expr::parse("(a"), Err(ExprError::UnexpectedEnd)));
	}

	#[test]
	fn entities() {
		assert_eq!(decode_entities("a &amp;&amp; b &gt; 1"), "a && b > 1");
		assert_eq!(decode_entities("x === &#39;y&#39; &unknown;"), "x === 'y' &unknown;");
		assert!(matches!(decode_entities("plain"), Cow::Borrowed(_)));
	}
}

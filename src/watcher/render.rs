//! Command template rendering.
//!
//! Templates are rendered with minijinja in strict mode: referencing a value
//! that does not exist is an error rather than an empty string. Field
//! references may be written with a leading dot (`{{ .Path }}`,
//! `{{ .Vars.dest }}`) as in existing configuration files; the dot is
//! dropped before parsing.

use std::borrow::Cow;
use std::collections::BTreeMap;

use minijinja::{AutoEscape, Environment, UndefinedBehavior, Value};
use serde::Serialize;

use crate::error::DispatchError;

/// Global template variables from the configuration.
pub type Vars = BTreeMap<String, toml::Value>;

/// Values visible to a command template for one event.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchContext<'a> {
    #[serde(rename = "Path")]
    pub path: Cow<'a, str>,
    #[serde(rename = "Vars")]
    pub vars: &'a Vars,
}

/// Renders command templates. Rendering has no side effects.
#[derive(Debug)]
pub struct CommandRenderer {
    env: Environment<'static>,
}

impl CommandRenderer {
    #[must_use]
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);

        env.add_filter("trim", trim);
        env.add_filter("trimset", trimset);
        env.add_filter("join", join);
        env.add_filter("lower", lower);
        env.add_filter("upper", upper);

        env.add_function("trim", trim);
        env.add_function("trimset", trimset);
        env.add_function("join", join);
        env.add_function("lower", lower);
        env.add_function("upper", upper);

        Self { env }
    }

    /// Render `template` against `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Render`] if the template is malformed or
    /// references an undefined value.
    pub fn render(
        &self,
        template: &str,
        ctx: &DispatchContext<'_>,
    ) -> std::result::Result<String, DispatchError> {
        let source = strip_field_dots(template);
        self.env
            .render_str(&source, ctx)
            .map_err(|e| render_error(&e, template))
    }

    /// Check that `template` parses, without evaluating it.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Render`] on syntax errors.
    pub fn validate(&self, template: &str) -> std::result::Result<(), DispatchError> {
        let source = strip_field_dots(template);
        self.env
            .template_from_str(&source)
            .map(|_| ())
            .map_err(|e| render_error(&e, template))
    }
}

const HELPERS: [&str; 5] = ["trim", "trimset", "join", "lower", "upper"];

fn render_error(err: &minijinja::Error, template: &str) -> DispatchError {
    match call_syntax_helper(template) {
        Some(name) => DispatchError::render(format!(
            "{err} (helpers are written as filters, e.g. {{{{ .Path | {name} }}}})"
        )),
        None => DispatchError::render(err.to_string()),
    }
}

/// Name of a helper invoked with space-separated arguments, as in
/// `{{ lower .Path }}`.
fn call_syntax_helper(template: &str) -> Option<&'static str> {
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let tag = &rest[start + 2..];
        let end = tag.find("}}").unwrap_or(tag.len());
        let body = tag[..end].trim_matches(|c: char| c == '-' || c.is_whitespace());

        let mut parts = body.splitn(2, char::is_whitespace);
        let head = parts.next().unwrap_or_default();
        let args = parts.next().unwrap_or_default().trim_start();
        if let Some(name) = HELPERS.iter().find(|h| **h == head) {
            if !args.is_empty() && !args.starts_with(['(', '|']) {
                return Some(*name);
            }
        }

        rest = &tag[end..];
    }
    None
}

impl Default for CommandRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop the leading dot of field references inside `{{ }}` and `{% %}`.
///
/// A dot is a field-reference dot when it is followed by an identifier and
/// does not continue an expression (`Vars.x`, `f().x`, `1.5` keep theirs).
/// String literals are left alone.
fn strip_field_dots(template: &str) -> Cow<'_, str> {
    if !template.contains('.') {
        return Cow::Borrowed(template);
    }

    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut in_tag = false;
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            prev = Some(c);
            continue;
        }

        if !in_tag {
            out.push(c);
            if c == '{' {
                if let Some(&open @ ('{' | '%')) = chars.peek() {
                    chars.next();
                    out.push(open);
                    in_tag = true;
                    prev = Some(open);
                    continue;
                }
            }
            prev = Some(c);
            continue;
        }

        match c {
            '}' | '%' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push(c);
                out.push('}');
                in_tag = false;
            }
            '"' | '\'' => {
                quote = Some(c);
                out.push(c);
            }
            '.' if starts_ident(chars.peek()) && !continues_expr(prev) => {}
            _ => out.push(c),
        }
        prev = Some(c);
    }

    Cow::Owned(out)
}

fn starts_ident(c: Option<&char>) -> bool {
    c.is_some_and(|c| c.is_ascii_alphabetic() || *c == '_')
}

fn continues_expr(prev: Option<char>) -> bool {
    prev.is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | ')' | ']'))
}

fn trim(value: String) -> String {
    value.trim().to_string()
}

fn trimset(value: String, cutset: String) -> String {
    value.trim_matches(|c| cutset.contains(c)).to_string()
}

fn join(values: Value, sep: Option<String>) -> std::result::Result<String, minijinja::Error> {
    let sep = sep.unwrap_or_default();
    let items: Vec<String> = values.try_iter()?.map(|v| v.to_string()).collect();
    Ok(items.join(&sep))
}

fn lower(value: String) -> String {
    value.to_lowercase()
}

fn upper(value: String) -> String {
    value.to_uppercase()
}

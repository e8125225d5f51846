//! Path template compilation.
//!
//! Templates are literal paths with placeholders:
//!
//! - `{name}` captures one or more non-`/` characters.
//! - `{name?}` captures zero or more non-`/` characters and may only be the
//!   final token. When it directly follows a `/`, that slash is optional too,
//!   so `/blog/{page?}` matches `/blog`, `/blog/` and `/blog/2`.
//!
//! Literal text is matched exactly: no trailing-slash normalization and no
//! case folding.

use regex::Regex;

use trees_core::error::AppError;
use trees_core::result::AppResult;

/// A compiled path template.
#[derive(Debug, Clone)]
pub struct PathPattern {
    /// The original template.
    template: String,
    /// Anchored matcher.
    regex: Regex,
    /// Placeholder names in capture order.
    names: Vec<String>,
}

impl PathPattern {
    /// Compiles a template into an anchored matcher.
    pub fn compile(template: &str) -> AppResult<Self> {
        let mut source = String::from("^");
        let mut names = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            let (literal, tail) = rest.split_at(open);
            if literal.contains('}') {
                return Err(AppError::validation(format!(
                    "Unmatched '}}' in route '{}'",
                    template
                )));
            }
            let close = tail.find('}').ok_or_else(|| {
                AppError::validation(format!("Unclosed placeholder in route '{}'", template))
            })?;

            let raw = &tail[1..close];
            let (name, optional) = match raw.strip_suffix('?') {
                Some(name) => (name, true),
                None => (raw, false),
            };

            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(AppError::validation(format!(
                    "Invalid placeholder '{{{}}}' in route '{}'",
                    raw, template
                )));
            }

            rest = &tail[close + 1..];

            if optional {
                if !rest.is_empty() {
                    return Err(AppError::validation(format!(
                        "Optional placeholder '{{{}}}' must be the last segment of route '{}'",
                        raw, template
                    )));
                }
                match literal.strip_suffix('/') {
                    Some(prefix) => {
                        source.push_str(&regex::escape(prefix));
                        source.push_str("(?:/([^/]*))?");
                    }
                    None => {
                        source.push_str(&regex::escape(literal));
                        source.push_str("([^/]*)");
                    }
                }
            } else {
                source.push_str(&regex::escape(literal));
                source.push_str("([^/]+)");
            }

            names.push(name.to_string());
        }

        if rest.contains('}') {
            return Err(AppError::validation(format!(
                "Unmatched '}}' in route '{}'",
                template
            )));
        }

        source.push_str(&regex::escape(rest));
        source.push('$');

        Ok(Self {
            template: template.to_string(),
            regex: Regex::new(&source)?,
            names,
        })
    }

    /// Returns the captured values if `path` matches.
    ///
    /// An absent optional placeholder yields an empty string so positions
    /// stay stable.
    pub fn captures(&self, path: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(path)?;
        Some(
            (1..=self.names.len())
                .map(|i| caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect(),
        )
    }

    /// Returns the original template.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns placeholder names in capture order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

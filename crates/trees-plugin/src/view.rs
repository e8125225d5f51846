//! File-backed view collaborator scoped to one plugin's `views/` directory.
//!
//! Template names use dot notation (`blogs.index` → `blogs/index.html`).
//! The only substitution is `{{ key }}`, where `key` may be a dotted path
//! into the data map. String values are HTML-escaped; missing keys render
//! as the empty string.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::debug;

use trees_core::error::AppError;
use trees_core::result::AppResult;
use trees_core::traits::ViewRenderer;

/// Directory name of a plugin's templates.
pub const VIEWS_DIR: &str = "views";

/// Template file extension.
const TEMPLATE_EXT: &str = "html";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder regex")
});

/// Renders templates from a single directory.
#[derive(Debug, Clone)]
pub struct View {
    /// Template root.
    root: PathBuf,
}

impl View {
    /// Creates a view rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves a dot-notation template name to its file.
    pub fn resolve(&self, template: &str) -> AppResult<PathBuf> {
        let segments: Vec<&str> = template.split('.').collect();
        if segments
            .iter()
            .any(|s| s.is_empty() || s.contains(['/', '\\']))
        {
            return Err(AppError::validation(format!(
                "Invalid template name '{}'",
                template
            )));
        }

        let mut path = self.root.clone();
        for segment in &segments {
            path.push(segment);
        }
        path.set_extension(TEMPLATE_EXT);
        Ok(path)
    }
}

impl ViewRenderer for View {
    fn render(&self, template: &str, data: &Map<String, Value>) -> AppResult<String> {
        let path = self.resolve(template)?;
        let source = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("View '{}' not found at {}", template, path.display()))
            } else {
                AppError::from(e)
            }
        })?;

        debug!(template = %template, path = %path.display(), "Rendering view");

        Ok(PLACEHOLDER
            .replace_all(&source, |caps: &Captures<'_>| {
                lookup(data, &caps[1]).map(display).unwrap_or_default()
            })
            .into_owned())
    }
}

fn lookup<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    let mut parts = key.split('.');
    let mut current = data.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => escape(s),
        other => escape(&other.to_string()),
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use trees_core::ErrorKind;

    use super::*;

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_dot_notation_resolves_nested_file() {
        let view = View::new("/plugins/blog/views");
        assert_eq!(
            view.resolve("blogs.index").unwrap(),
            PathBuf::from("/plugins/blog/views/blogs/index.html")
        );
        assert!(view.resolve("blogs..index").is_err());
    }

    #[test]
    fn test_render_substitutes_and_escapes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("blogs")).unwrap();
        std::fs::write(
            dir.path().join("blogs/show.html"),
            "<h1>{{ post.title }}</h1><p>{{post.views}}</p>{{ missing }}",
        )
        .unwrap();

        let view = View::new(dir.path());
        let html = view
            .render(
                "blogs.show",
                &data(json!({"post": {"title": "Fish & <Chips>", "views": 3}})),
            )
            .unwrap();

        assert_eq!(html, "<h1>Fish &amp; &lt;Chips&gt;</h1><p>3</p>");
    }

    #[test]
    fn test_missing_template_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = View::new(dir.path()).render("nope", &Map::new()).unwrap_err();
        assert!(err.is(ErrorKind::NotFound));
    }
}

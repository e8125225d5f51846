//! Requirement checks run before a plugin is booted or offered for activation.
//!
//! Runtime constraints are comma-separated comparators over dotted numeric
//! versions: `>=`, `>`, `<=`, `<`, `=`, `^` (same major, at least) and `~`
//! (same major.minor, at least). A bare version means "at least".

use std::cmp::Ordering;

use serde::Serialize;

use trees_core::error::AppError;
use trees_core::result::AppResult;

use crate::descriptor::Requirements;

/// Outcome of a requirement check. Never mutates runtime state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequirementReport {
    /// `true` when `errors` is empty.
    pub valid: bool,
    /// Human-readable reasons the plugin cannot be activated.
    pub errors: Vec<String>,
}

impl RequirementReport {
    /// Builds a report from collected errors.
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Checks runtime-version and capability constraints against the host.
pub fn host_errors(
    requires: &Requirements,
    runtime_version: &str,
    capabilities: &[String],
) -> Vec<String> {
    let mut errors = Vec::new();

    if let Some(constraint) = requires.runtime_version.as_deref() {
        match version_satisfies(constraint, runtime_version) {
            Ok(true) => {}
            Ok(false) => errors.push(format!(
                "Requires runtime {} but {} is running",
                constraint, runtime_version
            )),
            Err(e) => errors.push(e.message),
        }
    }

    for capability in &requires.capabilities {
        if !capabilities.contains(capability) {
            errors.push(format!("Requires capability '{}'", capability));
        }
    }

    errors
}

/// Returns whether `version` satisfies every comparator in `constraint`.
pub fn version_satisfies(constraint: &str, version: &str) -> AppResult<bool> {
    let actual = parse_version(version)?;

    for comparator in constraint.split(',').map(str::trim) {
        if comparator.is_empty() || comparator == "*" {
            continue;
        }

        let (op, target) = split_operator(comparator);
        let wanted = parse_version(target)?;
        let ordering = actual.cmp(&wanted);

        let ok = match op {
            ">=" | "" => ordering != Ordering::Less,
            ">" => ordering == Ordering::Greater,
            "<=" => ordering != Ordering::Greater,
            "<" => ordering == Ordering::Less,
            "=" | "==" => ordering == Ordering::Equal,
            "^" => actual[0] == wanted[0] && ordering != Ordering::Less,
            "~" => actual[..2] == wanted[..2] && ordering != Ordering::Less,
            other => {
                return Err(AppError::validation(format!(
                    "Unknown version operator '{}'",
                    other
                )));
            }
        };

        if !ok {
            return Ok(false);
        }
    }

    Ok(true)
}

fn split_operator(comparator: &str) -> (&str, &str) {
    for op in [">=", "<=", "==", ">", "<", "=", "^", "~"] {
        if let Some(rest) = comparator.strip_prefix(op) {
            return (op, rest.trim());
        }
    }
    ("", comparator)
}

/// Parses `major[.minor[.patch]]`, ignoring pre-release and build suffixes.
fn parse_version(text: &str) -> AppResult<[u64; 3]> {
    let core = text
        .trim()
        .trim_start_matches('v')
        .split(['-', '+'])
        .next()
        .unwrap_or_default();

    let mut parts = [0_u64; 3];
    let mut count = 0;
    for (slot, piece) in parts.iter_mut().zip(core.split('.')) {
        *slot = piece
            .parse()
            .map_err(|_| AppError::validation(format!("Invalid version '{}'", text)))?;
        count += 1;
    }

    if count == 0 || core.split('.').count() > 3 {
        return Err(AppError::validation(format!("Invalid version '{}'", text)));
    }

    Ok(parts)
}

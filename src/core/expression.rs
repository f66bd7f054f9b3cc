//! `${{ ... }}` expression substitution
//!
//! Workflow files reference runtime values with `${{ context.path }}`. Only plain
//! context paths are supported (`github.ref`, `env.NAME`, `secrets.NAME`,
//! `steps.<id>.outputs.<key>`, ...). A path with no value renders as the empty string.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;

fn expression_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{\{\s*([^}]*?)\s*\}\}").expect("expression pattern is valid")
    })
}

/// Replace every `${{ path }}` in `template` with its value from `vars`
pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
    expression_regex()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let path = &caps[1];
            match vars.get(path) {
                Some(value) => value.clone(),
                None => {
                    warn!("Expression '{}' has no value, rendering as empty string", path);
                    String::new()
                }
            }
        })
        .into_owned()
}

/// All context paths referenced by `template`, in order of appearance
pub fn references(template: &str) -> Vec<String> {
    expression_regex()
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Reject templates with an opening `${{` that is never closed
pub fn check_syntax(template: &str) -> Result<(), String> {
    let mut rest = template;
    while let Some(start) = rest.find("${{") {
        let after = &rest[start + 3..];
        match after.find("}}") {
            Some(end) => {
                if after[..end].trim().is_empty() {
                    return Err(format!("empty expression in '{}'", template));
                }
                rest = &after[end + 2..];
            }
            None => return Err(format!("unterminated expression in '{}'", template)),
        }
    }
    Ok(())
}

/// The step id referenced by a `steps.<id>.…` path
pub fn referenced_step(path: &str) -> Option<&str> {
    path.strip_prefix("steps.")
        .and_then(|rest| rest.split('.').next())
        .filter(|id| !id.is_empty())
}

//! Inline template directive scanning
//!
//! Templates declare the templates they build on with inline markers:
//! `{prototype base}` inherits another definition, `{render partial}`
//! embeds one. Both force the referenced template to be loaded first.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{[ \t]*(prototype|render)[ \t]+([^\s{}]+)[ \t]*\}")
        .expect("directive pattern is valid")
});

/// Template names referenced by `{prototype ..}` / `{render ..}`
/// directives, in first-occurrence order with duplicates dropped
pub(crate) fn scan(source: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for caps in DIRECTIVE.captures_iter(source) {
        let name = &caps[2];
        if seen.insert(name.to_string()) {
            names.push(name.to_string());
        }
    }
    names
}

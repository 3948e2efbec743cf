//! Match Engine
//!
//! Patterns follow prefix-match semantics: every pattern is anchored at the
//! start of the text. Host patterns are additionally anchored at the end.
//! Compiled patterns are memoized by their text.

use crate::config::compile_time::matching::{MAX_PATTERN_CACHE_ENTRIES, SITE_SEPARATOR};
use crate::error::{CompileError, CompileResult};
use crate::log_error;
use crate::topology::HostSpec;
use regex::Regex;
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

/// Capture groups of one successful match, unmatched groups as ""
pub type Captures = Vec<String>;

/// Pattern matcher with a memo of compiled regexes keyed by pattern text.
/// The memo holds at most `MAX_PATTERN_CACHE_ENTRIES` patterns and is cleared
/// when that bound is reached.
pub struct Matcher {
    separator: char,
    patterns: Mutex<HashMap<String, Arc<Regex>>>,
}

impl Matcher {
    pub fn new() -> Self {
        Self::with_separator(SITE_SEPARATOR)
    }

    pub fn with_separator(separator: char) -> Self {
        Self {
            separator,
            patterns: Mutex::new(HashMap::new()),
        }
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    /// Number of memoized patterns
    pub fn cached_patterns(&self) -> usize {
        self.patterns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn regex(&self, pattern: &str) -> CompileResult<Arc<Regex>> {
        let mut patterns = self.patterns.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(regex) = patterns.get(pattern) {
            return Ok(Arc::clone(regex));
        }

        let regex = Regex::new(&format!("^(?:{})", pattern))
            .map(Arc::new)
            .map_err(|e| {
                let err = CompileError::invalid_pattern(pattern, &e);
                log_error!(err.error_code(), "Pattern does not compile", "pattern" => pattern);
                err
            })?;

        if patterns.len() >= MAX_PATTERN_CACHE_ENTRIES {
            patterns.clear();
        }
        patterns.insert(pattern.to_string(), Arc::clone(&regex));
        Ok(regex)
    }

    /// Match `pattern` against the start of `text`
    pub fn match_text(&self, pattern: &str, text: &str) -> CompileResult<Option<Captures>> {
        let regex = self.regex(pattern)?;
        Ok(regex.captures(text).map(|caps| {
            caps.iter()
                .skip(1)
                .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect()
        }))
    }

    /// Host pattern with the implicit end anchor
    pub fn anchor_host_pattern(pattern: &str) -> Cow<'_, str> {
        if pattern.ends_with('$') {
            Cow::Borrowed(pattern)
        } else {
            Cow::Owned(format!("{}$", pattern))
        }
    }

    /// Match a host pattern. Patterns containing the separator are matched
    /// against `site<SEP>host`, all others against the bare host name.
    pub fn match_host(&self, pattern: &str, host: &HostSpec) -> CompileResult<Option<Captures>> {
        let anchored = Self::anchor_host_pattern(pattern);
        if pattern.contains(self.separator) {
            self.match_text(&anchored, &host.qualified(self.separator))
        } else {
            self.match_text(&anchored, &host.host)
        }
    }

    /// Match a service pattern (prefix match)
    pub fn match_service(&self, pattern: &str, service: &str) -> CompileResult<Option<Captures>> {
        self.match_text(pattern, service)
    }

    /// All expressions must hold. `!tag` requires the tag to be absent.
    pub fn match_tags<S: AsRef<str>>(have: &BTreeSet<String>, required: &[S]) -> bool {
        required.iter().all(|expr| {
            let expr = expr.as_ref();
            match expr.strip_prefix('!') {
                Some(tag) => !have.contains(tag),
                None => have.contains(expr),
            }
        })
    }

    /// Replace `$1$`, `$2$`, ... with the corresponding capture
    pub fn substitute(template: &str, captures: &[String]) -> String {
        let mut result = template.to_string();
        for (index, capture) in captures.iter().enumerate() {
            result = result.replace(&format!("${}$", index + 1), capture);
        }
        result
    }

    /// Replace `$name$` with the bound value, in binding order
    pub fn substitute_named(template: &str, bindings: &[(String, String)]) -> String {
        let mut result = template.to_string();
        for (name, value) in bindings {
            result = result.replace(&format!("${}$", name), value);
        }
        result
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

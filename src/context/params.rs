use indexmap::IndexMap;
use serde_json::Value;

use crate::ast::Literal;

/// Which namespace a parameter belongs to. Sensitive values (credentials,
/// object-storage secrets) get a distinguished name suffix so downstream
/// logging can redact them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Plain,
    Sensitive,
}

#[derive(Clone, PartialEq)]
struct ParamEntry {
    value: Literal,
    kind: ParamKind,
}

/// Ordered literal-to-placeholder table for one compilation.
///
/// Names are assigned in first-use order (`val_0`, `val_1`, ...; sensitive
/// values under `val_sensitive_N`) and are never reused for a different
/// value within one context lifetime. Re-adding an identical plain literal
/// returns the existing placeholder.
#[derive(Default, Clone, PartialEq)]
pub struct ParamCollector {
    entries: IndexMap<String, ParamEntry>,
    next_plain: usize,
    next_sensitive: usize,
}

impl ParamCollector {
    pub fn add_value(&mut self, value: Literal) -> String {
        for (name, entry) in &self.entries {
            if entry.kind == ParamKind::Plain && entry.value == value {
                return name.clone();
            }
        }
        let name = format!("val_{}", self.next_plain);
        self.next_plain += 1;
        self.entries.insert(name.clone(), ParamEntry { value, kind: ParamKind::Plain });
        name
    }

    /// Sensitive values are never de-duplicated against the plain namespace
    /// and never against each other, so two secrets with the same bytes stay
    /// separately redactable.
    pub fn add_sensitive_value(&mut self, value: Literal) -> String {
        let name = format!("val_sensitive_{}", self.next_sensitive);
        self.next_sensitive += 1;
        self.entries.insert(name.clone(), ParamEntry { value, kind: ParamKind::Sensitive });
        name
    }

    pub fn get(&self, name: &str) -> Option<&Literal> {
        self.entries.get(name).map(|e| &e.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// The parameter map as returned to the caller.
    pub fn to_json(&self) -> IndexMap<String, Value> {
        self.entries.iter().map(|(name, entry)| (name.clone(), entry.value.to_json())).collect()
    }
}

impl std::fmt::Debug for ParamCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (name, entry) in &self.entries {
            match entry.kind {
                ParamKind::Plain => map.entry(&name, &entry.value),
                ParamKind::Sensitive => map.entry(&name, &"<redacted>"),
            };
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_assigned_in_first_use_order() {
        let mut params = ParamCollector::default();
        assert_eq!(params.add_value(Literal::string("a")), "val_0");
        assert_eq!(params.add_value(Literal::string("b")), "val_1");
        assert_eq!(params.add_value(Literal::string("a")), "val_0"); // dedup
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn sensitive_namespace_is_separate_and_never_deduplicated() {
        let mut params = ParamCollector::default();
        params.add_value(Literal::string("secret"));
        assert_eq!(params.add_sensitive_value(Literal::string("secret")), "val_sensitive_0");
        assert_eq!(params.add_sensitive_value(Literal::string("secret")), "val_sensitive_1");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn debug_output_redacts_sensitive_entries() {
        let mut params = ParamCollector::default();
        params.add_sensitive_value(Literal::string("hunter2"));
        let rendered = format!("{params:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("redacted"));
    }
}

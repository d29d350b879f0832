use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

static PLAIN_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid pattern"));

/// Words that must be quoted even when they look like plain identifiers.
static RESERVED: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "all", "and", "anti", "any", "array", "as", "asc", "asof", "between", "both", "by", "case", "cast",
        "cross", "cube", "desc", "distinct", "else", "end", "except", "final", "first", "for", "from", "full",
        "group", "having", "if", "ilike", "in", "inner", "intersect", "interval", "is", "join", "last", "left",
        "like", "limit", "not", "null", "offset", "on", "or", "order", "outer", "over", "prewhere", "right",
        "sample", "select", "semi", "then", "to", "top", "totals", "union", "using", "when", "where", "window",
        "with",
    ])
});

/// Quote an identifier when it is not a plain unreserved word. Backticks and
/// backslashes inside the name are escaped.
pub fn quote_identifier(name: &str) -> String {
    if PLAIN_IDENT.is_match(name) && !RESERVED.contains(name.to_lowercase().as_str()) {
        return name.to_string();
    }
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_pass_through() {
        assert_eq!(quote_identifier("events"), "events");
        assert_eq!(quote_identifier("_offset"), "_offset");
    }

    #[test]
    fn odd_characters_force_backticks() {
        assert_eq!(quote_identifier("$session_id"), "`$session_id`");
        assert_eq!(quote_identifier("utm source"), "`utm source`");
        assert_eq!(quote_identifier("a`b"), "`a\\`b`");
    }

    #[test]
    fn reserved_words_are_quoted_case_insensitively() {
        assert_eq!(quote_identifier("from"), "`from`");
        assert_eq!(quote_identifier("Select"), "`Select`");
    }
}

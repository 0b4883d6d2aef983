//! SQL identifier quoting and validation.

use regex::Regex;
use std::sync::OnceLock;

/// Quote a SQL identifier with backticks, the dialect this workspace
/// generates everywhere. Embedded backticks are doubled.
///
/// # Examples
///
/// ```
/// use lazylink_core::quote_ident;
///
/// assert_eq!(quote_ident("category"), "`category`");
/// assert_eq!(quote_ident("weird`name"), "`weird``name`");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn ident_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
    })
}

/// Check whether a name is a plain SQL identifier (letters, digits,
/// underscore, not starting with a digit).
///
/// The registry rejects any entity, table, column, or relation name that
/// fails this check, so every name can be embedded in generated SQL.
#[inline]
pub fn is_valid_identifier(name: &str) -> bool {
    ident_pattern().is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting() {
        assert_eq!(quote_ident("product"), "`product`");
        assert_eq!(quote_ident("a`b"), "`a``b`");
    }

    #[test]
    fn valid_identifiers() {
        assert!(is_valid_identifier("category_products"));
        assert!(is_valid_identifier("_hidden"));
        assert!(is_valid_identifier("Category"));
        assert!(is_valid_identifier("p1"));
    }

    #[test]
    fn invalid_identifiers() {
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("name with space"));
        assert!(!is_valid_identifier("drop;table"));
        assert!(!is_valid_identifier("naïve"));
    }
}

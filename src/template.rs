//! `${key}` placeholder expansion for state messages.
//!
//! Expansion is best effort: a placeholder whose key the resolver does not
//! know, or one that is never closed, is copied to the output verbatim.

/// Expands every `${key}` in `template` using `resolve`.
///
/// ```
/// use smart_monitor::template::expand;
///
/// let out = expand("Bad sector on ${name}", |key| (key == "name").then(|| "sda".to_string()));
/// assert_eq!(out, "Bad sector on sda");
/// ```
pub fn expand<F>(template: &str, mut resolve: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let key = &after[..end];
        match resolve(key) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn attrs() -> HashMap<&'static str, String> {
        HashMap::from([("name", "sda".to_string()), ("device", "/dev/sda".to_string())])
    }

    fn lookup<'a>(map: &'a HashMap<&'static str, String>) -> impl FnMut(&str) -> Option<String> + 'a {
        |key| map.get(key).cloned()
    }

    #[test]
    fn test_expand_single_placeholder() {
        let map = attrs();
        assert_eq!(expand("${name} Health is Good", lookup(&map)), "sda Health is Good");
    }

    #[test]
    fn test_expand_multiple_placeholders() {
        let map = attrs();
        assert_eq!(expand("${name} at ${device}", lookup(&map)), "sda at /dev/sda");
    }

    #[test]
    fn test_unknown_placeholder_kept_literal() {
        let map = attrs();
        assert_eq!(expand("on ${agent.name}", lookup(&map)), "on ${agent.name}");
    }

    #[test]
    fn test_unterminated_placeholder_kept_literal() {
        let map = attrs();
        assert_eq!(expand("broken ${name", lookup(&map)), "broken ${name");
    }

    #[test]
    fn test_no_placeholders() {
        let map = attrs();
        assert_eq!(expand("Disk is ok", lookup(&map)), "Disk is ok");
        assert_eq!(expand("", lookup(&map)), "");
    }

    #[test]
    fn test_adjacent_placeholders() {
        let map = attrs();
        assert_eq!(expand("${name}${name}", lookup(&map)), "sdasda");
    }

    proptest! {
        /// Text without markers passes through untouched.
        #[test]
        fn prop_plain_text_is_identity(s in "[^$]*") {
            prop_assert_eq!(expand(&s, |_| Some("x".to_string())), s);
        }

        /// A resolver that knows nothing never changes the template.
        #[test]
        fn prop_unknown_keys_are_identity(s in ".*") {
            prop_assert_eq!(expand(&s, |_| None), s);
        }
    }
}

//! Merge-field substitution for email templates.
//!
//! Templates carry `{{field}}` placeholders; rendering replaces each with
//! the recipient's value from a flat map. Unknown placeholders are left
//! verbatim so a half-configured template is visible in the output rather
//! than silently blanked.

use std::collections::HashMap;

pub fn render(template: &str, values: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match values.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated placeholder, emit as-is.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitutes_known_fields() {
        let vals = values(&[("first_name", "Ada"), ("company_name", "Acme")]);
        let rendered = render("Hi {{first_name}} from {{company_name}}!", &vals);
        assert_eq!(rendered, "Hi Ada from Acme!");
    }

    #[test]
    fn test_unresolved_placeholder_left_verbatim() {
        let vals = values(&[("first_name", "Ada")]);
        let rendered = render("Hi {{first_name}}, re: {{deal_name}}", &vals);
        assert_eq!(rendered, "Hi Ada, re: {{deal_name}}");
    }

    #[test]
    fn test_whitespace_inside_placeholder() {
        let vals = values(&[("email", "ada@example.com")]);
        assert_eq!(render("to: {{ email }}", &vals), "to: ada@example.com");
    }

    #[test]
    fn test_unterminated_placeholder_kept() {
        let vals = values(&[("x", "y")]);
        assert_eq!(render("broken {{x", &vals), "broken {{x");
    }

    #[test]
    fn test_no_placeholders_passthrough() {
        let vals = HashMap::new();
        assert_eq!(render("plain text", &vals), "plain text");
    }
}

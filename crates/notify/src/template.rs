//! `{placeholder}` substitution for subjects and bodies.

use std::collections::BTreeMap;

/// Fill `{name}` placeholders from `values`.
///
/// Unknown placeholders are left as written and `{{` / `}}` produce literal
/// braces.
pub fn render(template: &str, values: &BTreeMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }

        match tail[1..].find('}') {
            Some(end) => {
                let name = &tail[1..=end];
                match values.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&tail[..end + 2]),
                }
                rest = &tail[end + 2..];
            }
            None => {
                out.push_str(tail);
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

    fn values() -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("common_name", "app.example.com".to_string()),
            ("days_left", "7".to_string()),
        ])
    }

    #[test]
    fn test_render_substitutes_known_fields() {
        assert_eq!(
            render("{common_name} expires in {days_left} days", &values()),
            "app.example.com expires in 7 days"
        );
    }

    #[test]
    fn test_render_keeps_unknown_and_escaped() {
        assert_eq!(render("{missing} {{literal}}", &values()), "{missing} {literal}");
        assert_eq!(render("dangling {common_name", &values()), "dangling {common_name");
        assert_eq!(render("", &values()), "");
    }
}

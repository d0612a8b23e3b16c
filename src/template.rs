//! `{{placeholder}}` substitution shared by tags, titles and post bodies.

/// Replace every `{{name}}` in `template` with its value.
///
/// Unknown placeholders are left in place so validation can catch them.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in values {
        out = out.replace(&format!("{{{{{}}}}}", name), value);
    }
    out
}

/// Placeholders still present in `text`, in order of appearance.
pub fn unresolved(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                found.push(format!("{{{{{}}}}}", &after[..end]));
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_replaces_all_occurrences() {
        let out = fill("{{a}}-{{b}}-{{a}}", &[("a", "x"), ("b", "y")]);
        assert_eq!(out, "x-y-x");
    }

    #[test]
    fn test_fill_leaves_unknown() {
        assert_eq!(fill("{{a}} {{c}}", &[("a", "1")]), "1 {{c}}");
    }

    #[test]
    fn test_unresolved() {
        assert_eq!(unresolved("ok {{x}} and {{y}}"), vec!["{{x}}", "{{y}}"]);
        assert!(unresolved("nothing here").is_empty());
        assert!(unresolved("open {{ only").is_empty());
    }
}

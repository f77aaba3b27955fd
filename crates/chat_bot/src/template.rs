//! `{{var}}` template substitution
//!
//! Placeholders resolve against session variables first, then against global
//! bot variables through the `bot.` prefix. Anything unresolved is left in the
//! output verbatim.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

const BOT_PREFIX: &str = "bot.";

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([^{}\s]+)\s*\}\}").expect("Failed to compile placeholder regex")
    })
}

/// Render `text`, substituting session variables and `bot.`-prefixed globals.
///
/// Substitution is a single pass: values that themselves look like
/// placeholders are not expanded again.
pub fn render(
    text: &str,
    session_vars: &HashMap<String, String>,
    globals: &HashMap<String, String>,
) -> String {
    placeholder_regex()
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            session_vars
                .get(name)
                .or_else(|| name.strip_prefix(BOT_PREFIX).and_then(|key| globals.get(key)))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Placeholder names used in `text`, in order of first appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in placeholder_regex().captures_iter(text) {
        let name = caps[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Global variable names referenced through the `bot.` prefix.
pub fn global_references(text: &str) -> Vec<String> {
    placeholders(text)
        .into_iter()
        .filter_map(|name| name.strip_prefix(BOT_PREFIX).map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_session_then_bot_variables() {
        let session = vars(&[("name", "Ann"), ("month", "January")]);
        let globals = vars(&[("name", "GrowthBot")]);

        let out = render(
            "Thanks {{name}} for {{month}}, from {{bot.name}}",
            &session,
            &globals,
        );
        assert_eq!(out, "Thanks Ann for January, from GrowthBot");
    }

    #[test]
    fn test_unresolved_placeholders_left_verbatim() {
        let out = render("Height: {{height}} / {{bot.missing}}", &HashMap::new(), &HashMap::new());
        assert_eq!(out, "Height: {{height}} / {{bot.missing}}");
    }

    #[test]
    fn test_inner_whitespace_tolerated() {
        let out = render("Hi {{ name }}", &vars(&[("name", "Ann")]), &HashMap::new());
        assert_eq!(out, "Hi Ann");
    }

    #[test]
    fn test_values_are_not_expanded_twice() {
        let session = vars(&[("a", "{{b}}"), ("b", "nested")]);
        assert_eq!(render("{{a}}", &session, &HashMap::new()), "{{b}}");
    }

    #[test]
    fn test_placeholder_listing() {
        let text = "{{name}} {{bot.greeting}} {{name}} {{weight}}";
        assert_eq!(placeholders(text), vec!["name", "bot.greeting", "weight"]);
        assert_eq!(global_references(text), vec!["greeting"]);
    }
}

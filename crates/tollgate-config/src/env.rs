use std::sync::OnceLock;

use regex::{Captures, Regex};

/// `{{ env.NAME }}` or `{{ env.NAME | default("value") }}`
fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("must be valid regex")
    })
}

/// Substitute environment placeholders in raw config text
///
/// Runs before TOML parsing so secrets such as provider API keys never have
/// to be committed to the config file. Comment lines are left untouched so
/// a commented-out placeholder cannot fail the load.
pub fn expand_env(input: &str) -> Result<String, String> {
    let mut lines = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_owned());
            continue;
        }
        lines.push(expand_line(line)?);
    }

    let mut output = lines.join("\n");
    if input.ends_with('\n') {
        output.push('\n');
    }
    Ok(output)
}

fn expand_line(line: &str) -> Result<String, String> {
    let mut expanded = String::with_capacity(line.len());
    let mut cursor = 0;

    for captures in placeholder().captures_iter(line) {
        let whole = captures.get(0).expect("group 0 always matches");
        expanded.push_str(&line[cursor..whole.start()]);
        expanded.push_str(&resolve(&captures)?);
        cursor = whole.end();
    }

    expanded.push_str(&line[cursor..]);
    Ok(expanded)
}

fn resolve(captures: &Captures<'_>) -> Result<String, String> {
    let key = &captures[1];
    let Some(var) = key.strip_prefix("env.").filter(|v| !v.is_empty() && !v.contains('.')) else {
        return Err(format!("only variables scoped with 'env.' are supported: `{key}`"));
    };

    match (std::env::var(var), captures.get(2)) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.as_str().to_owned()),
        (Err(_), None) => Err(format!("environment variable not found: `{var}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let input = "[providers.openai]\ntype = \"openai\"\n";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn substitutes_variables() {
        temp_env::with_vars([("TG_KEY", Some("sk-1")), ("TG_URL", Some("http://x"))], || {
            let out = expand_env("api_key = \"{{ env.TG_KEY }}\"\nbase_url = \"{{env.TG_URL}}\"").unwrap();
            assert_eq!(out, "api_key = \"sk-1\"\nbase_url = \"http://x\"");
        });
    }

    #[test]
    fn missing_variable_is_an_error() {
        temp_env::with_var_unset("TG_MISSING", || {
            let err = expand_env("api_key = \"{{ env.TG_MISSING }}\"").unwrap_err();
            assert!(err.contains("TG_MISSING"));
        });
    }

    #[test]
    fn default_applies_only_when_unset() {
        temp_env::with_var_unset("TG_OPTIONAL", || {
            let out = expand_env("x = \"{{ env.TG_OPTIONAL | default(\"fallback\") }}\"").unwrap();
            assert_eq!(out, "x = \"fallback\"");
        });
        temp_env::with_var("TG_OPTIONAL", Some("set"), || {
            let out = expand_env("x = \"{{ env.TG_OPTIONAL | default(\"fallback\") }}\"").unwrap();
            assert_eq!(out, "x = \"set\"");
        });
    }

    #[test]
    fn rejects_unscoped_keys() {
        let err = expand_env("x = \"{{ secrets.KEY }}\"").unwrap_err();
        assert!(err.contains("only variables scoped with 'env.'"));
    }

    #[test]
    fn comments_are_not_expanded() {
        temp_env::with_var_unset("TG_MISSING", || {
            let input = "  # api_key = \"{{ env.TG_MISSING }}\"\n";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }
}

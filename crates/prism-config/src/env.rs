use std::sync::OnceLock;

use regex::{Captures, Regex};

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `{{ env.NAME }}` or `{{ env.NAME | default("value") }}`
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#)
            .expect("placeholder pattern must compile")
    })
}

/// Substitute `{{ env.VAR }}` placeholders in raw configuration text
///
/// A placeholder may carry a fallback, `{{ env.VAR | default("x") }}`, used
/// when the variable is unset. Comment lines are left untouched so that
/// commented-out settings never require their variables to exist.
pub(crate) fn expand_env(input: &str) -> anyhow::Result<String> {
    let mut lines = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_owned());
            continue;
        }

        let mut failure = None;
        let expanded = placeholder().replace_all(line, |caps: &Captures<'_>| match resolve(caps) {
            Ok(value) => value,
            Err(e) => {
                failure.get_or_insert(e);
                String::new()
            }
        });

        if let Some(e) = failure {
            return Err(e);
        }

        lines.push(expanded.into_owned());
    }

    let mut output = lines.join("\n");
    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

fn resolve(caps: &Captures<'_>) -> anyhow::Result<String> {
    let key = &caps[1];
    let fallback = caps.get(2).map(|m| m.as_str());

    let Some(name) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
        anyhow::bail!("unsupported placeholder scope `{key}`, expected `env.NAME`");
    };

    match (std::env::var(name), fallback) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(fallback)) => Ok(fallback.to_owned()),
        (Err(_), None) => anyhow::bail!("environment variable `{name}` is not set"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let input = "[providers.openai]\nbase_url = \"https://api.openai.com/v1\"\n";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn substitutes_set_variables() {
        temp_env::with_vars([("PRISM_A", Some("alpha")), ("PRISM_B", Some("beta"))], || {
            let out = expand_env("a = \"{{ env.PRISM_A }}\"\nb = \"{{env.PRISM_B}}\"").unwrap();
            assert_eq!(out, "a = \"alpha\"\nb = \"beta\"");
        });
    }

    #[test]
    fn unset_variable_without_fallback_fails() {
        temp_env::with_var_unset("PRISM_MISSING", || {
            let err = expand_env("key = \"{{ env.PRISM_MISSING }}\"").unwrap_err();
            assert!(err.to_string().contains("PRISM_MISSING"));
        });
    }

    #[test]
    fn fallback_applies_only_when_unset() {
        temp_env::with_var_unset("PRISM_OPTIONAL", || {
            let out = expand_env("key = \"{{ env.PRISM_OPTIONAL | default(\"fallback\") }}\"").unwrap();
            assert_eq!(out, "key = \"fallback\"");
        });

        temp_env::with_var("PRISM_OPTIONAL", Some("set"), || {
            let out = expand_env("key = \"{{ env.PRISM_OPTIONAL | default(\"fallback\") }}\"").unwrap();
            assert_eq!(out, "key = \"set\"");
        });
    }

    #[test]
    fn empty_fallback_is_allowed() {
        temp_env::with_var_unset("PRISM_OPTIONAL", || {
            let out = expand_env("key = \"{{ env.PRISM_OPTIONAL | default(\"\") }}\"").unwrap();
            assert_eq!(out, "key = \"\"");
        });
    }

    #[test]
    fn rejects_other_scopes() {
        let err = expand_env("key = \"{{ vault.TOKEN }}\"").unwrap_err();
        assert!(err.to_string().contains("vault.TOKEN"));

        let err = expand_env("key = \"{{ env.A.B }}\"").unwrap_err();
        assert!(err.to_string().contains("env.A.B"));
    }

    #[test]
    fn comment_lines_are_not_expanded() {
        temp_env::with_vars([("PRISM_SET", Some("v")), ("PRISM_MISSING", None::<&str>)], || {
            let input = "  # api_key = \"{{ env.PRISM_MISSING }}\"\nkey = \"{{ env.PRISM_SET }}\"";
            let out = expand_env(input).unwrap();
            assert_eq!(out, "  # api_key = \"{{ env.PRISM_MISSING }}\"\nkey = \"v\"");
        });
    }
}

use std::fmt::Write;

/// Replace `{name}` placeholders with the matching value. Unknown
/// placeholders are left as written.
pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        result.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match vars.iter().find(|(k, _)| *k == name) {
                    Some((_, value)) => result.push_str(value),
                    None => {
                        let _ = write!(result, "{{{name}}}");
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    result.push_str(rest);
    result
}

/// Expand `${VAR}`, `$VAR` and `%VAR%` patterns in paths and arguments.
/// Unset variables are kept verbatim.
pub fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '$' if chars.peek() == Some(&'{') => {
                chars.next();
                let var_name: String = chars.by_ref().take_while(|&c| c != '}').collect();
                if let Ok(val) = std::env::var(&var_name) {
                    result.push_str(&val);
                } else {
                    let _ = write!(result, "${{{var_name}}}");
                }
            }
            '$' => {
                let mut var_name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        var_name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if var_name.is_empty() {
                    result.push('$');
                } else if let Ok(val) = std::env::var(&var_name) {
                    result.push_str(&val);
                } else {
                    result.push('$');
                    result.push_str(&var_name);
                }
            }
            '%' => {
                let var_name: String = chars
                    .clone()
                    .take_while(|c| c.is_alphanumeric() || *c == '_')
                    .collect();
                let closed = !var_name.is_empty()
                    && chars.clone().nth(var_name.chars().count()) == Some('%');
                match std::env::var(&var_name) {
                    Ok(val) if closed => {
                        for _ in 0..=var_name.chars().count() {
                            chars.next();
                        }
                        result.push_str(&val);
                    }
                    _ => result.push('%'),
                }
            }
            _ => result.push(ch),
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_known_placeholders() {
        assert_eq!(
            fill("nircmd setsysvolume {percent}", &[("percent", "42")]),
            "nircmd setsysvolume 42"
        );
        assert_eq!(fill("{a}-{b}", &[("a", "1"), ("b", "2")]), "1-2");
    }

    #[test]
    fn fill_keeps_unknown_and_unclosed() {
        assert_eq!(fill("echo {other} {", &[("value", "1")]), "echo {other} {");
        assert_eq!(fill("no braces", &[]), "no braces");
    }

    #[test]
    fn env_var_expansion() {
        std::env::set_var("EASYPAD_TEST_VAR", "hello");
        assert_eq!(expand_env_vars("${EASYPAD_TEST_VAR}/path"), "hello/path");
        assert_eq!(expand_env_vars("$EASYPAD_TEST_VAR/path"), "hello/path");
        assert_eq!(expand_env_vars("%EASYPAD_TEST_VAR%\\app.exe"), "hello\\app.exe");
        std::env::remove_var("EASYPAD_TEST_VAR");
    }

    #[test]
    fn env_var_missing_kept() {
        assert_eq!(
            expand_env_vars("${EASYPAD_NONEXISTENT}/path"),
            "${EASYPAD_NONEXISTENT}/path"
        );
        assert_eq!(expand_env_vars("50% off"), "50% off");
        assert_eq!(expand_env_vars("%EASYPAD_NONEXISTENT%"), "%EASYPAD_NONEXISTENT%");
    }
}

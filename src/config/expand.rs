//! Variable expansion for registered search paths.
//!
//! Supports `$VAR` and `${VAR}`, plus a leading `~` for the home directory.
//! Use `$$` to produce a literal `$`. Unset variables expand to nothing; a
//! `~` is kept as is when no home directory can be determined.

use std::path::{Path, PathBuf};

/// Expands a search path against the process environment.
pub(crate) fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(expand_with(raw, dirs::home_dir().as_deref(), |name| {
        std::env::var(name).ok()
    }))
}

/// Expands `raw`, using `home` for a leading `~` and `lookup` to resolve
/// variable names.
fn expand_with(raw: &str, home: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> String {
    match (raw.strip_prefix('~'), home) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            home.to_string_lossy().into_owned() + &expand_vars(rest, &lookup)
        }
        _ => expand_vars(raw, &lookup),
    }
}

fn expand_vars(s: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                result.push('$');
            }
            Some('{') => {
                chars.next();
                let (name, closed) = consume_until(&mut chars, '}');
                if closed {
                    result.push_str(&lookup(&name).unwrap_or_default());
                } else {
                    result.push_str("${");
                    result.push_str(&name);
                }
            }
            Some(c) if is_name_char(*c) => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if !is_name_char(c) {
                        break;
                    }
                    name.push(c);
                    chars.next();
                }
                result.push_str(&lookup(&name).unwrap_or_default());
            }
            _ => result.push('$'),
        }
    }

    result
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Consumes characters until the delimiter, returning the collected string
/// and whether the delimiter was found.
fn consume_until(chars: &mut std::iter::Peekable<std::str::Chars>, delim: char) -> (String, bool) {
    let mut result = String::new();
    for ch in chars.by_ref() {
        if ch == delim {
            return (result, true);
        }
        result.push(ch);
    }
    (result, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn home() -> Option<&'static Path> {
        Some(Path::new("/home/app"))
    }

    fn env(name: &str) -> Option<String> {
        match name {
            "HOME" => Some("/home/app".to_string()),
            "APP_DIR" => Some("/srv/app".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_dollar_name() {
        assert_eq!(expand_with("$HOME/configs", home(), env), "/home/app/configs");
    }

    #[test]
    fn test_braced_name() {
        assert_eq!(expand_with("${APP_DIR}/etc", home(), env), "/srv/app/etc");
    }

    #[test]
    fn test_tilde() {
        assert_eq!(expand_with("~/configs", home(), env), "/home/app/configs");
        assert_eq!(expand_with("~", home(), env), "/home/app");
        assert_eq!(expand_with("~other/configs", home(), env), "~other/configs");
    }

    #[test]
    fn test_tilde_without_home_is_kept() {
        assert_eq!(expand_with("~/configs", None, env), "~/configs");
        assert_eq!(expand_with("~/$APP_DIR", None, env), "~//srv/app");
    }

    #[test]
    fn test_escape_and_lone_dollar() {
        assert_eq!(expand_with("a$$b", home(), env), "a$b");
        assert_eq!(expand_with("cost$", home(), env), "cost$");
        assert_eq!(expand_with("$-x", home(), env), "$-x");
    }

    #[test]
    fn test_unclosed_brace_kept_verbatim() {
        assert_eq!(expand_with("${HOME/configs", home(), env), "${HOME/configs");
    }

    #[test]
    fn test_unset_variable_is_empty() {
        assert_eq!(expand_with("$MISSING/configs", home(), env), "/configs");
    }

    #[test]
    fn test_relative_paths_untouched() {
        assert_eq!(expand_with("./configs", home(), env), "./configs");
    }
}

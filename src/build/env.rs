//! `NAME=VALUE` assignments and `$NAME` placeholder resolution for build arguments.

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Ordered set of variable assignments supplied on the command line.
///
/// The textual form is a comma-separated list: `VERSION=1.2.3, COMMIT=abc`.
/// An empty string is valid and yields no assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvAssignments {
    vars: BTreeMap<String, String>,
}

impl EnvAssignments {
    pub fn parse(input: &str) -> Result<Self> {
        let mut vars = BTreeMap::new();

        for entry in input.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, value) = entry.split_once('=').ok_or_else(|| {
                Error::Configuration(format!("invalid assignment '{entry}': expected NAME=VALUE"))
            })?;
            let name = name.trim();
            if !is_valid_name(name) {
                return Err(Error::Configuration(format!(
                    "invalid variable name '{name}' in assignment '{entry}'"
                )));
            }
            if vars.insert(name.to_string(), value.to_string()).is_some() {
                return Err(Error::Configuration(format!(
                    "variable '{name}' is assigned more than once"
                )));
            }
        }

        Ok(Self { vars })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Fix `name` to `value`. A caller assignment that disagrees is an error.
    pub fn pin(&mut self, name: &str, value: &str) -> Result<()> {
        match self.vars.get(name) {
            Some(assigned) if assigned != value => Err(Error::Configuration(format!(
                "{name}={assigned} conflicts with the configured {name}={value}"
            ))),
            _ => {
                self.vars.insert(name.to_string(), value.to_string());
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

pub(crate) fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Replace every `$NAME` and `${NAME}` placeholder in `arg`.
///
/// `$$` produces a literal `$`, and a `$` not followed by a name is kept
/// verbatim. A placeholder with no matching assignment is a configuration
/// error.
///
/// ```
/// use keyless_provenance::build::env::{resolve_arg, EnvAssignments};
///
/// let vars = EnvAssignments::parse("VERSION=1.2.3").unwrap();
/// assert_eq!(
///     resolve_arg("-X main.version=$VERSION", &vars).unwrap(),
///     "-X main.version=1.2.3"
/// );
/// assert!(resolve_arg("$MISSING", &vars).is_err());
/// ```
pub fn resolve_arg(arg: &str, vars: &EnvAssignments) -> Result<String> {
    let mut out = String::with_capacity(arg.len());
    let mut chars = arg.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let name = match chars.peek() {
            Some('$') => {
                chars.next();
                out.push('$');
                continue;
            }
            Some('{') => {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => {
                            return Err(Error::Configuration(format!(
                                "unterminated placeholder '${{{name}' in '{arg}'"
                            )));
                        }
                    }
                }
                if !is_valid_name(&name) {
                    return Err(Error::Configuration(format!(
                        "invalid placeholder '${{{name}}}' in '{arg}'"
                    )));
                }
                name
            }
            _ => {
                let mut name = String::new();
                while let Some(&ch) = chars.peek() {
                    let continues = if name.is_empty() {
                        ch.is_ascii_alphabetic() || ch == '_'
                    } else {
                        ch.is_ascii_alphanumeric() || ch == '_'
                    };
                    if !continues {
                        break;
                    }
                    name.push(ch);
                    chars.next();
                }
                if name.is_empty() {
                    out.push('$');
                    continue;
                }
                name
            }
        };

        let value = vars.get(&name).ok_or_else(|| {
            Error::Configuration(format!(
                "placeholder '${name}' in '{arg}' has no matching assignment"
            ))
        })?;
        out.push_str(value);
    }

    Ok(out)
}

pub fn resolve_args(args: &[String], vars: &EnvAssignments) -> Result<Vec<String>> {
    args.iter().map(|arg| resolve_arg(arg, vars)).collect()
}

//! Name resolution - `%setting%` tokens and connection strings
//!
//! Declared binding properties may reference app settings as `%name%`.
//! Those tokens are replaced before any `{parameter}` template is compiled,
//! so `"queueName": "%ORDERS_QUEUE%-{id}"` becomes `orders-{id}`.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, WeftError};

/// `%token%` where token is a setting name
static SETTING_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%([A-Za-z0-9_.:\-]+)%").expect("valid regex"));

/// Resolves `%setting%` tokens in declared properties
pub trait NameResolver: Send + Sync {
    /// Resolve a single setting name
    fn resolve(&self, name: &str) -> Option<String>;

    /// Replace every `%token%` in `input`
    ///
    /// Fails with `InvalidDeclaration` naming the first unresolvable token.
    fn resolve_whole_string(&self, input: &str) -> Result<String> {
        if !input.contains('%') {
            return Ok(input.to_string());
        }

        let mut result = String::with_capacity(input.len());
        let mut last = 0;
        for captures in SETTING_TOKEN.captures_iter(input) {
            let (Some(whole), Some(token)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            let value = self
                .resolve(token.as_str())
                .ok_or_else(|| WeftError::InvalidDeclaration {
                    binding: input.to_string(),
                    reason: format!("unable to resolve app setting '%{}%'", token.as_str()),
                })?;
            result.push_str(&input[last..whole.start()]);
            result.push_str(&value);
            last = whole.end();
        }
        result.push_str(&input[last..]);
        Ok(result)
    }
}

/// Resolves settings from process environment variables
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvNameResolver;

impl NameResolver for EnvNameResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Resolves settings from an in-memory map (app settings), falling back to
/// the environment when configured to
#[derive(Debug, Default, Clone)]
pub struct DictionaryNameResolver {
    settings: HashMap<String, String>,
    env_fallback: bool,
}

impl DictionaryNameResolver {
    pub fn new(settings: HashMap<String, String>) -> Self {
        Self {
            settings,
            env_fallback: false,
        }
    }

    pub fn with_env_fallback(mut self) -> Self {
        self.env_fallback = true;
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.settings.insert(name.into(), value.into());
    }
}

impl NameResolver for DictionaryNameResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        self.settings
            .get(name)
            .or_else(|| {
                self.settings
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .cloned()
            .or_else(|| {
                self.env_fallback
                    .then(|| std::env::var(name).ok())
                    .flatten()
            })
    }
}

/// Looks up named connection strings for binders
pub trait ConnectionStringProvider: Send + Sync {
    fn connection_string(&self, name: &str) -> Option<String>;
}

/// Connection strings come from settings named `<name>` or
/// `ConnectionStrings:<name>`
impl<T: NameResolver> ConnectionStringProvider for T {
    fn connection_string(&self, name: &str) -> Option<String> {
        self.resolve(name)
            .or_else(|| self.resolve(&format!("ConnectionStrings:{}", name)))
    }
}

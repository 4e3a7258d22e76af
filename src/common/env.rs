/// Trait for reading environment variables in a testable way
///
/// Settings overrides and the viewer identity come from the environment; the
/// trait lets tests inject values without touching process-global state.

#[cfg(test)]
use std::collections::HashMap;

pub const USER_VAR: &str = "INPAGE_THREADS_USER";
pub const DATA_DIR_VAR: &str = "INPAGE_THREADS_DATA_DIR";
pub const DEBOUNCE_VAR: &str = "INPAGE_THREADS_DEBOUNCE_MS";
pub const TYPING_TTL_VAR: &str = "INPAGE_THREADS_TYPING_TTL_MS";

pub trait EnvProvider {
    /// Get the value of an environment variable
    fn get_var(&self, key: &str) -> Option<String>;

    /// Viewer identity, falling back to the login name
    fn viewer(&self) -> Option<String> {
        self.get_var(USER_VAR)
            .or_else(|| self.get_var("USER"))
            .filter(|user| !user.trim().is_empty())
    }
}

/// Production implementation that uses the system environment
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Test-only mock implementation for environment variables
#[cfg(test)]
#[derive(Default)]
pub struct MockEnvProvider {
    vars: HashMap<String, String>,
}

#[cfg(test)]
impl MockEnvProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn remove_var(&mut self, key: &str) -> &mut Self {
        self.vars.remove(key);
        self
    }

    pub fn with_viewer(user: impl Into<String>) -> Self {
        let mut mock = Self::new();
        mock.set_var(USER_VAR, user);
        mock
    }
}

#[cfg(test)]
impl EnvProvider for MockEnvProvider {
    fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

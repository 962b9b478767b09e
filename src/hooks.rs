// src/hooks.rs

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use tracing::{debug, info};

static VAR_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").expect("variable pattern should parse")
});

/// Variables handed to build actions by the enclosing build system.
#[derive(Debug, Clone, Default)]
pub struct BuildEnv {
    vars: BTreeMap<String, String>,
}

impl BuildEnv {
    /// Snapshot of the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Expand `$VAR` / `${VAR}` references. Unknown variables expand to "".
    pub fn subst(&self, s: &str) -> String {
        VAR_REF
            .replace_all(s, |caps: &Captures| {
                self.get(&caps[1]).unwrap_or_default().to_string()
            })
            .into_owned()
    }
}

/// `(source, target, env)`, the conventional build-action signature.
pub type BuildAction = fn(&[String], &[String], &BuildEnv) -> Result<()>;

/// Actions to run before a named target is built.
#[derive(Default)]
pub struct PreActions {
    actions: BTreeMap<String, Vec<(&'static str, BuildAction)>>,
}

impl PreActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `action` to run before `target`. `target` may reference
    /// build variables; it is expanded against `env` at registration time.
    pub fn add_pre_action(
        &mut self,
        env: &BuildEnv,
        target: &str,
        name: &'static str,
        action: BuildAction,
    ) {
        let target = env.subst(target);
        debug!(%target, action = name, "registered pre-action");
        self.actions.entry(target).or_default().push((name, action));
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// Run everything registered for `target`, in registration order.
    /// The first failure aborts the target.
    pub fn run(&self, target: &str, source: &[String], env: &BuildEnv) -> Result<usize> {
        let Some(actions) = self.actions.get(target) else {
            return Ok(0);
        };
        let targets = [target.to_string()];
        for (name, action) in actions {
            info!(%target, action = name, "running pre-action");
            action(source, &targets, env)
                .with_context(|| format!("pre-action {} for {} failed", name, target))?;
        }
        Ok(actions.len())
    }
}

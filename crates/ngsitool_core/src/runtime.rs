use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const CONFIG_ENV: &str = "NGSITOOL_CONFIG";
pub const STATE_DIR_NAME: &str = ".ngsitool";
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfigPath {
    pub path: PathBuf,
    pub source: ValueSource,
}

impl ResolvedConfigPath {
    pub fn diagnostics(&self) -> String {
        format!(
            "config_path={} ({})",
            normalize_for_display(&self.path),
            self.source.as_str()
        )
    }
}

pub fn current_dir() -> Result<PathBuf> {
    env::current_dir().context("failed to read current directory")
}

/// Resolve the config file: `--config`, then `NGSITOOL_CONFIG`, then
/// `<cwd>/.ngsitool/config.toml`. Relative paths are taken from `cwd`.
pub fn resolve_config_path(flag: Option<&Path>, cwd: &Path) -> ResolvedConfigPath {
    resolve_config_path_with_lookup(flag, cwd, |key| env::var(key).ok())
}

pub(crate) fn resolve_config_path_with_lookup<F>(
    flag: Option<&Path>,
    cwd: &Path,
    lookup_env: F,
) -> ResolvedConfigPath
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = flag {
        return ResolvedConfigPath {
            path: absolutize(path, cwd),
            source: ValueSource::Flag,
        };
    }
    if let Some(value) = lookup_env(CONFIG_ENV) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return ResolvedConfigPath {
                path: absolutize(Path::new(trimmed), cwd),
                source: ValueSource::Env,
            };
        }
    }
    ResolvedConfigPath {
        path: cwd.join(STATE_DIR_NAME).join(CONFIG_FILENAME),
        source: ValueSource::Default,
    }
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::function::{DEFAULT_ADMIN_NAME, DEFAULT_MEMBER_NAME};

/// Directory (under the project root) holding the store and its config.
pub const STORE_DIR: &str = ".milepost";
/// Store database file name inside [`STORE_DIR`].
pub const STORE_FILE: &str = "milepost.db";
/// Project config file name inside [`STORE_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub access: AccessConfig,
}

/// Role names seeded by `mp init`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_admin_function")]
    pub admin_function: String,
    #[serde(default = "default_member_function")]
    pub member_function: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            admin_function: default_admin_function(),
            member_function: default_member_function(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite busy timeout for contended writes.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// How long to wait for the registry lock.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl StoreConfig {
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

/// Logins the operator treats as global admins. Resolved by adapters, never
/// by the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub global_admins: Vec<String>,
}

impl AccessConfig {
    #[must_use]
    pub fn is_global_admin(&self, login: &str) -> bool {
        self.global_admins.iter().any(|admin| admin == login)
    }

    /// Whether `login` passes global-admin gates. Only listed logins do; an
    /// empty list names nobody and an anonymous caller never passes.
    #[must_use]
    pub fn grants_global_admin(&self, login: Option<&str>) -> bool {
        login.is_some_and(|login| self.is_global_admin(login))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
    /// Login used as the acting user when none is given on the command line.
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
    pub resolved_actor: Option<String>,
}

/// Path of the store database for a project root.
#[must_use]
pub fn store_path(project_root: &Path) -> PathBuf {
    project_root.join(STORE_DIR).join(STORE_FILE)
}

/// Load `.milepost/config.toml`, falling back to defaults when absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(STORE_DIR).join(CONFIG_FILE);
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write a config file holding every default, unless one already exists.
///
/// Returns the path when a file was written.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn write_default_project_config(project_root: &Path) -> Result<Option<PathBuf>> {
    let dir = project_root.join(STORE_DIR);
    let path = dir.join(CONFIG_FILE);
    if path.exists() {
        return Ok(None);
    }

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let content = toml::to_string_pretty(&ProjectConfig::default())
        .context("Failed to render default config")?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(Some(path))
}

/// Add `login` to `[access] global_admins` in the project config, writing
/// the file if needed. Returns `false` when the login was already listed.
///
/// # Errors
///
/// Returns an error if the config cannot be read, parsed, or written.
pub fn add_global_admin(project_root: &Path, login: &str) -> Result<bool> {
    let mut config = load_project_config(project_root)?;
    if config.access.is_global_admin(login) {
        return Ok(false);
    }
    config.access.global_admins.push(login.to_string());

    let dir = project_root.join(STORE_DIR);
    let path = dir.join(CONFIG_FILE);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let content = toml::to_string_pretty(&config).context("Failed to render config")?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(login, path = %path.display(), "global admin added");
    Ok(true)
}

/// # Errors
///
/// Returns an error if the user config exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("milepost/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Merge project config, user config, environment, and flags.
///
/// # Errors
///
/// Returns an error if either config file is malformed.
pub fn resolve_config(
    project_root: &Path,
    cli_json: bool,
    cli_actor: Option<&str>,
) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let resolved_output = resolve_output(
        cli_json,
        user.output.clone(),
        env::var("MILEPOST_FORMAT").ok(),
    );
    let resolved_actor = resolve_actor(
        cli_actor,
        env::var("MILEPOST_USER").ok(),
        user.user.clone(),
    );

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
        resolved_actor,
    })
}

fn resolve_output(cli_json: bool, user_output: Option<String>, env_format: Option<String>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

fn resolve_actor(
    cli_actor: Option<&str>,
    env_actor: Option<String>,
    user_actor: Option<String>,
) -> Option<String> {
    cli_actor
        .map(str::to_string)
        .into_iter()
        .chain(env_actor)
        .chain(user_actor)
        .map(|login| login.trim().to_string())
        .find(|login| !login.is_empty())
}

fn default_admin_function() -> String {
    DEFAULT_ADMIN_NAME.to_string()
}

fn default_member_function() -> String {
    DEFAULT_MEMBER_NAME.to_string()
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

const fn default_lock_timeout_ms() -> u64 {
    2_000
}

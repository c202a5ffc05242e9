//! Конфигурация загрузчика.
//!
//! Порядок источников: значения по умолчанию, затем файл
//! `{config_dir}/edon/config.toml`, затем переменные окружения
//! `EDON_CACHE_DIR` и `EDON_REGISTRY`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Реестр пакетов по умолчанию.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

/// Доверенные CDN-хосты по умолчанию.
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &[
    "cdn.jsdelivr.net",
    "unpkg.com",
    "cdnjs.cloudflare.com",
    "esm.sh",
];

/// Файл конфигурации внутри `{config_dir}/edon`.
pub const CONFIG_FILE: &str = "config.toml";

/// Предел глубины обхода графа по умолчанию.
pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// Конфигурация одной сессии загрузчика.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Корень кэша установленных пакетов
    pub cache_root: PathBuf,
    /// URL реестра пакетов
    pub registry_url: String,
    /// Хосты, с которых разрешена загрузка удалённых модулей
    pub allowed_hosts: Vec<String>,
    /// Каталог, относительно которого разрешаются локальные пути
    pub base_dir: Option<PathBuf>,
    /// Таймаут сетевых запросов (секунды, 0 - без таймаута)
    pub timeout_secs: u64,
    /// Максимальная глубина цепочки зависимостей
    pub max_depth: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root().unwrap_or_else(|| PathBuf::from(".edon/npm-cache")),
            registry_url: DEFAULT_REGISTRY.to_string(),
            allowed_hosts: DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect(),
            base_dir: None,
            timeout_secs: 30,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl LoaderConfig {
    /// Прочитать конфигурацию из TOML-файла.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: LoaderConfig = toml::from_str(content)?;
        config.registry_url = config.registry_url.trim_end_matches('/').to_string();
        Ok(config)
    }

    /// Найти конфигурацию пользователя и применить переменные окружения.
    pub fn discover() -> Result<Self, ConfigError> {
        let mut config = match dirs_next::config_dir().map(|d| d.join("edon").join(CONFIG_FILE)) {
            Some(path) if path.is_file() => {
                log::debug!("loading config from {}", path.display());
                Self::from_file(&path)?
            }
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Применить переопределения из окружения.
    pub fn apply_env(&mut self) {
        if let Some(dir) = env::var_os("EDON_CACHE_DIR").filter(|v| !v.is_empty()) {
            self.cache_root = PathBuf::from(dir);
        }
        if let Ok(registry) = env::var("EDON_REGISTRY") {
            if !registry.is_empty() {
                self.registry_url = registry.trim_end_matches('/').to_string();
            }
        }
    }

    /// Таймаут сетевых запросов.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Каталог для разрешения локальных путей.
    pub fn base_dir(&self) -> PathBuf {
        self.base_dir
            .clone()
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// `~/.edon/npm-cache`.
pub fn default_cache_root() -> Option<PathBuf> {
    dirs_next::home_dir().map(|home| home.join(".edon").join("npm-cache"))
}

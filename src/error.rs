//! Определения ошибок загрузчика модулей.

use std::path::PathBuf;

use thiserror::Error;

/// Основной тип `Result` для загрузки модулей.
pub type LoadResult<T> = Result<T, LoadError>;

/// Ошибки классификации спецификатора.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("empty module specifier")]
    EmptySpecifier,

    #[error("malformed URL '{specifier}': {reason}")]
    MalformedUrl { specifier: String, reason: String },

    #[error("specifier does not match any supported module source: {0}")]
    UnsupportedSpecifier(String),
}

/// Ошибки получения исходного текста модуля.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("module not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("registry unavailable for {package}: {reason}")]
    RegistryUnavailable { package: String, reason: String },

    #[error("invalid package {package}: {reason}")]
    InvalidPackage { package: String, reason: String },

    #[error("{0} is not implemented yet")]
    NotImplemented(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// Ребро, замыкающее цикл в графе зависимостей.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("circular dependency detected: {parent} -> {child}")]
pub struct CycleError {
    pub parent: String,
    pub child: String,
}

/// Ошибки графа зависимостей.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error("dependency chain under {root} exceeds the depth limit of {limit}")]
    DepthExceeded { root: String, limit: usize },
}

/// Ошибки загрузчика, видимые вызывающей стороне.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error("failed to load {specifier}: {source}")]
    Fetch {
        specifier: String,
        #[source]
        source: FetchError,
    },

    #[error("loading {specifier} was cancelled")]
    Cancelled { specifier: String },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl LoadError {
    /// Обернуть ошибку фетчера спецификатором; отмена становится отдельным видом.
    pub fn from_fetch(specifier: &str, err: FetchError) -> Self {
        match err {
            FetchError::Cancelled => LoadError::Cancelled {
                specifier: specifier.to_string(),
            },
            source => LoadError::Fetch {
                specifier: specifier.to_string(),
                source,
            },
        }
    }

    /// Спецификатор, на котором произошла ошибка (если известен).
    pub fn specifier(&self) -> Option<&str> {
        match self {
            LoadError::Fetch { specifier, .. } | LoadError::Cancelled { specifier } => {
                Some(specifier)
            }
            LoadError::Classify(ClassifyError::MalformedUrl { specifier, .. })
            | LoadError::Classify(ClassifyError::UnsupportedSpecifier(specifier)) => {
                Some(specifier)
            }
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoadError::Cancelled { .. })
    }
}

/// Ошибки конфигурации.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

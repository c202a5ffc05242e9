//! Чтение модулей с локального диска.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::Fetcher;
use crate::context::LoadContext;
use crate::error::FetchError;

/// Фетчер локальных файлов.
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    /// Каталог, относительно которого разрешаются `./` и `../`
    base_dir: PathBuf,
}

impl LocalFetcher {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Абсолютный путь к файлу модуля.
    pub fn resolve(&self, specifier: &str) -> PathBuf {
        let path = Path::new(specifier);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl Fetcher for LocalFetcher {
    fn fetch(&self, ctx: &LoadContext, specifier: &str) -> Result<String, FetchError> {
        ctx.check()?;

        let path = self.resolve(specifier);
        log::debug!("reading local module {}", path.display());

        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FetchError::NotFound(path.clone()),
            _ => FetchError::Read {
                path: path.display().to_string(),
                reason: e.to_string(),
            },
        })?;

        String::from_utf8(bytes).map_err(|e| FetchError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

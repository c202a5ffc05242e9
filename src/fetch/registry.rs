//! Пакеты реестра (`npm:`).
//!
//! Установленный пакет читается прямо из [`PackageStore`] без обращения к
//! сети. Иначе запрашиваются метаданные версии
//! (`GET {registry}/{name}/{version}`), скачивается и проверяется архив,
//! пакет распаковывается в хранилище.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError};

use serde::{Deserialize, Serialize};

use super::{Fetcher, HttpClient};
use crate::context::LoadContext;
use crate::error::FetchError;
use crate::modules::PackageRef;
use crate::store::{unpack_tarball, verify_integrity, PackageStore};

/// Метаданные версии пакета.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub dist: Option<DistInfo>,
}

/// Сведения об архиве версии.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistInfo {
    /// URL архива `.tgz`
    pub tarball: String,
    /// Subresource integrity (`sha512-...`)
    #[serde(default)]
    pub integrity: Option<String>,
    #[serde(default)]
    pub shasum: Option<String>,
}

/// Клиент реестра пакетов.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    registry_url: String,
    http: HttpClient,
}

impl RegistryClient {
    pub fn new(registry_url: &str, http: HttpClient) -> Self {
        Self {
            registry_url: registry_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn registry_url(&self) -> &str {
        &self.registry_url
    }

    /// Получить метаданные версии пакета.
    pub fn metadata(
        &self,
        ctx: &LoadContext,
        pkg: &PackageRef,
    ) -> Result<PackageMetadata, FetchError> {
        let url = format!("{}/{}/{}", self.registry_url, pkg.name, pkg.version);
        let body = self.get_ok(ctx, pkg, &url)?;

        serde_json::from_slice(&body).map_err(|e| FetchError::InvalidPackage {
            package: pkg.to_string(),
            reason: format!("malformed registry metadata: {}", e),
        })
    }

    /// Скачать архив пакета.
    pub fn download(
        &self,
        ctx: &LoadContext,
        pkg: &PackageRef,
        dist: &DistInfo,
    ) -> Result<Vec<u8>, FetchError> {
        self.get_ok(ctx, pkg, &dist.tarball)
    }

    /// GET с требованием 2xx; сбой транспорта или статус - `RegistryUnavailable`.
    fn get_ok(
        &self,
        ctx: &LoadContext,
        pkg: &PackageRef,
        url: &str,
    ) -> Result<Vec<u8>, FetchError> {
        let unavailable = |reason: String| FetchError::RegistryUnavailable {
            package: pkg.to_string(),
            reason,
        };

        let response = self.http.get(ctx, url).map_err(|e| match e {
            FetchError::Cancelled => FetchError::Cancelled,
            other => unavailable(other.to_string()),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {} from {}", status.as_u16(), url)));
        }

        self.http.read_body(ctx, response, url)
    }
}

/// Фетчер пакетов реестра.
#[derive(Debug, Clone)]
pub struct RegistryFetcher {
    client: RegistryClient,
    store: Arc<PackageStore>,
}

impl RegistryFetcher {
    pub fn new(client: RegistryClient, store: Arc<PackageStore>) -> Self {
        Self { client, store }
    }

    pub fn client(&self) -> &RegistryClient {
        &self.client
    }

    pub fn store(&self) -> &PackageStore {
        &self.store
    }

    /// Установить пакет, если его ещё нет. Возвращает каталог версии.
    pub fn install(&self, ctx: &LoadContext, pkg: &PackageRef) -> Result<PathBuf, FetchError> {
        let dir = self.store.package_dir(pkg)?;
        if dir.is_dir() {
            log::debug!("package {} already installed", pkg);
            return Ok(dir);
        }

        let lock = self.store.install_lock(pkg);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        if dir.is_dir() {
            return Ok(dir);
        }

        let metadata = self.client.metadata(ctx, pkg)?;
        let dist = metadata.dist.ok_or_else(|| FetchError::InvalidPackage {
            package: pkg.to_string(),
            reason: "registry metadata has no dist.tarball".to_string(),
        })?;

        let archive = self.client.download(ctx, pkg, &dist)?;
        verify_integrity(&archive, dist.integrity.as_deref(), dist.shasum.as_deref()).map_err(
            |reason| FetchError::InvalidPackage {
                package: pkg.to_string(),
                reason,
            },
        )?;

        ctx.check()?;
        self.store.provision(pkg, |staging| unpack_tarball(&archive, staging))
    }

    /// Установить пакет заново, удалив существующую копию.
    pub fn reinstall(&self, ctx: &LoadContext, pkg: &PackageRef) -> Result<PathBuf, FetchError> {
        let lock = self.store.install_lock(pkg);
        {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.store.remove(pkg)?;
        }
        self.install(ctx, pkg)
    }
}

impl Fetcher for RegistryFetcher {
    fn fetch(&self, ctx: &LoadContext, specifier: &str) -> Result<String, FetchError> {
        let pkg = PackageRef::parse(specifier);
        self.install(ctx, &pkg)?;
        self.store.read_entry(&pkg)
    }
}

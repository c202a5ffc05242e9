//! Получение исходного текста модулей.
//!
//! Один фетчер на каждый вид спецификатора:
//!
//! - [`LocalFetcher`] - локальная файловая система
//! - [`RemoteFetcher`] - доверенные CDN по HTTP(S)
//! - [`RegistryFetcher`] - пакеты реестра через кэш установленных пакетов
//! - [`AltRegistryFetcher`] - альтернативный реестр (не реализован)

mod http;
mod local;
mod registry;
mod remote;

pub use http::HttpClient;
pub use local::LocalFetcher;
pub use registry::{DistInfo, PackageMetadata, RegistryClient, RegistryFetcher};
pub use remote::RemoteFetcher;

use crate::context::LoadContext;
use crate::error::FetchError;

/// Источник исходного текста модулей одного вида.
pub trait Fetcher: Send + Sync {
    /// Получить исходный текст модуля.
    fn fetch(&self, ctx: &LoadContext, specifier: &str) -> Result<String, FetchError>;
}

/// Фетчер альтернативного реестра (`jsr:`).
#[derive(Debug, Default, Clone, Copy)]
pub struct AltRegistryFetcher;

impl Fetcher for AltRegistryFetcher {
    fn fetch(&self, _ctx: &LoadContext, specifier: &str) -> Result<String, FetchError> {
        Err(FetchError::NotImplemented(format!(
            "alternate registry loading ({})",
            specifier
        )))
    }
}

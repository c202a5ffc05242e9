//! # edon
//!
//! Разрешение и загрузка модулей для рантайма edon.
//!
//! ## Основные модули
//!
//! - [`modules`] - классификатор спецификаторов, кэш модулей, граф
//!   зависимостей и загрузчик
//! - [`fetch`] - получение исходного текста: диск, CDN, реестр пакетов
//! - [`store`] - кэш установленных пакетов на диске
//! - [`config`] - конфигурация загрузчика
//! - [`context`] - отмена и крайние сроки
//! - [`error`] - типы ошибок
//!
//! ## Пример
//!
//! ```rust,no_run
//! use edon::{LoadContext, LoaderConfig, ModuleLoader};
//!
//! let loader = ModuleLoader::new(LoaderConfig::discover().unwrap());
//! let ctx = LoadContext::background();
//!
//! let module = loader.load(&ctx, "npm:left-pad@1.3.0").unwrap();
//! println!("{}", module.source());
//! ```

// === Основные модули ===
pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod modules;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

// === Re-exports для удобства ===
pub use config::LoaderConfig;
pub use context::{CancelToken, LoadContext};
pub use error::{
    ClassifyError, ConfigError, CycleError, FetchError, GraphError, LoadError, LoadResult,
};
pub use modules::{DependencyGraph, Module, ModuleCache, ModuleLoader, PackageRef, SpecifierKind};
pub use store::PackageStore;

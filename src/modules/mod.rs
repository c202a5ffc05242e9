//! Система модулей edon.
//!
//! Загрузчик классифицирует спецификатор, берёт модуль из кэша или
//! получает его исходный текст подходящим фетчером, а граф зависимостей
//! даёт порядок загрузки.
//!
//! ```rust,no_run
//! use edon::context::LoadContext;
//! use edon::modules::ModuleLoader;
//! use edon::LoaderConfig;
//!
//! let loader = ModuleLoader::new(LoaderConfig::default());
//! loader.add_dependency("./main.js", "./math.js").unwrap();
//!
//! let ctx = LoadContext::background();
//! for module in loader.load_graph(&ctx, "./main.js").unwrap() {
//!     println!("{} ({} bytes)", module.specifier(), module.source().len());
//! }
//! ```

mod cache;
mod graph;
mod loader;
mod specifier;

pub use cache::{Module, ModuleCache};
pub use graph::DependencyGraph;
pub use loader::ModuleLoader;
pub use specifier::{
    classify, is_local_path, is_trusted_url, PackageRef, SpecifierClassifier, SpecifierKind,
    ALT_REGISTRY_PREFIX, DEFAULT_VERSION, REGISTRY_PREFIX,
};

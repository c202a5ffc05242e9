//! Загрузчик модулей.
//!
//! Единая точка входа: классификация, кэш, выбор фетчера и граф
//! зависимостей одной сессии.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{DependencyGraph, Module, ModuleCache, SpecifierClassifier, SpecifierKind};
use crate::config::LoaderConfig;
use crate::context::LoadContext;
use crate::error::{CycleError, FetchError, LoadError, LoadResult};
use crate::fetch::{
    AltRegistryFetcher, Fetcher, HttpClient, LocalFetcher, RegistryClient, RegistryFetcher,
    RemoteFetcher,
};
use crate::store::PackageStore;

/// Загрузчик модулей одной сессии рантайма.
///
/// Кэш и граф принадлежат загрузчику; общим между сессиями остаётся
/// только хранилище пакетов на диске.
pub struct ModuleLoader {
    classifier: SpecifierClassifier,
    cache: ModuleCache,
    graph: DependencyGraph,
    fetchers: HashMap<SpecifierKind, Arc<dyn Fetcher>>,
    store: Arc<PackageStore>,
}

impl ModuleLoader {
    /// Создать загрузчик со стандартными фетчерами.
    pub fn new(config: LoaderConfig) -> Self {
        let classifier = SpecifierClassifier::new(config.allowed_hosts.clone());
        let store = Arc::new(PackageStore::new(config.cache_root.clone()));
        let registry = RegistryFetcher::new(
            RegistryClient::new(&config.registry_url, HttpClient::new(config.timeout())),
            store.clone(),
        );
        // перенаправления удалённых модулей проверяются тем же списком хостов
        let remote = RemoteFetcher::new(HttpClient::restricted(
            config.timeout(),
            classifier.allowed_hosts().to_vec(),
        ));

        let mut fetchers: HashMap<SpecifierKind, Arc<dyn Fetcher>> = HashMap::new();
        fetchers.insert(SpecifierKind::Local, Arc::new(LocalFetcher::new(config.base_dir())));
        fetchers.insert(SpecifierKind::Remote, Arc::new(remote));
        fetchers.insert(SpecifierKind::Registry, Arc::new(registry));
        fetchers.insert(SpecifierKind::AltRegistry, Arc::new(AltRegistryFetcher));

        Self {
            classifier,
            cache: ModuleCache::new(),
            graph: DependencyGraph::with_max_depth(config.max_depth),
            fetchers,
            store,
        }
    }

    /// Заменить фетчер для вида спецификатора.
    pub fn set_fetcher(&mut self, kind: SpecifierKind, fetcher: Arc<dyn Fetcher>) {
        self.fetchers.insert(kind, fetcher);
    }

    /// Загрузить модуль.
    ///
    /// Ошибка классификации возвращается как есть; при попадании в кэш
    /// фетчеры не вызываются; ошибка фетчера оборачивается спецификатором.
    pub fn load(&self, ctx: &LoadContext, specifier: &str) -> LoadResult<Arc<Module>> {
        let kind = self.classifier.classify(specifier)?;

        self.cache.get_or_load(ctx, specifier, || {
            let fetcher = self.fetchers.get(&kind).ok_or_else(|| {
                let what = format!("{} modules", kind);
                LoadError::from_fetch(specifier, FetchError::NotImplemented(what))
            })?;

            log::debug!("fetching {} module {}", kind, specifier);
            let source = fetcher
                .fetch(ctx, specifier)
                .map_err(|e| LoadError::from_fetch(specifier, e))?;

            // результат отменённой загрузки не попадает в кэш
            if ctx.is_done() {
                return Err(LoadError::Cancelled {
                    specifier: specifier.to_string(),
                });
            }
            Ok(Module::new(specifier, source, kind))
        })
    }

    /// Загрузить `root` и все его зависимости в порядке загрузки.
    ///
    /// Останавливается на первом модуле, который не удалось загрузить;
    /// ошибка называет этот модуль.
    pub fn load_graph(&self, ctx: &LoadContext, root: &str) -> LoadResult<Vec<Arc<Module>>> {
        let order = self.graph.resolve_order(root)?;
        order
            .iter()
            .map(|specifier| self.load(ctx, specifier))
            .collect()
    }

    /// Зарегистрировать зависимость `parent -> child`.
    pub fn add_dependency(&self, parent: &str, child: &str) -> Result<(), CycleError> {
        self.graph.add_dependency(parent, child)
    }

    /// Порядок загрузки для `root`.
    pub fn resolve_order(&self, root: &str) -> LoadResult<Vec<String>> {
        Ok(self.graph.resolve_order(root)?)
    }

    /// Вид спецификатора без загрузки.
    pub fn classify(&self, specifier: &str) -> LoadResult<SpecifierKind> {
        Ok(self.classifier.classify(specifier)?)
    }

    pub fn cache(&self) -> &ModuleCache {
        &self.cache
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn store(&self) -> &PackageStore {
        &self.store
    }
}

impl Default for ModuleLoader {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

impl fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("classifier", &self.classifier)
            .field("cached_modules", &self.cache.len())
            .field("graph_edges", &self.graph.edge_count())
            .field("store", &self.store.root())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancelToken;
    use crate::error::{ClassifyError, GraphError};
    use crate::test_support::{sha512_integrity, tarball, Route, TestServer};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    /// Фетчер, считающий вызовы.
    struct Counting {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl Counting {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Fetcher for Counting {
        fn fetch(&self, ctx: &LoadContext, specifier: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            ctx.check()?;
            Ok(format!("// source of {}", specifier))
        }
    }

    fn project() -> (TempDir, ModuleLoader) {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("math.js"),
            "export function add(a, b) { return a + b; }\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("main.js"),
            "import { add } from './math.js';\nconsole.log(add(2, 3));\n",
        )
        .unwrap();

        let config = LoaderConfig {
            base_dir: Some(dir.path().to_path_buf()),
            cache_root: dir.path().join("npm-cache"),
            ..LoaderConfig::default()
        };
        (dir, ModuleLoader::new(config))
    }

    #[test]
    fn test_load_local_module() {
        let (_dir, loader) = project();
        let module = loader.load(&LoadContext::background(), "./math.js").unwrap();

        assert_eq!(module.specifier(), "./math.js");
        assert_eq!(module.kind(), SpecifierKind::Local);
        assert!(module.source().contains("function add"));
        assert!(loader.cache().contains("./math.js"));
    }

    #[test]
    fn test_load_is_idempotent_without_refetch() {
        let (_dir, mut loader) = project();
        let counting = Counting::new(Duration::ZERO);
        loader.set_fetcher(SpecifierKind::Local, counting.clone());
        let ctx = LoadContext::background();

        let first = loader.load(&ctx, "./math.js").unwrap();
        let second = loader.load(&ctx, "./math.js").unwrap();

        assert_eq!(first, second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counting.calls(), 1);
    }

    #[test]
    fn test_classification_error_propagates() {
        let (_dir, loader) = project();
        let ctx = LoadContext::background();

        assert_eq!(
            loader.load(&ctx, ""),
            Err(LoadError::Classify(ClassifyError::EmptySpecifier))
        );
        assert!(matches!(
            loader.load(&ctx, "https://example.com/x.js"),
            Err(LoadError::Classify(ClassifyError::UnsupportedSpecifier(_)))
        ));
        assert!(loader.cache().is_empty());
    }

    #[test]
    fn test_fetch_error_names_specifier() {
        let (_dir, loader) = project();
        let err = loader
            .load(&LoadContext::background(), "./nowhere.js")
            .unwrap_err();

        assert!(matches!(
            err,
            LoadError::Fetch {
                source: FetchError::NotFound(_),
                ..
            }
        ));
        assert_eq!(err.specifier(), Some("./nowhere.js"));
        assert!(loader.cache().is_empty());
    }

    #[test]
    fn test_alt_registry_not_implemented() {
        let (_dir, loader) = project();
        let err = loader.load(&LoadContext::background(), "jsr:@std/fmt").unwrap_err();
        assert!(matches!(
            err,
            LoadError::Fetch {
                source: FetchError::NotImplemented(_),
                ..
            }
        ));
    }

    #[test]
    fn test_end_to_end_graph() {
        let (_dir, loader) = project();
        let ctx = LoadContext::background();

        loader.add_dependency("./main.js", "./math.js").unwrap();
        assert_eq!(
            loader.resolve_order("./main.js").unwrap(),
            vec!["./math.js", "./main.js"]
        );

        let modules = loader.load_graph(&ctx, "./main.js").unwrap();
        let specs: Vec<&str> = modules.iter().map(|m| m.specifier()).collect();
        assert_eq!(specs, vec!["./math.js", "./main.js"]);
        assert!(modules[1].source().contains("import { add }"));
    }

    #[test]
    fn test_graph_order_with_bare_names() {
        let (_dir, loader) = project();
        loader.add_dependency("main.js", "math.js").unwrap();
        assert_eq!(loader.resolve_order("main.js").unwrap(), vec!["math.js", "main.js"]);
    }

    #[test]
    fn test_load_graph_reports_failing_module() {
        let (_dir, loader) = project();
        loader.add_dependency("./main.js", "./missing.js").unwrap();

        let err = loader
            .load_graph(&LoadContext::background(), "./main.js")
            .unwrap_err();
        assert_eq!(err.specifier(), Some("./missing.js"));
        assert!(!loader.cache().contains("./main.js"));
    }

    #[test]
    fn test_cycle_rejected_through_loader() {
        let (_dir, loader) = project();
        loader.add_dependency("A", "B").unwrap();
        loader.add_dependency("B", "C").unwrap();

        let err = loader.add_dependency("C", "A").unwrap_err();
        assert_eq!((err.parent.as_str(), err.child.as_str()), ("C", "A"));
        assert_eq!(loader.resolve_order("A").unwrap(), vec!["C", "B", "A"]);
    }

    #[test]
    fn test_depth_limit_through_loader() {
        let dir = tempdir().unwrap();
        let loader = ModuleLoader::new(LoaderConfig {
            base_dir: Some(dir.path().to_path_buf()),
            max_depth: 2,
            ..LoaderConfig::default()
        });
        loader.add_dependency("./a.js", "./b.js").unwrap();
        loader.add_dependency("./b.js", "./c.js").unwrap();

        assert!(matches!(
            loader.load_graph(&LoadContext::background(), "./a.js"),
            Err(LoadError::Graph(GraphError::DepthExceeded { limit: 2, .. }))
        ));
    }

    #[test]
    fn test_concurrent_loads_fetch_once() {
        let (_dir, mut loader) = project();
        let counting = Counting::new(Duration::from_millis(50));
        loader.set_fetcher(SpecifierKind::Local, counting.clone());
        let loader = Arc::new(loader);

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let loader = loader.clone();
                thread::spawn(move || loader.load(&LoadContext::background(), "./math.js").unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().source(), "// source of ./math.js");
        }

        assert_eq!(counting.calls(), 1);
    }

    #[test]
    fn test_cancelled_load_not_cached() {
        let (_dir, mut loader) = project();
        let counting = Counting::new(Duration::from_millis(100));
        loader.set_fetcher(SpecifierKind::Local, counting.clone());

        let token = CancelToken::new();
        let ctx = LoadContext::with_token(token.clone());
        let canceller = {
            let token = token.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                token.cancel();
            })
        };

        let err = loader.load(&ctx, "./math.js").unwrap_err();
        canceller.join().unwrap();

        assert_eq!(
            err,
            LoadError::Cancelled {
                specifier: "./math.js".to_string()
            }
        );
        assert!(loader.cache().is_empty());

        let module = loader.load(&LoadContext::background(), "./math.js").unwrap();
        assert_eq!(module.source(), "// source of ./math.js");
        assert_eq!(counting.calls(), 2);
    }

    #[test]
    fn test_remote_redirect_off_allow_list_rejected() {
        let untrusted = TestServer::start();
        untrusted.route("/payload.js", Route::ok("payload();"));
        let server = TestServer::start();
        server.route(
            "/mod.js",
            Route::redirect(format!("http://localhost:{}/payload.js", untrusted.port())),
        );

        let loader = ModuleLoader::new(LoaderConfig {
            allowed_hosts: vec!["127.0.0.1".to_string()],
            ..LoaderConfig::default()
        });
        assert_eq!(loader.classifier.allowed_hosts(), &["127.0.0.1".to_string()][..]);
        assert!(loader.classify(&untrusted.url("/payload.js")).is_ok());
        assert!(loader
            .classify(&format!("http://localhost:{}/payload.js", untrusted.port()))
            .is_err());

        let err = loader
            .load(&LoadContext::background(), &server.url("/mod.js"))
            .unwrap_err();
        assert!(matches!(
            err,
            LoadError::Fetch {
                source: FetchError::HttpStatus { status: 302, .. },
                ..
            }
        ));
        assert_eq!(untrusted.hits("/payload.js"), 0);
        assert!(loader.cache().is_empty());
    }

    #[test]
    fn test_remote_and_registry_end_to_end() {
        let server = TestServer::start();
        server.route("/lib/dom.js", Route::ok("export const dom = true;"));

        let archive = tarball(&[("index.js", "module.exports = 'padded';")]);
        let metadata = serde_json::json!({
            "name": "left-pad",
            "version": "1.3.0",
            "dist": {
                "tarball": server.url("/left-pad.tgz"),
                "integrity": sha512_integrity(&archive),
            }
        });
        server.route("/left-pad/1.3.0", Route::ok(metadata.to_string()));
        server.route("/left-pad.tgz", Route::ok(archive));

        let cache = tempdir().unwrap();
        let loader = ModuleLoader::new(LoaderConfig {
            cache_root: cache.path().to_path_buf(),
            registry_url: server.base_url(),
            allowed_hosts: vec!["127.0.0.1".to_string()],
            ..LoaderConfig::default()
        });
        let ctx = LoadContext::background();

        let remote = loader.load(&ctx, &server.url("/lib/dom.js")).unwrap();
        assert_eq!(remote.kind(), SpecifierKind::Remote);
        assert_eq!(remote.source(), "export const dom = true;");

        let pkg = loader.load(&ctx, "npm:left-pad@1.3.0").unwrap();
        assert_eq!(pkg.kind(), SpecifierKind::Registry);
        assert_eq!(pkg.source(), "module.exports = 'padded';");
        assert!(cache.path().join("left-pad/1.3.0/index.js").is_file());

        loader.load(&ctx, &server.url("/lib/dom.js")).unwrap();
        assert_eq!(server.hits("/lib/dom.js"), 1);
        assert_eq!(loader.cache().len(), 2);
    }
}

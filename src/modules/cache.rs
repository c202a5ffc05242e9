//! Кэш загруженных модулей.
//!
//! Читатели работают параллельно, писатели сериализуются одной
//! эксклюзивной блокировкой. Вытеснения нет: кэш живёт столько же,
//! сколько сессия загрузчика.
//!
//! Таблица запросов "в полёте" гарантирует не более одной одновременной
//! загрузки на спецификатор: первый вызов становится ведущим, остальные
//! ждут его результата.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::time::Duration;

use super::SpecifierKind;
use crate::context::LoadContext;
use crate::error::{LoadError, LoadResult};

/// Период, с которым ожидающие проверяют собственную отмену.
const WAIT_POLL: Duration = Duration::from_millis(25);

/// Загруженный модуль. Неизменяем после создания.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    specifier: String,
    source: String,
    kind: SpecifierKind,
}

impl Module {
    pub fn new(
        specifier: impl Into<String>,
        source: impl Into<String>,
        kind: SpecifierKind,
    ) -> Self {
        Self {
            specifier: specifier.into(),
            source: source.into(),
            kind,
        }
    }

    pub fn specifier(&self) -> &str {
        &self.specifier
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn kind(&self) -> SpecifierKind {
        self.kind
    }
}

/// Результат, который ведущий публикует ожидающим.
#[derive(Debug, Default)]
struct Flight {
    result: Mutex<Option<LoadResult<Arc<Module>>>>,
    done: Condvar,
}

impl Flight {
    fn publish(&self, result: LoadResult<Arc<Module>>) {
        let mut slot = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(result);
        self.done.notify_all();
    }

    /// Дождаться результата или отмены собственного контекста.
    fn wait(&self, ctx: &LoadContext) -> Option<LoadResult<Arc<Module>>> {
        let mut slot = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(result) = slot.as_ref() {
                return Some(result.clone());
            }
            if ctx.is_done() {
                return None;
            }
            slot = self
                .done
                .wait_timeout(slot, WAIT_POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// Кэш модулей сессии.
#[derive(Debug, Default)]
pub struct ModuleCache {
    modules: RwLock<HashMap<String, Arc<Module>>>,
    in_flight: Mutex<HashMap<String, Arc<Flight>>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Получить модуль по спецификатору.
    pub fn get(&self, specifier: &str) -> Option<Arc<Module>> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(specifier)
            .cloned()
    }

    /// Сохранить модуль.
    ///
    /// Уже сохранённая запись не перезаписывается: возвращается та,
    /// что лежит в кэше.
    pub fn put(&self, module: Module) -> Arc<Module> {
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        modules
            .entry(module.specifier.clone())
            .or_insert_with(|| Arc::new(module))
            .clone()
    }

    pub fn contains(&self, specifier: &str) -> bool {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(specifier)
    }

    pub fn len(&self) -> usize {
        self.modules.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Спецификаторы всех закэшированных модулей (в отсортированном виде).
    pub fn specifiers(&self) -> Vec<String> {
        let mut specs: Vec<String> = self
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        specs.sort();
        specs
    }

    /// Вернуть модуль из кэша или загрузить его ровно одним вызовом `fetch`.
    ///
    /// Одновременные вызовы для того же спецификатора ждут ведущего.
    /// Если ведущий был отменён, ожидающие пробуют снова вместо того,
    /// чтобы унаследовать чужую отмену. Ошибка не попадает в кэш.
    pub fn get_or_load<F>(
        &self,
        ctx: &LoadContext,
        specifier: &str,
        fetch: F,
    ) -> LoadResult<Arc<Module>>
    where
        F: FnOnce() -> LoadResult<Module>,
    {
        loop {
            if let Some(module) = self.get(specifier) {
                log::debug!("module cache hit: {}", specifier);
                return Ok(module);
            }

            let flight = {
                let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
                // Ведущий кладёт модуль в кэш до снятия записи из таблицы,
                // поэтому повторная проверка под блокировкой не пропустит его.
                if let Some(module) = self.get(specifier) {
                    return Ok(module);
                }
                match in_flight.get(specifier) {
                    Some(flight) => flight.clone(),
                    None => {
                        in_flight.insert(specifier.to_string(), Arc::new(Flight::default()));
                        break;
                    }
                }
            };

            log::debug!("waiting for in-flight load of {}", specifier);
            match flight.wait(ctx) {
                Some(Err(LoadError::Cancelled { .. })) => continue,
                Some(result) => return result,
                None => {
                    return Err(LoadError::Cancelled {
                        specifier: specifier.to_string(),
                    })
                }
            }
        }

        let guard = LeaderGuard {
            cache: self,
            specifier,
            published: false,
        };
        let result = fetch().map(|module| self.put(module));
        guard.finish(result.clone());
        result
    }

    fn finish_flight(&self, specifier: &str, result: LoadResult<Arc<Module>>) {
        let flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(specifier);
        if let Some(flight) = flight {
            flight.publish(result);
        }
    }
}

/// Снимает запись ведущего из таблицы даже при панике внутри `fetch`.
struct LeaderGuard<'a> {
    cache: &'a ModuleCache,
    specifier: &'a str,
    published: bool,
}

impl LeaderGuard<'_> {
    fn finish(mut self, result: LoadResult<Arc<Module>>) {
        self.published = true;
        self.cache.finish_flight(self.specifier, result);
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.published {
            self.cache.finish_flight(
                self.specifier,
                Err(LoadError::Cancelled {
                    specifier: self.specifier.to_string(),
                }),
            );
        }
    }
}

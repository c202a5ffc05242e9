//! Граф зависимостей между модулями.
//!
//! Граф ацикличен после любого успешного `add_dependency`: ребро,
//! замыкающее цикл, отклоняется до изменения графа. Повторное добавление
//! уже существующего ребра ничего не меняет.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use crate::config::DEFAULT_MAX_DEPTH;
use crate::error::{CycleError, GraphError};

/// Ориентированный граф: родитель -> дети в порядке добавления.
#[derive(Debug)]
pub struct DependencyGraph {
    edges: RwLock<HashMap<String, Vec<String>>>,
    max_depth: usize,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    /// Граф с ограничением глубины обхода.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            edges: RwLock::new(HashMap::new()),
            max_depth: max_depth.max(1),
        }
    }

    /// Добавить ребро `parent -> child` (родитель зависит от ребёнка).
    pub fn add_dependency(&self, parent: &str, child: &str) -> Result<(), CycleError> {
        let mut edges = self.edges.write().unwrap_or_else(PoisonError::into_inner);

        if parent == child || reaches(&edges, child, parent) {
            log::warn!("rejected circular dependency {} -> {}", parent, child);
            return Err(CycleError {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }

        let children = edges.entry(parent.to_string()).or_default();
        if !children.iter().any(|c| c == child) {
            log::debug!("dependency {} -> {}", parent, child);
            children.push(child.to_string());
        }
        Ok(())
    }

    /// Порядок загрузки для `root`: каждая зависимость раньше зависящего от неё.
    ///
    /// Обход в глубину с постфиксной записью; каждый узел встречается один
    /// раз. Узел без рёбер считается листом.
    pub fn resolve_order(&self, root: &str) -> Result<Vec<String>, GraphError> {
        let edges = self.edges.read().unwrap_or_else(PoisonError::into_inner);

        let mut order = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        // (узел, индекс следующего ребёнка)
        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
        visited.insert(root);

        while let Some((node, next)) = stack.last_mut() {
            let children = edges.get(*node).map(Vec::as_slice).unwrap_or(&[]);

            match children.get(*next) {
                Some(child) => {
                    *next += 1;
                    if visited.insert(child.as_str()) {
                        if stack.len() >= self.max_depth {
                            return Err(GraphError::DepthExceeded {
                                root: root.to_string(),
                                limit: self.max_depth,
                            });
                        }
                        stack.push((child.as_str(), 0));
                    }
                }
                None => {
                    order.push(node.to_string());
                    stack.pop();
                }
            }
        }

        Ok(order)
    }

    /// Прямые зависимости модуля.
    pub fn dependencies(&self, specifier: &str) -> Vec<String> {
        self.edges
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(specifier)
            .cloned()
            .unwrap_or_default()
    }

    /// Есть ли узел в графе (как родитель или как ребёнок).
    pub fn contains(&self, specifier: &str) -> bool {
        let edges = self.edges.read().unwrap_or_else(PoisonError::into_inner);
        edges.contains_key(specifier)
            || edges.values().any(|children| children.iter().any(|c| c == specifier))
    }

    pub fn edge_count(&self) -> usize {
        self.edges
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Число узлов (родителей и детей).
    pub fn len(&self) -> usize {
        let edges = self.edges.read().unwrap_or_else(PoisonError::into_inner);
        let mut nodes: HashSet<&str> = edges.keys().map(String::as_str).collect();
        nodes.extend(edges.values().flatten().map(String::as_str));
        nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.read().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Достижим ли `target` из `start` по текущим рёбрам.
fn reaches(edges: &HashMap<String, Vec<String>>, start: &str, target: &str) -> bool {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack = vec![start];

    while let Some(node) = stack.pop() {
        if node == target {
            return true;
        }
        if !visited.insert(node) {
            continue;
        }
        if let Some(children) = edges.get(node) {
            stack.extend(children.iter().map(String::as_str));
        }
    }

    false
}

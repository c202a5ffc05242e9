//! Хранилище установленных пакетов.
//!
//! Раскладка: `{root}/{name}/{version}/`, внутри - содержимое архива пакета.
//! Установка идёт во временный каталог рядом с целевым и завершается
//! атомарным переименованием, так что каталог версии появляется только
//! целиком. Если два установщика гонятся за одной версией, выигрывает
//! первый переименовавший, второй удаляет свою копию.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::GzDecoder;
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Digest, Sha512};

use crate::error::FetchError;
use crate::modules::PackageRef;

/// Точка входа пакета, если `package.json` её не указывает.
pub const DEFAULT_ENTRY: &str = "index.js";

/// Манифест пакета внутри архива.
pub const PACKAGE_MANIFEST: &str = "package.json";

static STAGING_COUNTER: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Default, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    main: Option<String>,
}

/// Кэш установленных пакетов на диске.
#[derive(Debug)]
pub struct PackageStore {
    root: PathBuf,
    /// Блокировки установки по пакету (в пределах процесса)
    locks: Mutex<HashMap<PackageRef, Arc<Mutex<()>>>>,
}

impl PackageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Каталог установленной версии пакета.
    pub fn package_dir(&self, pkg: &PackageRef) -> Result<PathBuf, FetchError> {
        validate(pkg)?;
        Ok(self.root.join(&pkg.name).join(&pkg.version))
    }

    pub fn is_installed(&self, pkg: &PackageRef) -> bool {
        self.package_dir(pkg).map(|dir| dir.is_dir()).unwrap_or(false)
    }

    /// Блокировка установки конкретного пакета.
    pub fn install_lock(&self, pkg: &PackageRef) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(pkg.clone())
            .or_default()
            .clone()
    }

    /// Путь к файлу точки входа: `main` из `package.json` или `index.js`.
    pub fn entry_file(&self, pkg: &PackageRef) -> Result<PathBuf, FetchError> {
        let dir = self.package_dir(pkg)?;
        let manifest = match fs::read_to_string(dir.join(PACKAGE_MANIFEST)) {
            Ok(content) => serde_json::from_str::<PackageManifest>(&content).map_err(|e| {
                FetchError::InvalidPackage {
                    package: pkg.to_string(),
                    reason: format!("bad {}: {}", PACKAGE_MANIFEST, e),
                }
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => PackageManifest::default(),
            Err(e) => {
                return Err(FetchError::Read {
                    path: dir.join(PACKAGE_MANIFEST).display().to_string(),
                    reason: e.to_string(),
                })
            }
        };

        let entry = manifest
            .main
            .as_deref()
            .map(|m| m.trim_start_matches("./"))
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_ENTRY);
        let relative = safe_relative(Path::new(entry)).ok_or_else(|| FetchError::InvalidPackage {
            package: pkg.to_string(),
            reason: format!("entry '{}' escapes the package directory", entry),
        })?;

        let path = dir.join(relative);
        if path.is_file() {
            return Ok(path);
        }
        // `"main": "lib/index"` без расширения
        let with_ext = path.with_extension("js");
        if path.extension().is_none() && with_ext.is_file() {
            return Ok(with_ext);
        }
        Err(FetchError::NotFound(path))
    }

    /// Прочитать точку входа установленного пакета.
    pub fn read_entry(&self, pkg: &PackageRef) -> Result<String, FetchError> {
        let path = self.entry_file(pkg)?;
        fs::read_to_string(&path).map_err(|e| FetchError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Установить пакет: `populate` заполняет временный каталог,
    /// который затем атомарно становится каталогом версии.
    pub fn provision<F>(&self, pkg: &PackageRef, populate: F) -> Result<PathBuf, FetchError>
    where
        F: FnOnce(&Path) -> Result<(), FetchError>,
    {
        let target = self.package_dir(pkg)?;
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent).map_err(|e| io_error(&parent, e))?;

        let staging = parent.join(format!(
            ".{}.staging-{}-{}",
            pkg.version,
            std::process::id(),
            STAGING_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir(&staging).map_err(|e| io_error(&staging, e))?;

        if let Err(e) = populate(&staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        match fs::rename(&staging, &target) {
            Ok(()) => {
                log::info!("installed {} into {}", pkg, target.display());
                Ok(target)
            }
            Err(_) if target.is_dir() => {
                log::warn!("{} was installed concurrently, discarding staging copy", pkg);
                let _ = fs::remove_dir_all(&staging);
                Ok(target)
            }
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                Err(io_error(&target, e))
            }
        }
    }

    /// Все установленные пакеты, отсортированные по имени и версии.
    pub fn installed(&self) -> io::Result<Vec<PackageRef>> {
        let mut packages = Vec::new();
        if !self.root.is_dir() {
            return Ok(packages);
        }

        for name in visible_dirs(&self.root)? {
            if name.starts_with('@') {
                for scoped in visible_dirs(&self.root.join(&name))? {
                    let full = format!("{}/{}", name, scoped);
                    collect_versions(&self.root.join(&full), &full, &mut packages)?;
                }
            } else {
                collect_versions(&self.root.join(&name), &name, &mut packages)?;
            }
        }

        packages.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
        Ok(packages)
    }

    /// Удалить установленную версию. `false`, если её не было.
    pub fn remove(&self, pkg: &PackageRef) -> Result<bool, FetchError> {
        let dir = self.package_dir(pkg)?;
        if !dir.is_dir() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        Ok(true)
    }

    /// Удалить весь кэш пакетов.
    pub fn clear(&self) -> io::Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}

/// Проверить целостность архива по `integrity` (SRI: `sha512-`/`sha1-`,
/// base64) и `shasum` (hex SHA-1).
///
/// Заданное значение с неизвестным алгоритмом считается ошибкой.
pub fn verify_integrity(
    data: &[u8],
    integrity: Option<&str>,
    shasum: Option<&str>,
) -> Result<(), String> {
    let integrity = integrity.map(str::trim).filter(|v| !v.is_empty());
    let shasum = shasum.map(str::trim).filter(|v| !v.is_empty());

    if let Some(integrity) = integrity {
        verify_sri(data, integrity)?;
    }

    if let Some(expected) = shasum {
        let actual = hex::encode(Sha1::digest(data));
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(format!("shasum mismatch: expected {}, got {}", expected, actual));
        }
    }

    if integrity.is_none() && shasum.is_none() {
        log::warn!("package archive has no integrity data");
    }
    Ok(())
}

/// Самый сильный поддерживаемый хеш из списка SRI.
fn verify_sri(data: &[u8], integrity: &str) -> Result<(), String> {
    let mut sha1 = None;
    for candidate in integrity.split_whitespace() {
        if let Some(expected) = candidate.strip_prefix("sha512-") {
            let actual = BASE64.encode(Sha512::digest(data));
            return compare_digest("sha512", expected, &actual);
        }
        if let Some(expected) = candidate.strip_prefix("sha1-") {
            sha1.get_or_insert(expected);
        }
    }

    match sha1 {
        Some(expected) => compare_digest("sha1", expected, &BASE64.encode(Sha1::digest(data))),
        None => Err(format!("unsupported integrity algorithm in '{}'", integrity)),
    }
}

fn compare_digest(algorithm: &str, expected: &str, actual: &str) -> Result<(), String> {
    if expected == actual {
        Ok(())
    } else {
        Err(format!("{} mismatch: expected {}, got {}", algorithm, expected, actual))
    }
}

/// Распаковать `.tgz` пакета в `dest`, отбросив первый компонент пути
/// (`package/`). Символические ссылки и пути за пределами `dest` пропускаются.
pub fn unpack_tarball(data: &[u8], dest: &Path) -> Result<(), FetchError> {
    let extract_err = |e: io::Error| FetchError::Read {
        path: dest.display().to_string(),
        reason: format!("failed to extract package archive: {}", e),
    };

    let mut archive = tar::Archive::new(GzDecoder::new(data));
    for entry in archive.entries().map_err(extract_err)? {
        let mut entry = entry.map_err(extract_err)?;
        let path = entry.path().map_err(extract_err)?.into_owned();

        let stripped: PathBuf = path.components().skip(1).collect();
        let relative = match safe_relative(&stripped) {
            Some(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let out = dest.join(relative);

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs::create_dir_all(&out).map_err(|e| io_error(&out, e))?;
        } else if entry_type.is_file() {
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
            }
            let mut content = Vec::new();
            entry.read_to_end(&mut content).map_err(extract_err)?;
            fs::write(&out, content).map_err(|e| io_error(&out, e))?;
        }
    }

    Ok(())
}

/// Путь без `..`, корня и префиксов диска.
fn safe_relative(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(out)
}

fn validate(pkg: &PackageRef) -> Result<(), FetchError> {
    let invalid = |reason: &str| FetchError::InvalidPackage {
        package: pkg.to_string(),
        reason: reason.to_string(),
    };

    if pkg.name.is_empty() {
        return Err(invalid("empty package name"));
    }
    let segments: Vec<&str> = pkg.name.split('/').collect();
    let scoped = pkg.name.starts_with('@');
    if segments.len() > 2 || (segments.len() == 2 && !scoped) {
        return Err(invalid("package name has too many path segments"));
    }
    let bad_segment = |s: &str| s.is_empty() || s == "." || s == ".." || s.contains('\\');
    if segments.iter().any(|s| bad_segment(s)) || (scoped && segments.len() != 2) {
        return Err(invalid("malformed package name"));
    }
    if bad_segment(&pkg.version) || pkg.version.contains('/') || pkg.version.starts_with('.') {
        return Err(invalid("malformed package version"));
    }
    Ok(())
}

fn visible_dirs(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with('.') {
            names.push(name);
        }
    }
    Ok(names)
}

fn collect_versions(dir: &Path, name: &str, out: &mut Vec<PackageRef>) -> io::Result<()> {
    for version in visible_dirs(dir)? {
        out.push(PackageRef {
            name: name.to_string(),
            version,
        });
    }
    Ok(())
}

fn io_error(path: &Path, e: io::Error) -> FetchError {
    FetchError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

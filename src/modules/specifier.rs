//! Классификация спецификаторов модулей.
//!
//! Порядок проверок фиксирован: префиксы схем (`npm:`, `jsr:`), затем форма
//! пути, затем разбор URL. Неоднозначные строки разрешаются этим порядком.

use std::fmt;
use std::path::Path;

use url::Url;

use crate::error::ClassifyError;

/// Префикс пакетов основного реестра.
pub const REGISTRY_PREFIX: &str = "npm:";

/// Префикс пакетов альтернативного реестра.
pub const ALT_REGISTRY_PREFIX: &str = "jsr:";

/// Версия пакета, если она не указана.
pub const DEFAULT_VERSION: &str = "latest";

/// Источник модуля.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecifierKind {
    /// Файл на локальном диске
    Local,
    /// URL доверенного CDN
    Remote,
    /// Пакет основного реестра (`npm:`)
    Registry,
    /// Пакет альтернативного реестра (`jsr:`)
    AltRegistry,
}

impl SpecifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecifierKind::Local => "local",
            SpecifierKind::Remote => "remote",
            SpecifierKind::Registry => "registry",
            SpecifierKind::AltRegistry => "alt-registry",
        }
    }
}

impl fmt::Display for SpecifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Классификатор со списком доверенных хостов.
#[derive(Debug, Clone)]
pub struct SpecifierClassifier {
    allowed_hosts: Vec<String>,
}

impl SpecifierClassifier {
    pub fn new(allowed_hosts: Vec<String>) -> Self {
        Self {
            allowed_hosts: allowed_hosts
                .into_iter()
                .map(|h| h.trim().trim_end_matches('.').to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// Определить вид спецификатора.
    pub fn classify(&self, specifier: &str) -> Result<SpecifierKind, ClassifyError> {
        classify(specifier, &self.allowed_hosts)
    }

    pub fn allowed_hosts(&self) -> &[String] {
        &self.allowed_hosts
    }
}

/// Определить вид спецификатора.
pub fn classify(specifier: &str, allowed_hosts: &[String]) -> Result<SpecifierKind, ClassifyError> {
    if specifier.is_empty() {
        return Err(ClassifyError::EmptySpecifier);
    }

    if specifier.starts_with(REGISTRY_PREFIX) {
        return Ok(SpecifierKind::Registry);
    }

    if specifier.starts_with(ALT_REGISTRY_PREFIX) {
        return Ok(SpecifierKind::AltRegistry);
    }

    if is_local_path(specifier) {
        return Ok(SpecifierKind::Local);
    }

    let url = Url::parse(specifier).map_err(|e| ClassifyError::MalformedUrl {
        specifier: specifier.to_string(),
        reason: e.to_string(),
    })?;

    if is_trusted_url(&url, allowed_hosts) {
        Ok(SpecifierKind::Remote)
    } else {
        Err(ClassifyError::UnsupportedSpecifier(specifier.to_string()))
    }
}

/// Абсолютный путь, `./`, `../` или буква диска (`C:`).
pub fn is_local_path(specifier: &str) -> bool {
    if specifier.starts_with("./") || specifier.starts_with("../") {
        return true;
    }

    if specifier.starts_with('/') || Path::new(specifier).is_absolute() {
        return true;
    }

    let bytes = specifier.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// http(s) URL, хост которого совпадает с доверенным или является его поддоменом.
pub fn is_trusted_url(url: &Url, allowed_hosts: &[String]) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }

    let host = match url.host_str() {
        Some(host) => host.trim_end_matches('.').to_ascii_lowercase(),
        None => return false,
    };

    allowed_hosts.iter().any(|allowed| {
        host == *allowed
            || host
                .strip_suffix(allowed.as_str())
                .is_some_and(|rest| rest.ends_with('.'))
    })
}

/// Ссылка на пакет реестра: имя и версия.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageRef {
    pub name: String,
    pub version: String,
}

impl PackageRef {
    /// Разобрать `name[@version]`, с префиксом `npm:`/`jsr:` или без него.
    ///
    /// Разделителем служит последний `@`; ведущий `@` имени со скоупом
    /// (`@types/node`) разделителем не считается.
    pub fn parse(specifier: &str) -> Self {
        let bare = specifier
            .strip_prefix(REGISTRY_PREFIX)
            .or_else(|| specifier.strip_prefix(ALT_REGISTRY_PREFIX))
            .unwrap_or(specifier);

        match bare.rfind('@') {
            Some(idx) if idx > 0 => {
                let (name, version) = (&bare[..idx], &bare[idx + 1..]);
                Self {
                    name: name.to_string(),
                    version: if version.is_empty() {
                        DEFAULT_VERSION.to_string()
                    } else {
                        version.to_string()
                    },
                }
            }
            _ => Self {
                name: bare.to_string(),
                version: DEFAULT_VERSION.to_string(),
            },
        }
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_ALLOWED_HOSTS;

    fn classifier() -> SpecifierClassifier {
        SpecifierClassifier::new(DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect())
    }

    #[test]
    fn test_empty_specifier() {
        assert_eq!(classifier().classify(""), Err(ClassifyError::EmptySpecifier));
    }

    #[test]
    fn test_registry_prefixes() {
        let c = classifier();
        assert_eq!(c.classify("npm:lodash@4.17.21"), Ok(SpecifierKind::Registry));
        assert_eq!(c.classify("npm:left-pad"), Ok(SpecifierKind::Registry));
        assert_eq!(c.classify("jsr:@std/fmt"), Ok(SpecifierKind::AltRegistry));
    }

    #[test]
    fn test_local_paths() {
        let c = classifier();
        assert_eq!(c.classify("./lib/math.js"), Ok(SpecifierKind::Local));
        assert_eq!(c.classify("../shared/util.js"), Ok(SpecifierKind::Local));
        assert_eq!(c.classify("/usr/lib/edon/std.js"), Ok(SpecifierKind::Local));
        assert_eq!(c.classify("C:\\scripts\\main.js"), Ok(SpecifierKind::Local));
        assert_eq!(c.classify("d:/scripts/main.js"), Ok(SpecifierKind::Local));
    }

    #[test]
    fn test_remote_allow_list() {
        let c = classifier();
        assert_eq!(
            c.classify("https://cdn.jsdelivr.net/npm/lodash@4/lodash.min.js"),
            Ok(SpecifierKind::Remote)
        );
        assert_eq!(c.classify("https://unpkg.com/react@18"), Ok(SpecifierKind::Remote));
        assert_eq!(
            c.classify("https://fastly.cdn.jsdelivr.net/x.js"),
            Ok(SpecifierKind::Remote)
        );
    }

    #[test]
    fn test_untrusted_hosts_rejected() {
        let c = classifier();
        for spec in [
            "https://example.com/mod.js",
            "https://evil-unpkg.com/mod.js",
            "https://unpkg.com.attacker.net/mod.js",
            "ftp://unpkg.com/mod.js",
        ] {
            assert!(
                matches!(c.classify(spec), Err(ClassifyError::UnsupportedSpecifier(_))),
                "{} should be rejected",
                spec
            );
        }
    }

    #[test]
    fn test_malformed_url() {
        let c = classifier();
        assert!(matches!(
            c.classify("lodash"),
            Err(ClassifyError::MalformedUrl { .. })
        ));
        assert!(matches!(
            c.classify("https://"),
            Err(ClassifyError::MalformedUrl { .. })
        ));
    }

    #[test]
    fn test_prefix_wins_over_path_shape() {
        // "npm:./x" выглядит как путь, но префикс схемы приоритетнее
        assert_eq!(classifier().classify("npm:./x"), Ok(SpecifierKind::Registry));
    }

    #[test]
    fn test_package_ref_with_version() {
        let pkg = PackageRef::parse("npm:left-pad@1.3.0");
        assert_eq!(pkg.name, "left-pad");
        assert_eq!(pkg.version, "1.3.0");
    }

    #[test]
    fn test_package_ref_default_version() {
        let pkg = PackageRef::parse("npm:left-pad");
        assert_eq!(pkg.name, "left-pad");
        assert_eq!(pkg.version, DEFAULT_VERSION);
    }

    #[test]
    fn test_package_ref_scoped() {
        let pkg = PackageRef::parse("npm:@types/node@20.1.0");
        assert_eq!(pkg.name, "@types/node");
        assert_eq!(pkg.version, "20.1.0");

        let pkg = PackageRef::parse("jsr:@std/fmt");
        assert_eq!(pkg.name, "@std/fmt");
        assert_eq!(pkg.version, DEFAULT_VERSION);
        assert_eq!(pkg.to_string(), "@std/fmt@latest");
    }
}

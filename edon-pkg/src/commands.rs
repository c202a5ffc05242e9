//! CLI command implementations.

use colored::Colorize;
use edon::fetch::{HttpClient, RegistryClient, RegistryFetcher};
use edon::{LoadContext, LoaderConfig, PackageRef, PackageStore};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

/// Тип результата команды.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

fn registry_client(config: &LoaderConfig) -> RegistryClient {
    RegistryClient::new(&config.registry_url, HttpClient::new(config.timeout()))
}

fn fetcher(config: &LoaderConfig) -> RegistryFetcher {
    RegistryFetcher::new(
        registry_client(config),
        Arc::new(PackageStore::new(&config.cache_root)),
    )
}

fn context(config: &LoaderConfig) -> LoadContext {
    match config.timeout() {
        Some(timeout) => LoadContext::background().with_timeout(timeout),
        None => LoadContext::background(),
    }
}

/// Имя пакета с необязательной версией; префикс `npm:` допустим.
fn parse_package(spec: &str) -> Result<PackageRef, Box<dyn std::error::Error>> {
    let pkg = PackageRef::parse(spec);
    if pkg.name.is_empty() {
        return Err(format!("Invalid package: '{}'", spec).into());
    }
    Ok(pkg)
}

/// Установить пакеты в кэш.
pub fn install_packages(
    config: &LoaderConfig,
    packages: &[String],
    force: bool,
    verbose: bool,
) -> CommandResult {
    let fetcher = fetcher(config);
    let ctx = context(config);

    let pb = if verbose {
        let pb = ProgressBar::new(packages.len() as u64);
        let template = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}";
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            pb.set_style(style.progress_chars("#>-"));
        }
        Some(pb)
    } else {
        None
    };

    let mut failed = 0;
    for (i, spec) in packages.iter().enumerate() {
        let pkg = parse_package(spec)?;
        if let Some(ref pb) = pb {
            pb.set_message(format!("Installing {}", pkg));
            pb.set_position(i as u64);
        }

        if !force && fetcher.store().is_installed(&pkg) {
            println!("{} {} already installed", "✓".green(), pkg);
            continue;
        }

        let result = if force {
            fetcher.reinstall(&ctx, &pkg)
        } else {
            fetcher.install(&ctx, &pkg)
        };

        match result {
            Ok(dir) => {
                log::debug!("installed {} into {}", pkg, dir.display());
                println!("{} Installed {}", "✓".green(), pkg);
            }
            Err(e) => {
                failed += 1;
                eprintln!("{} {}: {}", "✗".red(), pkg, e);
            }
        }
    }

    if let Some(pb) = pb {
        pb.finish_with_message("Done!");
    }

    if failed > 0 {
        return Err(format!("{} of {} packages failed to install", failed, packages.len()).into());
    }
    Ok(())
}

/// Показать метаданные версии пакета.
pub fn package_info(config: &LoaderConfig, package: &str) -> CommandResult {
    let pkg = parse_package(package)?;
    let metadata = registry_client(config).metadata(&context(config), &pkg)?;

    let name = metadata.name.as_deref().unwrap_or(&pkg.name);
    let version = metadata.version.as_deref().unwrap_or(&pkg.version);
    println!("{} {}", name.bold(), version);
    if let Some(description) = &metadata.description {
        println!("  {}", description.dimmed());
    }
    if let Some(license) = &metadata.license {
        println!("  license:   {}", license);
    }
    if let Some(main) = &metadata.main {
        println!("  main:      {}", main);
    }
    if let Some(dist) = &metadata.dist {
        println!("  tarball:   {}", dist.tarball);
        if let Some(integrity) = &dist.integrity {
            println!("  integrity: {}", integrity);
        }
        if let Some(shasum) = &dist.shasum {
            println!("  shasum:    {}", shasum);
        }
    }

    let store = PackageStore::new(&config.cache_root);
    if store.is_installed(&pkg) {
        println!("  installed: {}", store.package_dir(&pkg)?.display());
    }

    Ok(())
}

/// Список установленных пакетов.
pub fn list_packages(config: &LoaderConfig) -> CommandResult {
    let store = PackageStore::new(&config.cache_root);
    let packages = store.installed()?;

    if packages.is_empty() {
        println!("No packages installed");
        return Ok(());
    }

    for pkg in &packages {
        println!("  {}", pkg);
    }
    println!("{} {} packages in {}", "✓".green(), packages.len(), store.root().display());
    Ok(())
}

/// Удалить один пакет или весь кэш.
pub fn clean(config: &LoaderConfig, package: Option<&str>) -> CommandResult {
    let store = PackageStore::new(&config.cache_root);

    match package {
        Some(spec) => {
            let pkg = parse_package(spec)?;
            if !store.remove(&pkg)? {
                return Err(format!("Package '{}' is not installed", pkg).into());
            }
            println!("{} Removed {}", "✓".green(), pkg);
        }
        None => {
            store.clear()?;
            println!("{} Cleaned {}", "✓".green(), store.root().display());
        }
    }

    Ok(())
}

/// Вывести путь к кэшу пакетов.
pub fn cache_path(config: &LoaderConfig) -> CommandResult {
    println!("{}", config.cache_root.display());
    Ok(())
}

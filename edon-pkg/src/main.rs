//! edon Package Manager
//!
//! Управление кэшем пакетов реестра для рантайма edon.
//!
//! # Использование
//!
//! ```bash
//! # Установить пакеты в кэш
//! edon-pkg install left-pad lodash@4.17.21
//!
//! # Переустановить
//! edon-pkg install left-pad@1.3.0 --force
//!
//! # Показать метаданные версии
//! edon-pkg info left-pad@1.3.0
//!
//! # Установленные пакеты
//! edon-pkg list
//!
//! # Очистить кэш (целиком или один пакет)
//! edon-pkg clean
//! edon-pkg clean left-pad@1.3.0
//!
//! # Путь к кэшу
//! edon-pkg path
//! ```

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use edon::LoaderConfig;
use std::process::ExitCode;

/// edon Package Manager
#[derive(Parser)]
#[command(name = "edon-pkg")]
#[command(version)]
#[command(about = "Package cache manager for the edon JavaScript runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install packages into the cache
    Install {
        /// Packages (optionally with version: package@1.0.0)
        #[arg(required = true)]
        packages: Vec<String>,

        /// Force reinstall
        #[arg(long)]
        force: bool,
    },

    /// Show package info
    Info {
        /// Package name (optionally with version)
        package: String,
    },

    /// List installed packages
    List,

    /// Remove cached packages
    Clean {
        /// Specific package to remove
        package: Option<String>,
    },

    /// Print the cache directory
    Path,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match LoaderConfig::discover() {
        Ok(config) => config,
        Err(e) => {
            if !cli.quiet {
                eprintln!("{}: {}", "error".red().bold(), e);
            }
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Install { packages, force } => {
            commands::install_packages(&config, &packages, force, cli.verbose)
        }
        Commands::Info { package } => commands::package_info(&config, &package),
        Commands::List => commands::list_packages(&config),
        Commands::Clean { package } => commands::clean(&config, package.as_deref()),
        Commands::Path => commands::cache_path(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if !cli.quiet {
                eprintln!("{}: {}", "error".red().bold(), e);
            }
            ExitCode::FAILURE
        }
    }
}

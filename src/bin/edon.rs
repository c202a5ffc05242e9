//! edon CLI - загрузка модулей и интерактивная оболочка загрузчика.
//!
//! Использование:
//!   edon                - запустить оболочку
//!   edon <specifier>    - загрузить модуль и вывести исходный текст
//!   edon --help         - справка

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::env;
use std::fs;
use std::process;
use std::time::Instant;

use edon::{LoadContext, LoaderConfig, ModuleLoader};

const VERSION: &str = env!("CARGO_PKG_VERSION");

const HELP: &str = r#"
edon - module loader for the edon JavaScript runtime

USAGE:
    edon                     Start the loader shell (interactive mode)
    edon <specifier>         Load a module and print its source
    edon --help, -h          Show this help
    edon --version, -v       Show version

SPECIFIERS:
    ./lib/math.js            Local file (also ../x, /abs/path, C:\x)
    npm:left-pad@1.3.0       Registry package (version defaults to latest)
    jsr:@std/fmt             Alternate registry (not implemented yet)
    https://unpkg.com/...    Trusted CDN URL

SHELL COMMANDS:
    :load, :l <spec>         Load a module
    :kind, :k <spec>         Classify a specifier
    :dep <parent> <child>    Record a dependency edge
    :deps <spec>             Show direct dependencies
    :order, :o <root>        Show the load order for a root
    :graph, :g <root>        Load a root and all its dependencies
    :cache                   List cached modules
    :reset, :r               Start a fresh loader session
    :help, :h                Show help
    :quit, :q, :exit         Exit

ENVIRONMENT:
    EDON_CACHE_DIR           Package cache directory
    EDON_REGISTRY            Registry URL
    RUST_LOG                 Log filter (e.g. RUST_LOG=edon=debug)
"#;

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();

    let config = match LoaderConfig::discover() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {}", e);
            process::exit(1);
        }
    };

    match args.len() {
        1 => run_shell(config),
        2 => match args[1].as_str() {
            "--help" | "-h" => {
                println!("{}", HELP);
            }
            "--version" | "-v" => {
                println!("edon {}", VERSION);
            }
            specifier => run_load(config, specifier),
        },
        _ => {
            eprintln!("Too many arguments.");
            eprintln!("Use --help for usage information.");
            process::exit(1);
        }
    }
}

/// Загрузить один модуль и вывести его исходный текст.
fn run_load(config: LoaderConfig, specifier: &str) {
    let ctx = context_for(&config);
    let loader = ModuleLoader::new(config);

    match loader.load(&ctx, specifier) {
        Ok(module) => print!("{}", module.source()),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn context_for(config: &LoaderConfig) -> LoadContext {
    match config.timeout() {
        Some(timeout) => LoadContext::background().with_timeout(timeout),
        None => LoadContext::background(),
    }
}

/// Запустить интерактивную оболочку.
fn run_shell(config: LoaderConfig) {
    println!("edon {} - module loader shell", VERSION);
    println!("Type :help for commands, :quit to exit.\n");

    let mut rl = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("Failed to initialize readline: {}", e);
            process::exit(1);
        }
    };

    let mut loader = ModuleLoader::new(config.clone());
    let history_path = dirs_next::data_dir()
        .map(|p| p.join("edon").join("history.txt"))
        .unwrap_or_else(|| std::path::PathBuf::from(".edon_history"));

    // Загрузить историю
    let _ = rl.load_history(&history_path);

    loop {
        match rl.readline("edon> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if !line.starts_with(':') {
                    // Строка без команды - это спецификатор
                    load_one(&loader, &config, line);
                    continue;
                }

                match handle_command(line, &loader, &config) {
                    CommandResult::Continue => {}
                    CommandResult::Exit => break,
                    CommandResult::Reset => {
                        loader = ModuleLoader::new(config.clone());
                        println!("Loader session reset.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    // Сохранить историю
    if let Some(parent) = history_path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let _ = rl.save_history(&history_path);
}

enum CommandResult {
    Continue,
    Exit,
    Reset,
}

fn handle_command(cmd: &str, loader: &ModuleLoader, config: &LoaderConfig) -> CommandResult {
    let mut parts = cmd.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    match (command, args.as_slice()) {
        (":help" | ":h", _) => println!("{}", HELP),
        (":quit" | ":q" | ":exit", _) => return CommandResult::Exit,
        (":reset" | ":r", _) => return CommandResult::Reset,
        (":load" | ":l", [spec]) => load_one(loader, config, spec),
        (":kind" | ":k", [spec]) => match loader.classify(spec) {
            Ok(kind) => println!("{}", kind),
            Err(e) => eprintln!("Error: {}", e),
        },
        (":dep", [parent, child]) => match loader.add_dependency(parent, child) {
            Ok(()) => println!("{} -> {}", parent, child),
            Err(e) => eprintln!("Error: {}", e),
        },
        (":deps", [spec]) => {
            let deps = loader.graph().dependencies(spec);
            if deps.is_empty() {
                println!("(no dependencies)");
            }
            for dep in deps {
                println!("  {}", dep);
            }
        }
        (":order" | ":o", [root]) => match loader.resolve_order(root) {
            Ok(order) => {
                for (i, spec) in order.iter().enumerate() {
                    println!("{:>3}. {}", i + 1, spec);
                }
            }
            Err(e) => eprintln!("Error: {}", e),
        },
        (":graph" | ":g", [root]) => {
            let started = Instant::now();
            match loader.load_graph(&context_for(config), root) {
                Ok(modules) => {
                    for module in &modules {
                        println!(
                            "  {} [{}] {} bytes",
                            module.specifier(),
                            module.kind(),
                            module.source().len()
                        );
                    }
                    println!("Loaded {} modules in {:?}", modules.len(), started.elapsed());
                }
                Err(e) => eprintln!("Error: {}", e),
            }
        }
        (":cache", _) => {
            let specs = loader.cache().specifiers();
            if specs.is_empty() {
                println!("(cache is empty)");
            }
            for spec in specs {
                println!("  {}", spec);
            }
        }
        (":load" | ":l" | ":kind" | ":k" | ":deps" | ":order" | ":o" | ":graph" | ":g", _) => {
            println!("Usage: {} <specifier>", command);
        }
        (":dep", _) => println!("Usage: :dep <parent> <child>"),
        _ => {
            println!("Unknown command: {}", command);
            println!("Type :help for available commands.");
        }
    }

    CommandResult::Continue
}

fn load_one(loader: &ModuleLoader, config: &LoaderConfig, spec: &str) {
    let started = Instant::now();
    match loader.load(&context_for(config), spec) {
        Ok(module) => {
            println!(
                "Loaded {} [{}] {} bytes in {:?}",
                module.specifier(),
                module.kind(),
                module.source().len(),
                started.elapsed()
            );
        }
        Err(e) => eprintln!("Error: {}", e),
    }
}

use collgraph::cli::{self, Args, Command};
use collgraph::config::{self, PathConfig, Settings};
use collgraph::entities::Main;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info, warn};

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| config::data_file(config::LOG_FILE, path_config));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn run(args: &Args, settings: &Settings) -> Result<()> {
    let mut main = Main::from_json(&args.file_path)?;
    if settings.repair_on_load && cli::repair(&mut main) {
        info!("Repaired {} on load", args.file_path.display());
    }
    if settings.warm_caches {
        main.warm_object_caches();
    }

    match args.command.clone().unwrap_or(Command::Tree) {
        Command::Tree => print!("{}", cli::format_tree(&main)),
        Command::Check => {
            let problems = cli::check(&mut main);
            for problem in &problems {
                println!("{problem}");
            }
            if !problems.is_empty() {
                bail!("{} problem(s) in {}", problems.len(), args.file_path.display());
            }
            println!("OK");
        }
        Command::Repair { output } => {
            let changed = cli::repair(&mut main);
            if settings.validate_on_save {
                let problems = cli::check(&mut main);
                if !problems.is_empty() {
                    bail!("Still invalid after repair: {}", problems.join("; "));
                }
            }
            let target = output.unwrap_or_else(|| args.file_path.clone());
            let written = main.to_json(&target)?;
            println!("{} {}", if changed { "Repaired" } else { "Unchanged" }, written.display());
        }
        Command::Objects { collection, instanced } => {
            for name in cli::list_objects(&main, collection.as_deref(), instanced)? {
                println!("{name}");
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logging(&args, &path_config)?;
    debug!("Command-line args: {:?}", args);
    info!("Config path: {}", config::config_file(config::SETTINGS_FILE, &path_config).display());

    let settings = Settings::load(&path_config).unwrap_or_else(|e| {
        warn!("Settings not loaded, using defaults: {:#}", e);
        Settings::default()
    });
    run(&args, &settings)
}

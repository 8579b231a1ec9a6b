//! HoboMirror CLI - point-in-time directory mirroring
//!
//! Parses the task list, loads persisted settings, wires up the reporter,
//! and drives the orchestrator. The process exit code is 2 after any
//! critical error, 1 after any error, 0 otherwise.

use chrono::Utc;
use clap::Parser;
use hobomirror::config::{CliArgs, Commands, MirrorConfig, Settings};
use hobomirror::error::Result;
use hobomirror::report::Reporter;
use hobomirror::sync::{DirectAccess, EngineOptions, Orchestrator};
use tracing_subscriber::EnvFilter;

fn main() {
    let args = CliArgs::parse();

    // Initialize logging; -v raises the floor, -q drops to errors only.
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<()> {
    if let Some(command) = &args.command {
        return handle_command(command, &args);
    }

    if args.tasks.is_empty() {
        eprintln!("Usage: hobomirror <SOURCE=TARGET>... [OPTIONS]");
        eprintln!("       hobomirror --help for more information");
        std::process::exit(1);
    }

    let config = MirrorConfig::from_cli(&args)?;
    let mut settings = Settings::load(&config.settings_file)?;

    // CLI-supplied ignore entries merge with the persisted ones.
    let mut options = EngineOptions {
        ignore_paths: config.ignore_paths.clone(),
        ignore_dir_names: config.ignore_dir_names.clone(),
        update_metadata: config.update_metadata,
        dry_run: config.dry_run,
        ..Default::default()
    };
    options.ignore_paths.extend(settings.ignore_paths.clone());
    options
        .ignore_dir_names
        .extend(settings.ignore_dir_names.clone());

    // ACLs are refreshed when the CLI allows it and the interval elapsed.
    let now = Utc::now();
    let refresh_due = settings.should_refresh_access_control(now);
    options.refresh_access_control = config.refresh_access_control && refresh_due;
    if config.refresh_access_control && !refresh_due {
        tracing::info!("skipping ACL refresh; interval has not elapsed");
    }

    let reporter =
        Reporter::new(config.log_dir.as_deref())?.with_progress(config.show_progress);

    // The volume snapshot subsystem is an external collaborator; this
    // build reads source roots directly.
    if config.use_snapshot {
        tracing::warn!("no volume snapshot provider in this build; reading live sources");
    }

    if !config.dry_run {
        hobomirror::fs::enable_backup_privileges()?;
    }

    let orchestrator = Orchestrator::new(&options, &reporter);
    let started = std::time::Instant::now();
    orchestrator.run_all(&config.tasks, &DirectAccess)?;

    if options.refresh_access_control && !config.dry_run && reporter.critical_count() == 0 {
        settings.last_refresh_access_control = Some(now);
        settings.save(&config.settings_file)?;
    }

    if !args.quiet {
        print_summary(&reporter, started.elapsed());
    }

    let code = reporter.exit_code();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn handle_command(command: &Commands, args: &CliArgs) -> Result<()> {
    match command {
        Commands::Settings => {
            let path = args
                .settings_file
                .clone()
                .unwrap_or_else(hobomirror::config::default_settings_path);
            let settings = Settings::load(&path)?;
            println!("Settings file: {:?}", path);
            println!(
                "ACL refresh interval:  {} days",
                settings.skip_refresh_access_control_days
            );
            match settings.last_refresh_access_control {
                Some(t) => println!("Last ACL refresh:      {}", t),
                None => println!("Last ACL refresh:      never"),
            }
            println!("Ignore paths:          {}", settings.ignore_paths.len());
            for path in &settings.ignore_paths {
                println!("  {}", path.display());
            }
            println!("Ignore dir names:      {}", settings.ignore_dir_names.len());
            for name in &settings.ignore_dir_names {
                println!("  {}", name);
            }
            Ok(())
        }
    }
}

fn print_summary(reporter: &Reporter, elapsed: std::time::Duration) {
    println!("\n=== Mirror Summary ===");
    println!("Changes:         {}", reporter.change_count());
    println!("Errors:          {}", reporter.error_count());
    println!("Critical errors: {}", reporter.critical_count());
    println!("Duration:        {:.2?}", elapsed);

    let changed = reporter.changed_dirs();
    if !changed.is_empty() {
        println!("\nDirectories with changes:");
        for dir in changed {
            println!("  {}", dir.display());
        }
    }
}

// Entry point: parses the CLI surface, initializes logging, and
// dispatches to the orchestrator (`launcher.rs`) or the profile store
// (`profile.rs`), mapping any propagated error onto the exit-code
// contract of spec.md §6 instead of panicking.

mod argv_split;
mod cli;
mod compiler;
mod config;
mod container;
mod elf;
mod error;
mod interp;
mod introspect;
mod launcher;
mod ld_conf;
mod library;
mod libraryset;
mod logger;
mod merge;
mod pathutils;
mod platform;
mod profile;
mod resolver;
mod search_path;
mod system_dirs;
mod version;
mod wi4mpi;

use cli::{Command, ProfileCommand, TopLevel};
use config::RunContext;
use error::{Error, Result};
use launcher::LaunchRequest;
use profile::{Profile, ProfileStore};

fn run() -> Result<i32> {
    let top: TopLevel = argh::from_env();
    logger::init(top.verbose, top.quiet)?;

    match top.command {
        Command::Launch(args) => {
            let ctx = RunContext::build(top.verbose, top.quiet, top.dry_run)?;
            let request = LaunchRequest {
                profile: args.profile,
                image: args.image,
                backend: args.backend,
                files: cli::split_comma_list(&args.files),
                libraries: cli::split_comma_list(&args.libraries),
                argv: args.cmd,
            };
            launcher::launch(&ctx, request, top.dry_run)
        }
        Command::Execute(args) => launcher::run_execute(&args.plan, &args.cmd),
        Command::Analyze(args) => launcher::run_analyze(&cli::split_comma_list(&args.libraries)),
        Command::Profile(args) => run_profile(args.command),
        Command::Init(_) => run_init(),
    }
}

fn run_profile(command: ProfileCommand) -> Result<i32> {
    let mut store = ProfileStore::open(ProfileStore::default_path())?;

    match command {
        ProfileCommand::Create(args) => {
            let profile = Profile {
                image: args.image,
                backend: args.backend,
                libraries: cli::split_comma_list(&args.libraries),
                files: cli::split_comma_list(&args.files),
                source: args.source,
            };
            store.upsert(&args.name, profile)?;
            println!("profile '{}' saved", args.name);
            Ok(0)
        }
        ProfileCommand::List(_) => {
            let selected = store.selected_name().map(str::to_string);
            for (name, _) in store.list() {
                let marker = if selected.as_deref() == Some(name.as_str()) { "*" } else { " " };
                println!("{marker} {name}");
            }
            Ok(0)
        }
        ProfileCommand::Show(args) => {
            let profile = store
                .get(&args.name)
                .ok_or_else(|| Error::Configuration(format!("profile '{}' does not exist", args.name)))?;
            let yaml = serde_yaml::to_string(profile)?;
            print!("{yaml}");
            Ok(0)
        }
        ProfileCommand::Delete(args) => {
            if store.delete(&args.name)? {
                println!("profile '{}' deleted", args.name);
                Ok(0)
            } else {
                Err(Error::Configuration(format!("profile '{}' does not exist", args.name)))
            }
        }
        ProfileCommand::Select(args) => {
            store.select(&args.name)?;
            println!("profile '{}' selected", args.name);
            Ok(0)
        }
    }
}

/// Writes a default, all-empty user configuration file if none exists
/// yet, per SPEC_FULL.md §3.2's `init` supplement.
fn run_init() -> Result<i32> {
    let path = config::SiteConfig::user_path();
    if path.exists() {
        println!("configuration already exists at {}", path.display());
        return Ok(0);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let default = config::SiteConfig::default();
    std::fs::write(&path, serde_yaml::to_string(&default)?)?;
    println!("wrote default configuration to {}", path.display());
    Ok(0)
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("e4s-cl: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

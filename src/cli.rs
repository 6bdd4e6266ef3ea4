// CLI surface (external collaborator, thin), per spec.md §6 and
// SPEC_FULL.md §3. Grounded in the teacher's `argh`-derived `Options`
// struct in `main.rs`; extended here to a subcommand enum the way argh
// expects multi-command programs to be modeled.

use argh::FromArgs;

#[derive(FromArgs)]
/// E4S Container Launcher: runs an MPI-parallel program inside a
/// container while importing the host's MPI and supporting libraries.
pub struct TopLevel {
    /// raise terminal verbosity to debug.
    #[argh(switch, short = 'v')]
    pub verbose: bool,

    /// lower terminal verbosity to error only.
    #[argh(switch, short = 'q')]
    pub quiet: bool,

    /// compute and print the exec plan as JSON without invoking a backend.
    #[argh(switch)]
    pub dry_run: bool,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
pub enum Command {
    Launch(LaunchArgs),
    Execute(ExecuteArgs),
    Analyze(AnalyzeArgs),
    Profile(ProfileArgs),
    Init(InitArgs),
}

#[derive(FromArgs)]
/// Launch a containerized job, importing the host's MPI stack.
#[argh(subcommand, name = "launch")]
pub struct LaunchArgs {
    /// name of the profile to use.
    #[argh(option)]
    pub profile: Option<String>,

    /// container image to use.
    #[argh(option)]
    pub image: Option<String>,

    /// container backend to use.
    #[argh(option)]
    pub backend: Option<String>,

    /// files to bind, comma-separated.
    #[argh(option)]
    pub files: Option<String>,

    /// libraries (sonames or paths) to bind, comma-separated.
    #[argh(option)]
    pub libraries: Option<String>,

    /// <launcher> [launcher-args] <program> [program-args].
    #[argh(positional, greedy)]
    pub cmd: Vec<String>,
}

#[derive(FromArgs)]
/// Internal: runs inside the container, setting env and exec-ing the
/// real program from a materialized plan.
#[argh(subcommand, name = "execute")]
pub struct ExecuteArgs {
    /// path to the serialized ExecPlan.
    #[argh(option)]
    pub plan: String,

    /// the real program and its arguments.
    #[argh(positional, greedy)]
    pub cmd: Vec<String>,
}

#[derive(FromArgs)]
/// Internal: guest-side introspection pass (C6).
#[argh(subcommand, name = "analyze")]
pub struct AnalyzeArgs {
    /// sonames to resolve and report on, comma-separated.
    #[argh(option)]
    pub libraries: Option<String>,
}

#[derive(FromArgs)]
/// Create, list, show, select, or delete profiles.
#[argh(subcommand, name = "profile")]
pub struct ProfileArgs {
    #[argh(subcommand)]
    pub command: ProfileCommand,
}

#[derive(FromArgs)]
#[argh(subcommand)]
pub enum ProfileCommand {
    Create(ProfileCreate),
    List(ProfileList),
    Show(ProfileShow),
    Delete(ProfileDelete),
    Select(ProfileSelect),
}

#[derive(FromArgs)]
/// Create or overwrite a profile.
#[argh(subcommand, name = "create")]
pub struct ProfileCreate {
    #[argh(positional)]
    pub name: String,
    /// container image to use.
    #[argh(option)]
    pub image: Option<String>,
    /// container backend to use.
    #[argh(option)]
    pub backend: Option<String>,
    /// files to bind, comma-separated.
    #[argh(option)]
    pub files: Option<String>,
    /// libraries to bind, comma-separated.
    #[argh(option)]
    pub libraries: Option<String>,
    /// launch script to source before exec, if any.
    #[argh(option)]
    pub source: Option<String>,
}

#[derive(FromArgs)]
/// List all known profiles.
#[argh(subcommand, name = "list")]
pub struct ProfileList {}

#[derive(FromArgs)]
/// Show a single profile's fields.
#[argh(subcommand, name = "show")]
pub struct ProfileShow {
    #[argh(positional)]
    pub name: String,
}

#[derive(FromArgs)]
/// Delete a profile.
#[argh(subcommand, name = "delete")]
pub struct ProfileDelete {
    #[argh(positional)]
    pub name: String,
}

#[derive(FromArgs)]
/// Select the default profile `launch` uses without `--profile`.
#[argh(subcommand, name = "select")]
pub struct ProfileSelect {
    #[argh(positional)]
    pub name: String,
}

#[derive(FromArgs)]
/// Write a default user configuration file if none exists.
#[argh(subcommand, name = "init")]
pub struct InitArgs {}

/// Splits a CLI-facing comma list option, treating an absent flag and an
/// empty string identically (no entries).
pub fn split_comma_list(value: &Option<String>) -> Vec<String> {
    match value {
        Some(s) if !s.is_empty() => s.split(',').map(|p| p.trim().to_string()).collect(),
        _ => Vec::new(),
    }
}

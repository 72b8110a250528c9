use std::path::PathBuf;

use anyhow::{Context as _, Result};
use bgav::branch::BranchClass;
use bgav::config::{BgavConfig, CONFIG_FILE_NAME};
use bgav::reconcile::MissingBranchPolicy;
use bgav::session::{ReconciliationSession, RunOptions, SessionReport};
use bgav::telemetry::{self, LogFormat};
use bgav_git::Credentials;
use clap::{Args, Parser, Subcommand};

/// Branch-gated artifact versioning
///
/// Keeps Maven project versions in step with the git branch: on a ticket
/// branch (feature/NCX-41-login) every module version carries the ticket id
/// (1.2.0-NCX-41-SNAPSHOT); on an integration branch (develop) ticket ids are
/// removed. Watched dependencies that have a branch for the same ticket in
/// their own repository are pointed at that branch's version.
///
/// Corrections are committed and pushed, so the next build runs on versions
/// that match the branch.
#[derive(Parser)]
#[command(name = "bgav")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'bgav <command> --help' for more information on a specific command.")]
struct Cli {
    /// Log output format (filter with BGAV_LOG, e.g. BGAV_LOG=debug)
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Human)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile versions with the current branch
    ///
    /// Reads bgav.toml from the project directory; flags override it.
    Run(RunArgs),

    /// Show how a branch name is classified
    ///
    /// Prints the branch class and, for ticket branches, the ticket id.
    Classify {
        /// Branch name to classify
        branch: String,

        /// Project directory whose bgav.toml supplies the patterns
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },
}

#[derive(Args)]
#[allow(clippy::struct_excessive_bools)]
struct RunArgs {
    /// Directory holding the root pom.xml
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Configuration file [default: <project-dir>/bgav.toml]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Branch name to use instead of asking git (for detached CI checkouts)
    #[arg(long, env = "BGAV_BRANCH")]
    branch: Option<String>,

    /// Watched dependency group-id prefix (repeatable; adds to bgav.toml)
    #[arg(long = "watch", value_name = "GROUP")]
    watched: Vec<String>,

    /// What to do when a watched dependency has no branch for the ticket
    #[arg(long, value_enum)]
    missing_branch: Option<MissingBranchPolicy>,

    /// Leave corrected files uncommitted
    #[arg(long)]
    suppress_commit: bool,

    /// Commit but do not push
    #[arg(long)]
    suppress_push: bool,

    /// Exit with failure after pushing a correction
    #[arg(long)]
    fail_on_mutation: bool,

    /// User for HTTP(S) clone and push
    #[arg(long, env = "BGAV_GIT_USER")]
    git_user: Option<String>,

    /// Password or token for HTTP(S) clone and push
    #[arg(long, env = "BGAV_GIT_PASSWORD", hide_env_values = true)]
    git_password: Option<String>,
}

impl RunArgs {
    fn load_config(&self) -> Result<BgavConfig> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(|| self.project_dir.join(CONFIG_FILE_NAME));
        let mut config = BgavConfig::load(&path)?;

        config.dependencies.watched.extend(self.watched.iter().cloned());
        if let Some(policy) = self.missing_branch {
            config.dependencies.missing_branch = policy;
        }
        config.git.suppress_commit |= self.suppress_commit;
        config.git.suppress_push |= self.suppress_push;
        config.git.fail_on_mutation |= self.fail_on_mutation;
        Ok(config)
    }

    fn options(&self) -> RunOptions {
        RunOptions {
            project_dir: self.project_dir.clone(),
            branch_override: self.branch.clone(),
            credentials: self
                .git_user
                .as_ref()
                .map(|user| Credentials::new(user, self.git_password.clone().unwrap_or_default())),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_format);

    match cli.command {
        Commands::Run(args) => run(&args),
        Commands::Classify {
            branch,
            project_dir,
        } => classify(&branch, &project_dir),
    }
}

fn run(args: &RunArgs) -> Result<()> {
    let config = args.load_config()?;
    let session = ReconciliationSession::new(config, args.options());
    let report = session
        .run()
        .with_context(|| format!("bgav failed in {}", args.project_dir.display()))?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &SessionReport) {
    let Some(branch) = &report.branch else {
        println!("not a git repository; nothing to do");
        return;
    };
    let class = report.class.map_or_else(String::new, |c| c.to_string());
    let ticket = report
        .policy
        .as_ref()
        .and_then(|p| p.ticket())
        .map_or_else(String::new, |t| format!(" {t}"));
    println!("{branch}: {class} branch{ticket}");

    let outcome = &report.outcome;
    if !outcome.needs_persistence {
        println!("  versions already match the branch");
        return;
    }
    for file in &outcome.touched_files {
        println!("  corrected {}", file.display());
    }
    match (&report.commit, report.pushed) {
        (Some(oid), true) => println!("  committed {oid} and pushed"),
        (Some(oid), false) => println!("  committed {oid} (not pushed)"),
        (None, _) => println!("  changes left uncommitted"),
    }
}

fn classify(branch: &str, project_dir: &std::path::Path) -> Result<()> {
    let config = BgavConfig::load(&project_dir.join(CONFIG_FILE_NAME))?;
    let class = config.classifier()?.classify(branch);
    match class {
        BranchClass::Ticket => {
            let ticket = config
                .ticket_pattern()?
                .extract(branch)
                .context("ticket branch name carries no ticket id")?;
            println!("{class} {ticket}");
        }
        BranchClass::Integration | BranchClass::Unknown => println!("{class}"),
    }
    Ok(())
}

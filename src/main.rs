use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use release_train::ci::JenkinsClient;
use release_train::config::{self, Config};
use release_train::cross_request::{self, GithubClient};
use release_train::domain::Version;
use release_train::gate::{AssumeYes, DecisionSource, ReviewGate};
use release_train::git::Git2VersionControl;
use release_train::release::ReleaseContext;
use release_train::{logging, ui, ReleaseError};

#[derive(Parser)]
#[command(
    name = "release-train",
    version,
    about = "Cut, tag and hotfix CommCare mobile releases across repositories and CI"
)]
struct Args {
    #[arg(short, long, global = true, help = "Custom configuration file path")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Accept every confirmation prompt")]
    yes: bool,

    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "More diagnostics (-v info, -vv debug)"
    )]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the next release's CI jobs and branches and bump the default branches
    Stage,
    /// Tag a staged release and trigger its release build
    Release {
        /// Release version, e.g. 2.44
        version: Version,
    },
    /// Open a hotfix branch for the staged release
    HotfixStart {
        #[arg(required = true)]
        repos: Vec<String>,
    },
    /// Tag the hotfix branch and point CI at the new tag
    HotfixFinish {
        #[arg(required = true)]
        repos: Vec<String>,
    },
    /// Delete the local release branches of a version
    CloseBranches { version: Version },
    /// Publish the aggregated translations file for a release
    Translations { version: Version },
    /// Clone a repository at the branch a pull request cross-requests
    CrossRequest {
        source_repo: String,
        pr_number: u64,
        target_repo: String,
    },
    /// Print the staged release and the next hotfix version
    ShowVersion,
}

fn main() {
    let args = Args::parse();
    logging::init(args.verbose);

    if let Err(e) = run(args) {
        match e.downcast_ref::<ReleaseError>() {
            // Declining at a prompt is not a failure.
            Some(ReleaseError::OperatorAbort(message)) => ui::display_manual_instruction(message),
            _ => {
                ui::display_error(&format!("{:#}", e));
                std::process::exit(1);
            }
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = config::load_config(args.config.as_deref())?;

    if let Command::CrossRequest {
        source_repo,
        pr_number,
        target_repo,
    } = &args.command
    {
        // Runs from any directory; no workspace configuration needed.
        let host = GithubClient::new(&config.github)?;
        let vcs = Git2VersionControl::new(config.git.remote.clone());
        let workdir = std::env::current_dir()?;
        cross_request::checkout_cross_request(
            &host,
            &vcs,
            &workdir,
            source_repo,
            *pr_number,
            target_repo,
            &config.git.default_branch,
        )?;
        return Ok(());
    }

    config.validate()?;
    let vcs = Git2VersionControl::new(config.git.remote.clone());
    let ci = JenkinsClient::from_config(&config.ci)?;
    let decisions: Box<dyn DecisionSource> = if args.yes {
        Box::new(AssumeYes)
    } else {
        Box::new(ui::ConsolePrompt::new())
    };
    let mut release = ReleaseContext::new(&config, &vcs, &ci, ReviewGate::new(decisions));
    run_release_command(&mut release, &config, args.command)
}

fn run_release_command(
    release: &mut ReleaseContext<'_>,
    config: &Config,
    command: Command,
) -> Result<()> {
    match command {
        Command::Stage => {
            release.stage()?;
        }
        Command::Release { version } => {
            release.release(&version)?;
        }
        Command::HotfixStart { repos } => {
            let version = release.hotfix_start(&repos)?;
            ui::display_manual_instruction(&format!(
                "Commit fixes to {} and run hotfix-finish when done",
                release.naming.branch_name(&version)
            ));
        }
        Command::HotfixFinish { repos } => {
            release.hotfix_finish(&repos)?;
        }
        Command::CloseBranches { version } => {
            release.close_branches(&version)?;
        }
        Command::Translations { version } => {
            let branch = release.update_translations(&version)?;
            ui::display_manual_instruction(&format!(
                "Open a pull request for {} in {}",
                branch, config.translations.repo
            ));
        }
        Command::ShowVersion => {
            release.show_version()?;
        }
        Command::CrossRequest { .. } => bail!("cross-request runs outside the release workspace"),
    }
    Ok(())
}

//! Story lifecycle automation.
//!
//! Watches a project's story documents and drives a coding agent through
//! draft, development, review and commit until no work is left.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::info;

use storyloop::exit_codes;
use storyloop::io::agent::CliAgent;
use storyloop::io::config::{Config, config_path, load_config, write_config};
use storyloop::io::git::Git;
use storyloop::io::webhook::WebhookNotifier;
use storyloop::logging;
use storyloop::report::{render_report, render_report_json};
use storyloop::workflow::Workflow;

const PROMPT: &str = "Enter project directory (or press Enter for current directory): ";

#[derive(Parser, Debug)]
#[command(
    name = "storyloop",
    version,
    about = "Drive BMad stories through draft, development, review and commit"
)]
struct Cli {
    /// Project directory. Prompted for when omitted.
    project_dir: Option<PathBuf>,

    /// Config file (defaults to `<PROJECT_DIR>/.storyloop/config.toml`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print every story with its open tasks and exit.
    #[arg(long)]
    report: bool,

    /// With `--report`, print JSON instead of text.
    #[arg(long, requires = "report")]
    json: bool,

    /// Write a config file with the default settings and exit.
    #[arg(long, conflicts_with = "report")]
    init_config: bool,
}

fn main() {
    logging::init();
    if let Err(err) = run(Cli::parse()) {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::INVALID);
    }
}

fn run(cli: Cli) -> Result<()> {
    let project_dir = match cli.project_dir {
        Some(dir) => dir,
        None => prompt_project_dir()?,
    };
    let project_dir = validate_project_dir(&project_dir)?;

    let config_file = cli.config.unwrap_or_else(|| config_path(&project_dir));
    if cli.init_config {
        return init_config(&config_file);
    }
    let config = load_config(&config_file)?;

    if cli.report {
        let stories_dir = config.stories_path(&project_dir);
        let out = if cli.json {
            render_report_json(&stories_dir)?
        } else {
            render_report(&stories_dir)?
        };
        print!("{out}");
        return Ok(());
    }

    let agent = CliAgent::new(&config.agent).context("locate agent executable")?;
    let git = Git::new(&project_dir);
    let notifier = WebhookNotifier::new(&config.notify)?;
    if !notifier.is_configured() {
        info!("webhook notifications disabled");
    }

    let workflow = Workflow::new(&project_dir, &config, &agent, &git, &notifier)?;
    info!(
        project = %workflow.project_dir().display(),
        agent = %agent.program().display(),
        "starting workflow"
    );
    let summary = workflow.run_continuous();
    info!(actions = summary.actions, errors = summary.errors, "workflow finished");
    Ok(())
}

fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(anyhow!("config already exists: {}", path.display()));
    }
    write_config(path, &Config::default())?;
    println!("wrote {}", path.display());
    Ok(())
}

fn prompt_project_dir() -> Result<PathBuf> {
    print!("{PROMPT}");
    io::stdout().flush().context("flush prompt")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read project directory")?;
    Ok(parse_prompt_answer(&line))
}

/// Empty answers select the current directory.
fn parse_prompt_answer(line: &str) -> PathBuf {
    match line.trim() {
        "" => PathBuf::from("."),
        dir => PathBuf::from(dir),
    }
}

fn validate_project_dir(dir: &Path) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(anyhow!(
            "project directory does not exist: {}",
            dir.display()
        ));
    }
    dir.canonicalize()
        .with_context(|| format!("resolve project directory {}", dir.display()))
}

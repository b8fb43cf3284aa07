//! minebuild CLI - checkpointed, resumable InterMine builds.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use minebuild::{
    BuildPlan, BuildState, CheckpointStore, DatabaseProfile, Mine, ProcessRunner, Project,
    ResumptionDecision, ResumptionEngine, plan_resumption,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "minebuild")]
#[command(version)]
#[command(about = "Build an InterMine mine, resuming from the last database checkpoint")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the project descriptor
    #[arg(short, long, global = true, default_value = "project.toml")]
    project: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the mine, resuming after the latest checkpoint if there is one
    Build {
        /// Path to the mine's properties file, e.g. ~/.intermine/biotestmine.properties
        mine_properties: PathBuf,

        /// Directory holding database checkpoints for sources with `dump = true`
        checkpoints: PathBuf,

        /// Don't actually build anything, just show the commands that would be executed
        #[arg(long)]
        dry_run: bool,
    },

    /// Show where a build would start without running anything
    Status {
        /// Checkpoint directory
        checkpoints: PathBuf,

        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate the project descriptor
    Validate,

    /// Show example project descriptor
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_project() {
    let example = r#"# minebuild project descriptor
# Sources are integrated in the order they appear.

[mine]
name = "biotestmine"
# gradle = "./gradlew"
# db_alias = "production"

[[sources]]
name = "uniprot"
type = "uniprot"
dump = true
[sources.params]
"src.data.dir" = "${DATA_DIR}/uniprot"

[[sources]]
name = "go"
type = "go"

[[sources]]
name = "entrez"
type = "entrez-organism"
dump = true
"#;
    println!("{example}");
}

fn check_path_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("{} does not exist", path.display());
    }
    Ok(())
}

fn load_plan(path: &Path) -> Result<(Project, BuildPlan)> {
    let project = Project::from_file(path)
        .with_context(|| format!("Failed to load project descriptor from {path:?}"))?;
    let plan = BuildPlan::from_project(&project).context("Invalid build plan")?;

    for step in plan.all_steps() {
        debug!(source = %step.name, dump = step.dump, "Found source in project descriptor");
    }
    Ok((project, plan))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => {
            print_example_project();
        }

        Commands::Validate => {
            let (project, plan) = load_plan(&cli.project)?;
            if plan.is_empty() {
                warn!("Project descriptor lists no sources");
            }

            info!("Project descriptor is valid");
            info!("  Mine: {}", project.mine.name);
            info!(
                "  Sources: {} ({} with checkpoints)",
                plan.len(),
                plan.all_steps().iter().filter(|s| s.dump).count()
            );
        }

        Commands::Status { checkpoints, json } => {
            let (_, plan) = load_plan(&cli.project)?;
            let store = CheckpointStore::open(&checkpoints)?;
            let resumption = plan_resumption(&store, &plan)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&resumption)?);
                return Ok(());
            }

            match &resumption.decision {
                ResumptionDecision::Fresh => println!("No checkpoint found: build starts fresh"),
                ResumptionDecision::ResumeAfter { step, checkpoint } => {
                    println!("Resume after:  {step}");
                    println!("Checkpoint:    {}", checkpoint.path.display());
                }
            }
            println!("Next ordinal:  {}", resumption.next_ordinal);
            println!("Remaining:     {}", resumption.remaining.len());
            for step in &resumption.remaining {
                let marker = if step.dump { " [dump]" } else { "" };
                println!(
                    "  {:>3}. {} ({}){marker}",
                    step.position, step.name, step.source_type
                );
            }
        }

        Commands::Build {
            mine_properties,
            checkpoints,
            dry_run,
        } => {
            check_path_exists(&mine_properties)?;
            check_path_exists(&checkpoints)?;
            check_path_exists(&cli.project)?;

            let (project, plan) = load_plan(&cli.project)?;
            let db = DatabaseProfile::from_properties_file(&mine_properties, &project.mine.db_alias)
                .context("Failed to read database settings")?;
            let store = CheckpointStore::open(&checkpoints)?;
            let mine = Mine::new(ProcessRunner::new(dry_run), db, &project.mine);

            let engine = ResumptionEngine::new(plan, store, mine)
                .with_progress(std::io::stderr().is_terminal());
            let report = engine.run();

            println!("\n=== Mine Build{} ===", if dry_run { " (dry run)" } else { "" });
            if let Some(decision) = &report.decision {
                println!("Decision:     {decision}");
            }
            println!("Integrated:   {}", report.integrated.join(", "));
            println!("Checkpoints:  {}", report.checkpoints.len());
            for checkpoint in &report.checkpoints {
                println!("  {}", checkpoint.identifier());
            }
            println!("Runtime:      {:.1}s", report.runtime_secs);

            if let BuildState::Failed(failure) = report.state {
                bail!("{failure}");
            }
            println!("\nFinished. {}", project.mine.post_build_hint);
        }
    }

    Ok(())
}

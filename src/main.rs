use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use flowde_core::config::AppConfig;
use flowde_core::traits::{BreakdownRequest, BreakdownSource};
use flowde_core::types::{
    ActorId, AssignmentId, ChainAnchor, InsertionMode, Placement, Position, StepId,
};
use flowde_graph::{Outline, WorkflowEngine};
use flowde_store::SqliteGraphStore;

#[derive(Parser)]
#[command(name = "flowde", version, about = "Assignment flowcharts that stay consistent")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "flowde.toml")]
    config: PathBuf,

    /// Actor performing the operation
    #[arg(short, long, env = "FLOWDE_USER", default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and create the database
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Show current configuration
    Config,
    /// Create an assignment from a JSON outline file
    Create {
        /// Outline file ({"title", "description", "due_date", "steps": [...]})
        outline: PathBuf,
    },
    /// List your assignments
    List,
    /// Print an assignment with all steps and connections
    Show { assignment: i64 },
    /// Delete an assignment with everything in it
    DeleteAssignment { assignment: i64 },
    /// Insert one step
    Insert {
        assignment: i64,
        /// Step content
        content: String,
        /// new_main_step, insert_after, insert_as_child or unanchored
        #[arg(long, default_value = "insert_after")]
        mode: String,
        /// Reference step (required unless unanchored)
        #[arg(long)]
        reference: Option<i64>,
        /// Explicit position for unanchored steps
        #[arg(long, requires = "y")]
        x: Option<f64>,
        #[arg(long, requires = "x")]
        y: Option<f64>,
    },
    /// Delete one step, promoting or bridging around it
    Delete { step: i64 },
    /// Insert a chain of steps after a reference step
    Chain {
        assignment: i64,
        #[arg(long)]
        reference: i64,
        /// children, siblings or main_sequence (default depends on the reference)
        #[arg(long)]
        anchor: Option<String>,
        /// Step contents in order
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Break a step down using a saved model reply
    DeepDive {
        step: i64,
        /// File holding the model reply ({"new_steps": [{"content": ...}]})
        #[arg(long)]
        reply: PathBuf,
        /// Question that guided the breakdown
        #[arg(long, default_value = "")]
        question: String,
    },
    /// Connect two steps
    Connect { assignment: i64, from: i64, to: i64 },
    /// Move a step
    Move { step: i64, x: f64, y: f64 },
    /// Change a step's content
    Edit { step: i64, content: String },
    /// Mark a step (or with --assignment, an assignment) completed
    Complete {
        id: i64,
        #[arg(long)]
        assignment: bool,
        /// Mark as not completed instead
        #[arg(long)]
        undo: bool,
    },
    /// Check an assignment's graph for structural problems
    Check { assignment: i64 },
}

/// Breakdown source that replays a reply saved to disk.
struct ReplyFile {
    path: PathBuf,
}

impl BreakdownSource for ReplyFile {
    fn breakdown(&self, request: BreakdownRequest) -> BoxFuture<'_, flowde_core::Result<String>> {
        Box::pin(async move {
            info!(
                step = %request.step_content,
                path = %self.path.display(),
                "Reading breakdown reply"
            );
            Ok(tokio::fs::read_to_string(&self.path).await?)
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("flowde=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Commands::Init { force } = cli.command {
        return init(&cli.config, force);
    }

    let config = load_config(&cli.config)?;
    if let Commands::Config = cli.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let store = Arc::new(SqliteGraphStore::open(&config.database_path())?);
    let engine = WorkflowEngine::new(store, &config);
    let actor = ActorId::new(cli.user);

    match cli.command {
        Commands::Init { .. } | Commands::Config => {}
        Commands::Create { outline } => {
            let text = std::fs::read_to_string(&outline)?;
            let outline = Outline::parse(&text)?;
            print_json(&engine.create_assignment(&actor, &outline).await?)?;
        }
        Commands::List => {
            print_json(&engine.list_assignments(&actor).await?)?;
        }
        Commands::Show { assignment } => {
            print_json(&engine.assignment_graph(&actor, AssignmentId(assignment)).await?)?;
        }
        Commands::DeleteAssignment { assignment } => {
            engine.delete_assignment(&actor, AssignmentId(assignment)).await?;
        }
        Commands::Insert {
            assignment,
            content,
            mode,
            reference,
            x,
            y,
        } => {
            let mode: InsertionMode = mode.parse()?;
            let position = x.zip(y).map(|(x, y)| Position::new(x, y));
            let placement = Placement::new(mode, reference.map(StepId), position)?;
            let step = engine
                .insert(&actor, AssignmentId(assignment), &content, placement)
                .await?;
            print_json(&step)?;
        }
        Commands::Delete { step } => {
            print_json(&engine.delete(&actor, StepId(step)).await?)?;
        }
        Commands::Chain {
            assignment,
            reference,
            anchor,
            items,
        } => {
            let anchor = anchor.map(|a| a.parse::<ChainAnchor>()).transpose()?;
            let steps = engine
                .insert_chain(&actor, AssignmentId(assignment), StepId(reference), anchor, &items)
                .await?;
            print_json(&steps)?;
        }
        Commands::DeepDive {
            step,
            reply,
            question,
        } => {
            let source = ReplyFile { path: reply };
            let steps = engine
                .deep_dive(&actor, StepId(step), &question, &source)
                .await?;
            print_json(&steps)?;
        }
        Commands::Connect {
            assignment,
            from,
            to,
        } => {
            let conn = engine
                .connect(&actor, AssignmentId(assignment), StepId(from), StepId(to))
                .await?;
            print_json(&conn)?;
        }
        Commands::Move { step, x, y } => {
            print_json(&engine.move_step(&actor, StepId(step), Position::new(x, y)).await?)?;
        }
        Commands::Edit { step, content } => {
            print_json(&engine.edit_step(&actor, StepId(step), &content).await?)?;
        }
        Commands::Complete {
            id,
            assignment,
            undo,
        } => {
            if assignment {
                let record = engine
                    .set_assignment_completed(&actor, AssignmentId(id), !undo)
                    .await?;
                print_json(&record)?;
            } else {
                print_json(&engine.set_step_completed(&actor, StepId(id), !undo).await?)?;
            }
        }
        Commands::Check { assignment } => {
            let violations = engine.check(&actor, AssignmentId(assignment)).await?;
            if violations.is_empty() {
                println!("ok");
            } else {
                for violation in &violations {
                    println!("{}", violation);
                }
                anyhow::bail!("{} invariant violation(s)", violations.len());
            }
        }
    }

    Ok(())
}

fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let config = AppConfig::default();
    std::fs::write(path, toml::to_string_pretty(&config)?)?;
    let db_path = config.database_path();
    SqliteGraphStore::open(&db_path)?;
    println!("Wrote {}", path.display());
    println!("Database at {}", db_path.display());
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }

    // Check for config in the home directory
    if let Some(home_config) = dirs_home().map(|h| h.join(".flowde").join("config.toml")) {
        if home_config.exists() {
            info!(path = %home_config.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home_config)?);
        }
    }

    warn!(path = %path.display(), "No config file found, using defaults");
    Ok(AppConfig::default())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

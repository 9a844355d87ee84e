//! nudge: command-line front end for the orchestrator.
//!
//! Runs a single shrink or encouragement request against the providers in
//! the config file. Handy for trying prompts and checking a config.

use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use nudge::{
    AssistRequest, AssistResponse, EncouragementContext, EncouragementRequest, EnergyLevel, Mood,
    Orchestrator, OrchestratorConfig, ShrinkRequest,
};

/// Nudge CLI
#[derive(Parser)]
#[command(name = "nudge")]
#[command(version)]
#[command(about = "AI helpers for getting things done")]
struct Args {
    /// Path to configuration file (default: ~/.nudge/config.toml).
    #[arg(short, long, env = "NUDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Print output as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Break a task into small steps
    Shrink {
        /// Task title (or omit to read from stdin)
        task: Option<String>,
        /// Extra context for the task
        #[arg(long)]
        context: Option<String>,
        /// Minutes available right now
        #[arg(long)]
        minutes: Option<u32>,
        #[arg(long)]
        mood: Option<Mood>,
        #[arg(long)]
        energy: Option<EnergyLevel>,
        /// Times this task has already been abandoned
        #[arg(long, default_value_t = 0)]
        failed_attempts: u32,
        /// Print text as it arrives
        #[arg(long)]
        stream: bool,
    },

    /// Get an encouraging message
    Encourage {
        /// What just happened (e.g. task-completed, struggling)
        context: EncouragementContext,
        #[arg(long)]
        mood: Option<Mood>,
        #[arg(long)]
        task: Option<String>,
        #[arg(long)]
        streak_days: Option<u32>,
    },

    /// Check which providers are reachable
    Check,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = OrchestratorConfig::load(args.config.as_deref())?;
    let orchestrator = Orchestrator::from_config(&config)?;

    let (request, stream): (AssistRequest, bool) = match args.command {
        Command::Check => {
            for name in orchestrator.providers().order() {
                let up = match orchestrator.providers().get(name) {
                    Some(provider) => provider.is_available().await,
                    None => false,
                };
                println!("{name}: {}", if up { "available" } else { "unavailable" });
            }
            return Ok(());
        }

        Command::Shrink {
            task,
            context,
            minutes,
            mood,
            energy,
            failed_attempts,
            stream,
        } => {
            let mut request = ShrinkRequest::new(resolve_text(task, "shrink")?)
                .failed_attempts(failed_attempts);
            request.context = context;
            request.available_minutes = minutes;
            request.mood = mood;
            request.energy = energy;
            (request.into(), stream && !args.json)
        }

        Command::Encourage {
            context,
            mood,
            task,
            streak_days,
        } => {
            let mut request = EncouragementRequest::new(context);
            request.mood = mood;
            request.task_title = task;
            request.streak_days = streak_days;
            (request.into(), false)
        }
    };

    let response = if stream {
        let (tx, mut rx) = mpsc::channel::<String>(64);
        let printer = tokio::spawn(async move {
            let mut stderr = io::stderr();
            while let Some(chunk) = rx.recv().await {
                let _ = write!(stderr, "{chunk}");
                let _ = stderr.flush();
            }
            let _ = writeln!(stderr);
        });
        let response = orchestrator.request_streamed(request, tx).await;
        printer.await?;
        response?
    } else {
        orchestrator.request(request).await?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }

    Ok(())
}

/// Resolve text input from an optional CLI argument and/or stdin.
///
/// - arg only → arg
/// - stdin only → stdin
/// - both → `"{arg}\n\n{stdin}"`
/// - neither → error
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let stdin_is_pipe = !io::stdin().is_terminal();
    let stdin_text = if stdin_is_pipe {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    } else {
        None
    };

    match (arg, stdin_text) {
        (Some(a), Some(s)) => Ok(format!("{a}\n\n{s}")),
        (Some(a), None) => Ok(a),
        (None, Some(s)) => Ok(s),
        (None, None) => {
            Err(format!("{command}: no input provided (pass text as argument or via stdin)").into())
        }
    }
}

fn print_response(response: &AssistResponse) {
    match response {
        AssistResponse::Shrink(result) => {
            println!("{}", result.original_task);
            for (i, step) in result.steps.iter().enumerate() {
                println!(
                    "  {}. {} ({} min, {:?})",
                    i + 1,
                    step.action,
                    step.estimated_minutes,
                    step.difficulty
                );
            }
            println!("total: {} min", result.total_minutes());
            if let Some(reasoning) = &result.reasoning {
                println!("\n{reasoning}");
            }
            if let Some(encouragement) = &result.encouragement {
                println!("\n{encouragement}");
            }
        }
        AssistResponse::Encouragement(message) => match &message.emoji {
            Some(emoji) => println!("{emoji} {}", message.message),
            None => println!("{}", message.message),
        },
    }
}

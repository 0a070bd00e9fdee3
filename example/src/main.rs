use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use futures_util::StreamExt;
use ollama_manager::core::gigabytes;
use ollama_manager::{
    ChatEngine, ConnectionConfig, OllamaClient, OllamaOptions, OperationController, SessionConfig,
    SortKey,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ollama-manager")]
#[command(about = "Manage and chat with local Ollama models", long_about = None)]
struct Cli {
    /// Ollama host URL (defaults to OLLAMA_HOST or http://localhost:11434)
    #[arg(long, global = true)]
    host: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Sort {
    Name,
    Size,
    Params,
    Family,
    Modified,
}

impl From<Sort> for SortKey {
    fn from(sort: Sort) -> Self {
        match sort {
            Sort::Name => SortKey::Name,
            Sort::Size => SortKey::Size,
            Sort::Params => SortKey::Parameters,
            Sort::Family => SortKey::Family,
            Sort::Modified => SortKey::Modified,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List installed models
    List {
        /// Filter by name, family or parameter size
        #[arg(short, long, default_value = "")]
        search: String,

        #[arg(long, value_enum, default_value = "name")]
        sort: Sort,

        #[arg(long)]
        descending: bool,
    },

    /// Show model metadata
    Show { model: String },

    /// Download a new model
    Pull { model: String },

    /// Re-pull an installed model
    Update { model: String },

    /// Delete an installed model
    Delete { model: String },

    /// Interactive chat
    Chat {
        #[arg(short, long)]
        model: Option<String>,

        #[arg(long, default_value = "0.7")]
        temperature: f32,

        #[arg(long, default_value = "0.9")]
        top_p: f32,

        #[arg(long, default_value = "40")]
        top_k: i32,

        #[arg(long, default_value = "5.0")]
        mirostat_tau: f32,

        #[arg(long, default_value = "4096")]
        num_ctx: i32,

        #[arg(long)]
        system: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.host {
        Some(host) => ConnectionConfig::new(host)?,
        None => ConnectionConfig::from_env()?,
    };
    let client = Arc::new(OllamaClient::new(config));
    let controller = OperationController::new(client.clone());

    match cli.command {
        Commands::List {
            search,
            sort,
            descending,
        } => cmd_list(&controller, &search, sort.into(), !descending).await?,
        Commands::Show { model } => {
            let detail = controller.inspect(&model).await?;
            println!("{}", serde_json::to_string_pretty(&detail.metadata)?);
        }
        Commands::Pull { model } => cmd_pull(&controller, &model, false).await?,
        Commands::Update { model } => cmd_pull(&controller, &model, true).await?,
        Commands::Delete { model } => {
            controller.delete_existing(&model).await?;
            println!("Deleted {}", model);
        }
        Commands::Chat {
            model,
            temperature,
            top_p,
            top_k,
            mirostat_tau,
            num_ctx,
            system,
        } => {
            let mut config = SessionConfig {
                model,
                options: OllamaOptions {
                    temperature: Some(temperature),
                    top_p: Some(top_p),
                    top_k: Some(top_k),
                    mirostat_tau: Some(mirostat_tau),
                    num_ctx: Some(num_ctx),
                    ..Default::default()
                },
                ..SessionConfig::default()
            };
            if let Some(system) = system {
                config.system_prompt = system;
            }
            cmd_chat(ChatEngine::new(client, config)).await?;
        }
    }

    Ok(())
}

async fn cmd_list(
    controller: &OperationController,
    search: &str,
    sort: SortKey,
    ascending: bool,
) -> Result<()> {
    let registry = controller.refresh_registry().await?;

    println!("Installed models: {}", registry.len());
    println!("Total disk space: {:.2} GB", gigabytes(registry.total_size()));
    if let Some(largest) = registry.largest() {
        println!("Largest model:    {} ({:.2} GB)", largest.id, gigabytes(largest.size));
    }
    println!();

    let mut models = registry.filter(search);
    ollama_manager::core::sort_models(&mut models, sort, ascending);
    for model in models {
        println!(
            "{:<40} {:>8.2} GB  {:<8} {}",
            model.id,
            gigabytes(model.size),
            model.parameter_size,
            model.family
        );
    }
    Ok(())
}

async fn cmd_pull(controller: &OperationController, model: &str, update: bool) -> Result<()> {
    let mut progress = if update {
        controller.update_existing(model).await?
    } else {
        controller.pull_new(model).await?
    };

    while let Some(event) = progress.next().await {
        if let Some(error) = event.error {
            println!();
            return Err(error.into());
        }
        match event.fraction {
            Some(fraction) => print!(
                "\r{:<24} {:>5.1}%  {}/{} bytes",
                event.status,
                fraction * 100.0,
                event.bytes_completed,
                event.bytes_total.unwrap_or_default()
            ),
            None => print!("\r{:<60}", event.status),
        }
        io::stdout().flush()?;
    }

    println!("\nSuccessfully {} {}", if update { "updated" } else { "pulled" }, model);
    Ok(())
}

async fn cmd_chat(engine: ChatEngine) -> Result<()> {
    for message in engine.messages() {
        println!("assistant: {}", message.content);
    }
    println!("Type your messages (/clear to reset, quit to exit):");

    loop {
        print!("\nYou: ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input == "quit" || input == "exit" {
            break;
        }
        if input.is_empty() {
            continue;
        }
        if input == "/clear" {
            engine.clear_history()?;
            println!("History cleared.");
            continue;
        }

        print!("assistant: ");
        io::stdout().flush()?;
        let mut reply = engine.send(input).await?;
        while let Some(fragment) = reply.next().await {
            print!("{}", fragment?);
            io::stdout().flush()?;
        }
        println!();
    }

    Ok(())
}

//! Trabien CLI - headless client for the Trabien task service
//!
//! This binary drives the client core without the desktop shell:
//! - Sign in via the browser-based OAuth handshake
//! - List, create, complete and delete workspace tasks
//! - List and create teams
//!
//! Sessions persist across invocations (keyring with file fallback), and
//! expired access tokens are refreshed transparently on the first 401.

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use trabien_core::api::tasks::{CreateTaskPayload, TaskStatus, UpdateTaskPayload};
use trabien_core::api::ApiClient;
use trabien_core::auth::{self, CredentialStore, LoginUrlEvent, SessionRefresher};
use trabien_core::config;

#[derive(Parser)]
#[command(name = "trabien")]
#[command(author = "Trabien Team")]
#[command(version)]
#[command(about = "Headless client for the Trabien task service")]
#[command(long_about = "
Trabien CLI is a headless client for the Trabien workspace task service.
It shares its session storage and API plumbing with the desktop app.

Quick start:
  1. Sign in:           trabien login
  2. List tasks:        trabien tasks list --workspace 1
  3. Create a task:     trabien tasks add --workspace 1 --start ... --end ... \"Title\"
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in via the browser-based OAuth flow
    #[command(alias = "signin")]
    Login,

    /// Sign out and delete the stored session
    #[command(alias = "signout")]
    Logout,

    /// Show session status
    Status,

    /// Show configuration paths and settings
    Config,

    /// Manage workspace tasks
    Tasks {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Manage teams
    Teams {
        #[command(subcommand)]
        command: TeamCommands,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// List tasks in a workspace
    List {
        /// Workspace to list
        #[arg(short, long)]
        workspace: i64,
    },

    /// Create a task
    Add {
        /// Task title
        title: String,

        /// Workspace to create the task in
        #[arg(short, long)]
        workspace: i64,

        /// Start time (RFC 3339, e.g. 2026-03-02T09:00:00Z)
        #[arg(long)]
        start: DateTime<Utc>,

        /// End time (RFC 3339)
        #[arg(long)]
        end: DateTime<Utc>,

        /// Task color
        #[arg(long, default_value = "#3b82f6")]
        color: String,

        /// Task description
        #[arg(long)]
        content: Option<String>,
    },

    /// Mark a task as done
    Done {
        /// Task to complete
        task_id: i64,
    },

    /// Delete a task
    Rm {
        /// Task to delete
        task_id: i64,
    },
}

#[derive(Subcommand)]
pub enum TeamCommands {
    /// List the teams you belong to
    List,

    /// Create a team
    Create {
        /// Team name
        name: String,

        /// Team description
        #[arg(short, long)]
        description: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("trabien={},trabien_core={}", log_level, log_level).into()
            }),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Login => cmd_login(&cli).await,
        Commands::Logout => cmd_logout(&cli).await,
        Commands::Status => cmd_status(&cli).await,
        Commands::Config => cmd_config(&cli).await,
        Commands::Tasks { ref command } => cmd_tasks(&cli, command).await,
        Commands::Teams { ref command } => cmd_teams(&cli, command).await,
    }
}

/// Build the shared client, restoring a persisted session when present.
async fn build_client() -> Result<(ApiClient, Arc<CredentialStore>)> {
    let endpoint = config::load_api_config();
    let store = Arc::new(CredentialStore::new());

    if let Some(session) = auth::load_session().await? {
        store.set_tokens(session.token_pair());
        SessionRefresher::register(&store, endpoint.base_url.clone());
    }

    Ok((ApiClient::new(endpoint.base_url, Arc::clone(&store)), store))
}

fn ensure_signed_in(store: &CredentialStore) -> Result<()> {
    if store.access_token().is_none() {
        bail!("Not signed in. Run 'trabien login' first.");
    }
    Ok(())
}

async fn cmd_login(cli: &Cli) -> Result<()> {
    // Check if already signed in
    if let Ok(Some(session)) = auth::load_session().await {
        match cli.format {
            OutputFormat::Text => {
                println!("Already signed in as '{}'", session.member.nickname);
                println!("Use 'trabien logout' to sign out first.");
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "already_signed_in",
                        "nickname": session.member.nickname,
                        "provider": session.member.provider,
                    })
                );
            }
        }
        return Ok(());
    }

    let (client, store) = build_client().await?;

    match cli.format {
        OutputFormat::Text => println!("Starting authentication..."),
        OutputFormat::Json => {}
    }

    let on_url: Box<dyn Fn(LoginUrlEvent) + Send + Sync> = match cli.format {
        OutputFormat::Text => Box::new(|event: LoginUrlEvent| {
            println!();
            println!(
                "Please visit the following URL to authorize:\n\n{}\n",
                event.auth_url
            );
        }),
        OutputFormat::Json => Box::new(|event: LoginUrlEvent| {
            println!(
                "{}",
                serde_json::json!({
                    "status": "awaiting_authorization",
                    "authUrl": event.auth_url,
                })
            );
        }),
    };

    let member = auth::sign_in(&client, &store, Some(on_url)).await?;

    match cli.format {
        OutputFormat::Text => {
            println!();
            println!("Signed in as '{}' via {}", member.nickname, member.provider);
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "status": "signed_in",
                    "memberId": member.member_id,
                    "nickname": member.nickname,
                    "provider": member.provider,
                })
            );
        }
    }

    Ok(())
}

async fn cmd_logout(cli: &Cli) -> Result<()> {
    let session = auth::load_session().await?;

    if session.is_none() {
        match cli.format {
            OutputFormat::Text => println!("Not signed in."),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"status": "not_signed_in"}));
            }
        }
        return Ok(());
    }

    let store = Arc::new(CredentialStore::new());
    auth::logout(&store).await?;

    match cli.format {
        OutputFormat::Text => println!("Signed out."),
        OutputFormat::Json => {
            println!("{}", serde_json::json!({"status": "signed_out"}));
        }
    }

    Ok(())
}

async fn cmd_status(cli: &Cli) -> Result<()> {
    let session = auth::load_session().await?;

    match cli.format {
        OutputFormat::Text => {
            if let Some(session) = session {
                println!("Status:   Signed in");
                println!("Member:   {}", session.member.nickname);
                if let Some(email) = &session.member.email {
                    println!("Email:    {}", email);
                }
                println!("Provider: {}", session.member.provider);
                println!();
                println!("Storage:  {}", auth::get_session_storage_info());
            } else {
                println!("Status: Not signed in");
                println!();
                println!("Run 'trabien login' to authenticate.");
            }
        }
        OutputFormat::Json => match session {
            Some(session) => println!(
                "{}",
                serde_json::json!({
                    "signed_in": true,
                    "memberId": session.member.member_id,
                    "nickname": session.member.nickname,
                    "email": session.member.email,
                    "provider": session.member.provider,
                    "storage_info": auth::get_session_storage_info(),
                })
            ),
            None => println!(
                "{}",
                serde_json::json!({
                    "signed_in": false,
                    "storage_info": auth::get_session_storage_info(),
                })
            ),
        },
    }

    Ok(())
}

async fn cmd_config(cli: &Cli) -> Result<()> {
    let endpoint = config::load_api_config();
    let config_path = config::get_config_file_path_string();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file:   {}", config_path);
            println!("API endpoint:  {} (from {})", endpoint.base_url, endpoint.source);
            println!("Session store: {}", auth::get_session_storage_info());
            println!();
            println!("Environment variables:");
            println!("  TRABIEN_API_URL - Override API endpoint");
            println!();
            println!("Example config.toml:");
            println!();
            println!("{}", config::generate_example_config());
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "config_file": config_path,
                    "api_url": endpoint.base_url,
                    "api_source": format!("{}", endpoint.source),
                    "session_storage": auth::get_session_storage_info(),
                })
            );
        }
    }

    Ok(())
}

fn status_label(status: Option<TaskStatus>) -> &'static str {
    match status {
        Some(TaskStatus::Todo) | None => "todo",
        Some(TaskStatus::InProgress) => "in_progress",
        Some(TaskStatus::Done) => "done",
    }
}

async fn cmd_tasks(cli: &Cli, command: &TaskCommands) -> Result<()> {
    let (client, store) = build_client().await?;
    ensure_signed_in(&store)?;

    match command {
        TaskCommands::List { workspace } => {
            let response = client.tasks(*workspace).await?;

            match cli.format {
                OutputFormat::Text => {
                    if response.tasks.is_empty() {
                        println!("No tasks in workspace {}.", workspace);
                        return Ok(());
                    }
                    println!("{} tasks:", response.tasks.len());
                    println!();
                    for task in &response.tasks {
                        println!(
                            "  {:>6}  {:12}  {}  {}",
                            task.id,
                            status_label(task.status),
                            task.start_time.format("%Y-%m-%d %H:%M"),
                            task.title
                        );
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({"tasks": response.tasks}));
                }
            }
        }
        TaskCommands::Add {
            title,
            workspace,
            start,
            end,
            color,
            content,
        } => {
            let payload = CreateTaskPayload {
                title: title.clone(),
                start_time: *start,
                end_time: *end,
                content: content.clone(),
                color: color.clone(),
                tag_ids: vec![],
                file_ids: None,
                status: None,
                workspace_id: *workspace,
            };
            let response = client.create_task(&payload).await?;

            match cli.format {
                OutputFormat::Text => println!("Created task {}", response.task_id),
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({"success": response.success, "taskId": response.task_id})
                ),
            }
        }
        TaskCommands::Done { task_id } => {
            let mut payload = UpdateTaskPayload::new(*task_id);
            payload.status = Some(TaskStatus::Done);
            let response = client.update_task(&payload).await?;

            match cli.format {
                OutputFormat::Text => println!("Task {} marked as done", task_id),
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({"success": response.success, "taskId": task_id})
                ),
            }
        }
        TaskCommands::Rm { task_id } => {
            let response = client.delete_task(*task_id).await?;

            match cli.format {
                OutputFormat::Text => println!("Task {} deleted", task_id),
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({"success": response.success, "taskId": task_id})
                ),
            }
        }
    }

    Ok(())
}

async fn cmd_teams(cli: &Cli, command: &TeamCommands) -> Result<()> {
    let (client, store) = build_client().await?;
    ensure_signed_in(&store)?;

    match command {
        TeamCommands::List => {
            let response = client.my_teams().await?;

            match cli.format {
                OutputFormat::Text => {
                    if response.teams.is_empty() {
                        println!("You are not a member of any team.");
                        return Ok(());
                    }
                    println!("{} teams:", response.teams.len());
                    println!();
                    for team in &response.teams {
                        let description = team.description.as_deref().unwrap_or("-");
                        println!("  {:>6}  {:20}  {}", team.id, team.name, description);
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({"teams": response.teams}));
                }
            }
        }
        TeamCommands::Create { name, description } => {
            let response = client.create_team(name, description.as_deref()).await?;

            match cli.format {
                OutputFormat::Text => {
                    println!("{} (team {})", response.message, response.team_id);
                }
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({
                        "success": response.success,
                        "teamId": response.team_id,
                        "message": response.message,
                    })
                ),
            }
        }
    }

    Ok(())
}

//! intake CLI - requirements gathering and sign-off workflow

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use intake_core::Config;
use intake_core::models::{
    ApplicationCategory, ApplicationPatch, ConversationStatus, NewApplication,
};
use intake_runtime::{Dispatcher, WorkflowContext, actions};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod pretty;

#[derive(Debug, Parser)]
#[command(
    name = "intake",
    author,
    version,
    about = "Requirements gathering with sign-off driven document generation",
    propagate_version = true
)]
struct Cli {
    /// Config file path
    #[arg(long, global = true, env = "INTAKE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print JSON instead of formatted output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write the default config and create the database
    Init,

    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommand,
    },

    /// Manage applications
    App {
        #[command(subcommand)]
        command: AppCommand,
    },

    /// Work with requirement conversations
    Conv {
        #[command(subcommand)]
        command: ConvCommand,
    },

    /// Browse generated documents
    Doc {
        #[command(subcommand)]
        command: DocCommand,
    },

    /// Show notifications for a user
    Notifications {
        /// User ID
        user: Uuid,
    },
}

#[derive(Debug, Subcommand)]
enum UserCommand {
    /// Add a user
    Add {
        username: String,
        email: String,

        /// Receive admin notifications
        #[arg(long)]
        admin: bool,
    },

    /// List users
    List,
}

#[derive(Debug, Subcommand)]
enum AppCommand {
    /// Register an application
    Create {
        name: String,

        /// internal, external or proposed
        #[arg(long, default_value = "internal")]
        category: ApplicationCategory,

        #[arg(long)]
        description: Option<String>,

        /// Repository URI (file:///path for local checkouts)
        #[arg(long)]
        repo: Option<String>,

        #[arg(long)]
        url: Option<String>,

        /// Keep the overview in sync with the repository
        #[arg(long)]
        automated: bool,
    },

    /// List applications
    List {
        #[arg(long)]
        category: Option<ApplicationCategory>,
    },

    /// Show an application
    Show { id: Uuid },

    /// Update application fields
    Update {
        id: Uuid,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        repo: Option<String>,

        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        automated: Option<bool>,
    },

    /// Promote a proposed application to internal
    Promote { id: Uuid },
}

#[derive(Debug, Subcommand)]
enum ConvCommand {
    /// Start a conversation
    Start {
        /// Requesting user
        #[arg(long)]
        user: Uuid,

        /// Existing application the request is about
        #[arg(long)]
        app: Option<Uuid>,
    },

    /// List conversations
    List {
        #[arg(long)]
        user: Option<Uuid>,
    },

    /// Show a conversation transcript
    Show { id: Uuid },

    /// Add a user message and get the assistant's reply
    Say {
        id: Uuid,
        message: String,

        /// Store the message without generating a reply
        #[arg(long)]
        no_reply: bool,
    },

    /// Set the review status
    Status {
        id: Uuid,

        /// pending, in_review, approved, rejected or completed
        status: ConversationStatus,
    },

    /// Sign off and generate documents
    SignOff {
        id: Uuid,

        /// Sign off again even if already signed off
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Subcommand)]
enum DocCommand {
    /// List documents of a conversation
    List { conversation: Uuid },

    /// Print a document
    Show { id: Uuid },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.unwrap_or_else(Config::default_config_path);
    let config = Config::ensure_at(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let ctx = WorkflowContext::from_config(&config)
        .await
        .context("opening workflow")?;
    let dispatcher = Dispatcher::new(ctx.clone());
    let mut events = ctx.bus.subscribe();
    let out = Output { json: cli.json };

    let result = match cli.command {
        Command::Init => {
            println!("Config:   {}", config_path.display());
            println!("Database: {}", config.database.display());
            println!("LLM:      {} ({})", config.llm.provider, config.llm.model);
            Ok(())
        }
        Command::User { command } => cmd_user(&ctx, &out, command).await,
        Command::App { command } => cmd_app(&ctx, &out, command).await,
        Command::Conv { command } => cmd_conv(&ctx, &out, &dispatcher, &mut events, command).await,
        Command::Doc { command } => cmd_doc(&ctx, &out, command).await,
        Command::Notifications { user } => {
            let notifications = ctx.db.list_notifications(user).await?;
            out.emit(&notifications, || pretty::print_notifications(&notifications))
        }
    };

    // Background work triggered by the command runs to completion before exit.
    let handled = dispatcher.drain(&mut events).await;
    tracing::debug!(handled, "Drained event bus");

    result
}

struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize + ?Sized>(&self, value: &T, pretty: impl FnOnce()) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            pretty();
        }
        Ok(())
    }
}

async fn cmd_user(ctx: &WorkflowContext, out: &Output, command: UserCommand) -> Result<()> {
    match command {
        UserCommand::Add {
            username,
            email,
            admin,
        } => {
            let user = actions::create_user(ctx, &username, &email, admin).await?;
            out.emit(&user, || pretty::print_users(std::slice::from_ref(&user)))
        }
        UserCommand::List => {
            let users = ctx.db.list_users().await?;
            out.emit(&users, || pretty::print_users(&users))
        }
    }
}

async fn cmd_app(ctx: &WorkflowContext, out: &Output, command: AppCommand) -> Result<()> {
    match command {
        AppCommand::Create {
            name,
            category,
            description,
            repo,
            url,
            automated,
        } => {
            let mut input = NewApplication::new(category, name);
            input.short_description = description;
            input.repo = repo;
            input.url = url;
            input.is_automated = automated;
            let app = actions::create_application(ctx, input).await?;
            out.emit(&app, || pretty::print_application(&app))
        }
        AppCommand::List { category } => {
            let apps = ctx.db.list_applications(category).await?;
            out.emit(&apps, || pretty::print_applications(&apps))
        }
        AppCommand::Show { id } => {
            let app = ctx.application(id).await?;
            out.emit(&app, || pretty::print_application(&app))
        }
        AppCommand::Update {
            id,
            name,
            description,
            repo,
            url,
            status,
            automated,
        } => {
            let patch = ApplicationPatch {
                name,
                short_description: description,
                is_automated: automated,
                status,
                url,
                repo,
                ..ApplicationPatch::default()
            };
            let app = actions::update_application(ctx, id, patch).await?;
            out.emit(&app, || pretty::print_application(&app))
        }
        AppCommand::Promote { id } => {
            let app = actions::promote_application(ctx, id).await?;
            out.emit(&app, || pretty::print_application(&app))
        }
    }
}

async fn cmd_conv(
    ctx: &WorkflowContext,
    out: &Output,
    dispatcher: &Dispatcher,
    events: &mut tokio::sync::broadcast::Receiver<intake_core::DomainEvent>,
    command: ConvCommand,
) -> Result<()> {
    match command {
        ConvCommand::Start { user, app } => {
            let conv = actions::start_conversation(ctx, user, app).await?;
            out.emit(&conv, || pretty::print_conversations(std::slice::from_ref(&conv)))
        }
        ConvCommand::List { user } => {
            let conversations = ctx.db.list_conversations(user).await?;
            out.emit(&conversations, || pretty::print_conversations(&conversations))
        }
        ConvCommand::Show { id } => {
            let full = ctx
                .db
                .get_conversation_with_messages(id)
                .await?
                .with_context(|| format!("conversation {id} not found"))?;
            out.emit(&full, || pretty::print_conversation(&full))
        }
        ConvCommand::Say {
            id,
            message,
            no_reply,
        } => {
            let posted = actions::post_user_message(ctx, id, &message).await?;
            if no_reply {
                return out.emit(&posted, || pretty::print_message(&posted));
            }
            let reply = actions::reply(ctx, id).await?;
            out.emit(&reply, || pretty::print_message(&reply))
        }
        ConvCommand::Status { id, status } => {
            let conv = actions::update_conversation_status(ctx, id, status).await?;
            dispatcher.drain(events).await;
            let conv = ctx.conversation(conv.id).await?;
            out.emit(&conv, || pretty::print_conversations(std::slice::from_ref(&conv)))
        }
        ConvCommand::SignOff { id, force } => {
            actions::sign_off(ctx, id, force).await?;
            dispatcher.drain(events).await;
            let documents = ctx.db.list_documents(id).await?;
            out.emit(&documents, || pretty::print_documents(&documents))
        }
    }
}

async fn cmd_doc(ctx: &WorkflowContext, out: &Output, command: DocCommand) -> Result<()> {
    match command {
        DocCommand::List { conversation } => {
            let documents = ctx.db.list_documents(conversation).await?;
            out.emit(&documents, || pretty::print_documents(&documents))
        }
        DocCommand::Show { id } => {
            let doc = ctx.document(id).await?;
            out.emit(&doc, || pretty::print_document(&doc))
        }
    }
}

//! Keepsake CLI
//!
//! One-shot journal commands for scripts:
//! - List posts and comments
//! - Write posts and comments
//! - Delete posts and comments (hosted backends)
//! - Generate a config file

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use keepsake::app::render::format_date;
use keepsake::app::JournalApp;
use keepsake::auth::CredentialTable;
use keepsake::config::{generate_default_config, BackendKind, Config};
use keepsake::storage::{open_store, Comment, Post};
use keepsake::telemetry::init_logging;
use std::io::{BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "keepsake-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scriptable access to a Keepsake journal")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the usual locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured backend
    #[arg(long, global = true)]
    pub backend: Option<Backend>,

    /// Display name to log in as
    #[arg(short, long, global = true)]
    pub name: Option<String>,

    /// Login code
    #[arg(long, global = true)]
    pub code: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Backend {
    Local,
    Sqlite,
    Remote,
}

impl From<Backend> for BackendKind {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Local => BackendKind::Local,
            Backend::Sqlite => BackendKind::Sqlite,
            Backend::Remote => BackendKind::Remote,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List posts, most recent first
    List,

    /// Write a post
    Post {
        /// Post body
        content: String,
    },

    /// Show the comments of a post
    Comments {
        /// Post id, or #n for the n-th listed post
        post: String,
    },

    /// Comment on a post
    Comment {
        /// Post id, or #n for the n-th listed post
        post: String,
        /// Comment body
        content: String,
    },

    /// Delete a post and its comments
    DeletePost {
        /// Post id, or #n for the n-th listed post
        post: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete a comment
    DeleteComment {
        /// Post the comment belongs to
        post: String,
        /// Comment id, or #n for the n-th comment
        comment: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("Config written to {}", path.display());
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.storage.backend = backend.into();
    }
    init_logging(&config.logging);

    let (Some(name), Some(code)) = (cli.name.as_deref(), cli.code.as_deref()) else {
        bail!("--name and --code are required");
    };

    let store = open_store(&config.storage).await?;
    let mut app = JournalApp::new(store, CredentialTable::from_config(&config.auth));
    app.login(name, code).await?;
    if !app.notices().is_empty() {
        for notice in app.notices() {
            eprintln!("warning: {}", notice.message);
        }
        app.clear_notices();
        // Surface the real error if the initial load was what failed.
        app.load_posts().await?;
    }

    match cli.command {
        Commands::List => print_posts(app.posts(), cli.format)?,

        Commands::Post { content } => {
            let post = app.create_post(&content).await?;
            print_posts(std::slice::from_ref(&post), cli.format)?;
        }

        Commands::Comments { post } => {
            let post_id = resolve_post(&app, &post)?;
            app.open_comments(&post_id).await?;
            let comments = app.modal().map(|m| m.comments.as_slice()).unwrap_or_default();
            print_comments(comments, cli.format)?;
        }

        Commands::Comment { post, content } => {
            let post_id = resolve_post(&app, &post)?;
            app.open_comments(&post_id).await?;
            let comment = app.add_comment(&content).await?;
            print_comments(std::slice::from_ref(&comment), cli.format)?;
        }

        Commands::DeletePost { post, yes } => {
            let post_id = resolve_post(&app, &post)?;
            let prompt = app.request_delete_post(&post_id)?;
            let confirmed = yes || ask(prompt)?;
            if app.resolve_confirmation(confirmed).await? {
                println!("Deleted post {}", post_id);
            } else {
                println!("Cancelled");
            }
        }

        Commands::DeleteComment { post, comment, yes } => {
            let post_id = resolve_post(&app, &post)?;
            app.open_comments(&post_id).await?;
            let Some(comment_id) = app.find_comment(&comment) else {
                bail!("no comment {} on post {}", comment, post_id);
            };
            let prompt = app.request_delete_comment(&comment_id)?;
            let confirmed = yes || ask(prompt)?;
            if app.resolve_confirmation(confirmed).await? {
                println!("Deleted comment {}", comment_id);
            } else {
                println!("Cancelled");
            }
        }

        // Handled before login.
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn resolve_post(app: &JournalApp, reference: &str) -> anyhow::Result<keepsake::PostId> {
    match app.find_post(reference) {
        Some(id) => Ok(id),
        None => bail!("no post {}", reference),
    }
}

/// Ask a yes/no question on the terminal
fn ask(prompt: &str) -> anyhow::Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn print_posts(posts: &[Post], format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(posts)?);
        return Ok(());
    }

    if posts.is_empty() {
        println!("No posts yet.");
        return Ok(());
    }

    println!("{:<4} {:<38} {:<10} {:<17} {:>8}", "#", "ID", "AUTHOR", "DATE", "COMMENTS");
    println!("{}", "-".repeat(81));
    for (i, post) in posts.iter().enumerate() {
        println!(
            "{:<4} {:<38} {:<10} {:<17} {:>8}",
            i + 1,
            post.id.as_str(),
            post.author,
            format_date(post.created_at),
            post.comment_count
        );
        for line in post.content.lines() {
            println!("     {}", line);
        }
    }
    Ok(())
}

fn print_comments(comments: &[Comment], format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(comments)?);
        return Ok(());
    }

    if comments.is_empty() {
        println!("No comments yet.");
        return Ok(());
    }

    for (i, comment) in comments.iter().enumerate() {
        println!(
            "#{:<3} {} · {} ({})",
            i + 1,
            comment.author,
            format_date(comment.created_at),
            comment.id
        );
        println!("     {}", comment.content);
    }
    Ok(())
}

//! Keepsake
//!
//! Interactive terminal journal. Logs in through the credential gate, then
//! shows the post list and comment threads and keeps them current while
//! the other person writes.

use clap::Parser;
use keepsake::app::render::render;
use keepsake::app::{AppError, JournalApp, Screen};
use keepsake::auth::CredentialTable;
use keepsake::config::{BackendKind, Config};
use keepsake::storage::open_store;
use keepsake::telemetry::init_logging;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
commands:
  post <text>             write a post
  open <#n|id>            show the comments of a post
  comment <text>          comment on the open post
  close                   back to the list
  delete <#n|id>          delete a post (hosted backends)
  delete-comment <#n|id>  delete a comment of the open post
  y / n                   answer a confirmation
  reload                  fetch everything again
  dismiss [n]             dismiss notice n (default: all)
  logout                  end the session
  help                    this text
  quit                    exit";

#[derive(Parser)]
#[command(name = "keepsake")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A private journal for two")]
struct Args {
    /// Config file (default: search the usual locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend to use: local, sqlite or remote
    #[arg(short, long)]
    backend: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load_or_default(args.config.as_deref())?;
    if let Some(backend) = args.backend.as_deref() {
        config.storage.backend = BackendKind::parse(backend)
            .ok_or_else(|| anyhow::anyhow!("unknown backend '{}'", backend))?;
    }
    init_logging(&config.logging);

    let store = open_store(&config.storage).await?;
    let mut app = JournalApp::new(store, CredentialTable::from_config(&config.auth));

    run_shell(&mut app).await?;

    app.logout();
    Ok(())
}

/// What to do after a line of input
enum Flow {
    Continue,
    Quit,
}

async fn run_shell(app: &mut JournalApp) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    redraw(app);
    loop {
        prompt(app)?;

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if let Flow::Quit = handle_line(app, &line).await {
                    break;
                }
                redraw(app);
            }
            Some(event) = app.next_change(), if app.is_live() => {
                let _ = app.handle_change(&event).await;
                println!();
                redraw(app);
            }
        }
    }

    Ok(())
}

fn redraw(app: &JournalApp) {
    println!("{}", render(app));
}

fn prompt(app: &JournalApp) -> std::io::Result<()> {
    let label = match app.screen() {
        Screen::Login if app.login_form().name.is_empty() => "이름(귀연/소영)",
        Screen::Login => "code",
        _ if app.pending_confirmation().is_some() => "y/n",
        Screen::Comments => "comment",
        _ => "keepsake",
    };
    print!("{}> ", label);
    std::io::stdout().flush()
}

/// Print errors the app did not already record as a notice
fn report(app: &JournalApp, before: usize, result: Result<(), AppError>) {
    if let Err(e) = result {
        if app.notices().len() == before {
            println!("! {}", e);
        }
    }
}

async fn handle_line(app: &mut JournalApp, line: &str) -> Flow {
    let line = line.trim();
    let before = app.notices().len();

    if app.screen() == Screen::Login {
        if line == "quit" {
            return Flow::Quit;
        }
        let form = app.login_form_mut();
        if form.name.is_empty() {
            form.name = line.to_string();
            if !line.is_empty() {
                return Flow::Continue;
            }
        } else {
            form.code = line.to_string();
        }
        let result = app.submit_login().await;
        report(app, before, result);
        return Flow::Continue;
    }

    if app.pending_confirmation().is_some() {
        let answer = matches!(line, "y" | "Y" | "yes");
        let result = app.resolve_confirmation(answer).await.map(|_| ());
        report(app, before, result);
        return Flow::Continue;
    }

    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    let result = match command {
        "" => Ok(()),
        "help" | "?" => {
            println!("{}", HELP);
            Ok(())
        }
        "quit" | "exit" => return Flow::Quit,
        "logout" => {
            app.logout();
            Ok(())
        }
        "reload" => reload(app).await,
        "post" | "p" => app.create_post(rest).await.map(|_| ()),
        "open" | "o" => match app.find_post(rest) {
            Some(id) => app.open_comments(&id).await,
            None => Err(AppError::Validation(format!("no post {}", rest))),
        },
        "close" | "c" => {
            app.close_comments();
            Ok(())
        }
        "comment" => app.add_comment(rest).await.map(|_| ()),
        "delete" | "d" => match app.find_post(rest) {
            Some(id) => app.request_delete_post(&id).map(|_| ()),
            None => Err(AppError::Validation(format!("no post {}", rest))),
        },
        "delete-comment" | "dc" => match app.find_comment(rest) {
            Some(id) => app.request_delete_comment(&id).map(|_| ()),
            None if app.modal().is_none() => Err(AppError::NoOpenPost),
            None => Err(AppError::Validation(format!("no comment {}", rest))),
        },
        "dismiss" => {
            if rest.is_empty() {
                app.clear_notices();
            } else if let Ok(n) = rest.parse::<usize>() {
                app.dismiss_notice(n.saturating_sub(1));
            }
            Ok(())
        }
        // Inside a thread, bare text is a comment.
        _ if app.screen() == Screen::Comments => app.add_comment(line).await.map(|_| ()),
        _ => Err(AppError::Validation(format!(
            "unknown command '{}', try help",
            command
        ))),
    };

    report(app, before, result);
    Flow::Continue
}

async fn reload(app: &mut JournalApp) -> Result<(), AppError> {
    app.load_posts().await?;
    if app.modal().is_some() {
        app.reload_comments().await?;
    }
    Ok(())
}

use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use client_core::{
    config::DEFAULT_SETTINGS_FILE, load_settings, ClientError, CommentDraft, Confirm, FeedClient,
    Outcome,
};
use shared::domain::ChallengeKind;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Settings file; missing files fall back to defaults.
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    access_token: Option<String>,
    /// Revert a like or bookmark when the server refuses it.
    #[arg(long)]
    rollback_on_failure: bool,
    /// Answer yes to every confirmation prompt.
    #[arg(long)]
    yes: bool,
}

struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{prompt} [y/N] ");
        let _ = io::stdout().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

const HELP: &str = "\
commands:
  feed                       reload the feed
  show <n>                   print article n as json
  like <n> | bookmark <n>    toggle
  comment <n> <text>         post a comment
  remove <n>                 delete your article
  edit <n>                   open your article in the editor
  login <email> | register <email>
  profile <name> [about...]  update your profile
  menu | new                 toggle the user menu / new-article panel
  logout | help | quit";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config);
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if args.access_token.is_some() {
        settings.access_token = args.access_token;
    }
    settings.rollback_on_failure |= args.rollback_on_failure;

    let confirm: Arc<dyn Confirm> = if args.yes {
        Arc::new(client_core::AlwaysConfirm)
    } else {
        Arc::new(StdinConfirm)
    };
    let client = FeedClient::from_settings(&settings, confirm)?;
    let client = &client;
    println!("Connected to {}", settings.server_url);

    report(client, client.articles().refresh().await.map(|_| ()));
    print_feed(client);

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let rest: Vec<&str> = words.collect();

        let result: Result<()> = match command {
            "quit" | "exit" => break,
            "help" => {
                println!("{HELP}");
                Ok(())
            }
            "feed" => client
                .articles()
                .refresh()
                .await
                .map(|_| print_feed(client))
                .map_err(anyhow::Error::from),
            "show" => show_article(client, &rest),
            "like" => run_indexed(&rest, |index| async move {
                print_outcome(client.articles().toggle_like(index).await?);
                Ok(())
            })
            .await,
            "bookmark" => run_indexed(&rest, |index| async move {
                print_outcome(client.articles().toggle_bookmark(index).await?);
                Ok(())
            })
            .await,
            "comment" => post_comment(client, &rest).await,
            "remove" => run_indexed(&rest, |index| async move {
                print_outcome(client.articles().remove_article(index).await?);
                Ok(())
            })
            .await,
            "edit" => run_indexed(&rest, |index| async move {
                match client.articles().begin_edit(index)? {
                    Outcome::Applied(draft) => println!("editing #{}: {}", draft.id, draft.content),
                    skipped => print_outcome(skipped),
                }
                Ok(())
            })
            .await,
            "login" => verify(client, &rest, ChallengeKind::LogIn).await,
            "register" => verify(client, &rest, ChallengeKind::Register).await,
            "profile" => update_profile(client, &rest).await,
            "logout" => client.profile().log_out().map_err(anyhow::Error::from),
            "menu" => client
                .toggle_user_menu()
                .map_err(anyhow::Error::from)
                .map(|outcome| match outcome {
                    Outcome::Applied(true) => print_user_menu(client),
                    Outcome::Applied(false) => println!("menu closed"),
                    skipped => print_outcome(skipped),
                }),
            "new" => client
                .toggle_create_article()
                .map_err(anyhow::Error::from)
                .map(|outcome| match outcome {
                    Outcome::Applied(true) => println!("new article panel open"),
                    Outcome::Applied(false) => println!("new article panel closed"),
                    skipped => print_outcome(skipped),
                }),
            other => Err(anyhow!("unknown command '{other}', try 'help'")),
        };
        report(client, result);
    }

    Ok(())
}

/// Prints the result of a command and any message it left in the store.
fn report<E: Into<anyhow::Error>>(client: &FeedClient, result: Result<(), E>) {
    if let Err(err) = result {
        let err = err.into();
        match err.downcast_ref::<ClientError>() {
            Some(client_err) => warn!("{client_err}"),
            None => println!("{err:#}"),
        }
    }
    if let Some(notification) = client.store().snapshot().notification {
        println!("[{:?}] {}", notification.kind, notification.message);
        let _ = client.store().dispatch(client_core::Action::ClearMessage);
    }
}

fn print_user_menu(client: &FeedClient) {
    if let Some(user) = client.store().current_user() {
        println!("{} ({})", user.name, user.introduce.unwrap_or_default());
        println!("  profile <name> [about...] | logout");
    }
}

fn print_outcome<T>(outcome: Outcome<T>) {
    if let Some(reason) = outcome.skip_reason() {
        println!("skipped: {reason:?}");
    }
}

fn print_feed(client: &FeedClient) {
    client.store().read(|state| {
        for (index, entry) in state.articles.iter().enumerate() {
            println!(
                "{index:>3}. #{} {}: {} [{} likes{}{}, {} comments]",
                entry.id,
                entry.creator.name,
                entry.content,
                entry.like_number,
                if entry.is_liked { ", liked" } else { "" },
                if entry.is_bookmarked { ", saved" } else { "" },
                entry.comment_number,
            );
        }
    });
}

fn parse_index(rest: &[&str]) -> Result<usize> {
    let raw = rest.first().ok_or_else(|| anyhow!("missing article index"))?;
    raw.parse()
        .with_context(|| format!("'{raw}' is not an article index"))
}

async fn run_indexed<F, Fut>(rest: &[&str], op: F) -> Result<()>
where
    F: FnOnce(usize) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    op(parse_index(rest)?).await
}

fn show_article(client: &FeedClient, rest: &[&str]) -> Result<()> {
    let entry = client.store().article(parse_index(rest)?)?;
    println!("{}", serde_json::to_string_pretty(&entry)?);
    Ok(())
}

async fn post_comment(client: &FeedClient, rest: &[&str]) -> Result<()> {
    let index = parse_index(rest)?;
    let mut draft = CommentDraft::default();
    draft.toggle();
    draft.set_content(rest[1..].join(" "));
    match client.articles().create_comment(index, &mut draft).await? {
        Outcome::Applied(comment) => println!("commented #{}", comment.id),
        skipped => print_outcome(skipped),
    }
    Ok(())
}

async fn verify(client: &FeedClient, rest: &[&str], kind: ChallengeKind) -> Result<()> {
    let email = rest.first().ok_or_else(|| anyhow!("missing email"))?;
    let session = client.verification(*email, kind);
    print_outcome(session.resend_secret().await?);

    print!("code sent to {email}, enter it: ");
    io::stdout().flush()?;
    let mut code = String::new();
    io::stdin().lock().read_line(&mut code)?;
    session.set_secret_key(code.trim());

    match session.verify_key().await? {
        Outcome::Applied(user) => println!("logged in as {}", user.name),
        skipped => print_outcome(skipped),
    }
    Ok(())
}

async fn update_profile(client: &FeedClient, rest: &[&str]) -> Result<()> {
    let editor = client.profile();
    let Some(mut form) = editor.form() else {
        println!("log in first");
        return Ok(());
    };
    let (name, about) = rest.split_first().ok_or_else(|| anyhow!("missing name"))?;
    form.name = name.to_string();
    if !about.is_empty() {
        form.introduce = about.join(" ");
    }
    print_outcome(editor.submit(&form).await?);
    Ok(())
}

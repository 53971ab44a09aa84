//! parley - terminal client for a parley chat service

mod config;
mod export;

use clap::{Parser, Subcommand};
use parley_client::{ChatClient, ClientConfig, SessionEvent};
use parley_wire::ApiClient;
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;

/// parley - chat with an assistant from the terminal
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server base URL (default: http://localhost:8000)
    #[arg(short, long)]
    server: Option<String>,

    /// Bearer token for the server
    #[arg(short, long)]
    token: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List conversations
    List,
    /// Export a conversation transcript to a text file
    Export {
        /// Conversation id
        id: String,
        /// Output path (default: <title>_history.txt)
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
    },
    /// Send a single prompt and print the reply
    Send {
        /// The prompt
        prompt: String,
        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("parley=debug")
            .init();
    }

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    // Load config file and merge with CLI args (CLI takes precedence)
    let cfg = config::Config::load();

    let server = args
        .server
        .or(cfg.server.clone())
        .unwrap_or_else(|| "http://localhost:8000".to_string());

    let token = args
        .token
        .or_else(|| std::env::var("PARLEY_TOKEN").ok())
        .or(cfg.token.clone());

    let mut api = ApiClient::new(server);
    if let Some(token) = token {
        api = api.with_token(token);
    }

    let mut client_config = ClientConfig::default();
    if let Some(secs) = cfg.idle_timeout_secs {
        client_config.idle_timeout = Duration::from_secs(secs);
    }
    let client = Arc::new(ChatClient::with_config(Arc::new(api), client_config));

    match args.command {
        Some(Command::List) => run_list(&client).await,
        Some(Command::Export { id, output }) => run_export(&client, &id, output).await,
        Some(Command::Send {
            prompt,
            conversation,
        }) => run_send(&client, &prompt, conversation.as_deref()).await,
        None => run_interactive(client).await,
    }
}

/// Print streamed output as it arrives.
fn spawn_printer(client: &ChatClient) -> tokio::task::JoinHandle<()> {
    let mut receiver = client.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = receiver.recv().await {
            match event {
                SessionEvent::Chunk { delta } => {
                    print!("{}", delta);
                    let _ = io::stdout().flush();
                }
                SessionEvent::TurnEnd { .. } => {
                    println!();
                }
                SessionEvent::TurnFailed { message } => {
                    eprintln!("\nError: {}", message);
                }
                SessionEvent::Promoted { conversation_id } => {
                    tracing::debug!("conversation persisted as {}", conversation_id);
                }
                _ => {}
            }
        }
    })
}

async fn run_list(client: &ChatClient) -> anyhow::Result<()> {
    client.refresh_catalog().await?;
    print_catalog(client);
    Ok(())
}

async fn run_export(
    client: &ChatClient,
    id: &str,
    output: Option<std::path::PathBuf>,
) -> anyhow::Result<()> {
    client.select_conversation(id).await?;
    let (transcript, path) = client.with_store(|store| {
        let conversation = store.active.as_ref();
        (
            conversation.map(export::format_transcript),
            conversation.map(|c| export::default_filename(&c.title)),
        )
    });
    let (Some(transcript), Some(default_path)) = (transcript, path) else {
        anyhow::bail!("conversation {} not loaded", id);
    };
    let path = output.unwrap_or(default_path);
    std::fs::write(&path, transcript)?;
    println!("Exported to {}", path.display());
    Ok(())
}

async fn run_send(
    client: &Arc<ChatClient>,
    prompt: &str,
    conversation: Option<&str>,
) -> anyhow::Result<()> {
    match conversation {
        Some(id) => client.select_conversation(id).await?,
        None => client.new_conversation(),
    }

    let printer = spawn_printer(client);
    let result = client.submit(prompt).await;

    // Give the printer a beat to drain the final events
    tokio::time::sleep(Duration::from_millis(100)).await;
    printer.abort();

    result?;
    Ok(())
}

async fn run_interactive(client: Arc<ChatClient>) -> anyhow::Result<()> {
    if let Err(e) = client.refresh_catalog().await {
        eprintln!("Warning: could not fetch conversations: {}", e);
    }
    client.new_conversation();

    let printer = spawn_printer(&client);

    if io::stderr().is_terminal() {
        eprintln!("parley (/help for commands)");
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        // Handle slash commands
        if let Some(rest) = input.strip_prefix('/') {
            let mut parts = rest.splitn(2, ' ');
            let command = parts.next().unwrap_or("").to_lowercase();
            let arg = parts.next().map(str::trim).unwrap_or("");

            match command.as_str() {
                "help" | "h" | "?" => print_help(),
                "quit" | "q" | "exit" => break,
                "new" | "n" => {
                    client.new_conversation();
                    println!("Started a new conversation.");
                }
                "list" | "ls" => {
                    if let Err(e) = client.refresh_catalog().await {
                        eprintln!("Error: {}", e);
                    }
                    print_catalog(&client);
                }
                "open" | "o" => match resolve_id(&client, arg) {
                    Some(id) => match client.select_conversation(&id).await {
                        Ok(()) => {
                            let title = client.with_store(|store| {
                                store.active.as_ref().map(|c| c.title.clone())
                            });
                            println!("Opened: {}", title.unwrap_or(id));
                        }
                        Err(e) => eprintln!("Error: {}", e),
                    },
                    None => println!("Usage: /open <id or list index>"),
                },
                "pin" | "unpin" => match resolve_id(&client, arg) {
                    Some(id) => {
                        if let Err(e) = client.set_pinned(&id, command == "pin").await {
                            eprintln!("Error: {}", e);
                        }
                    }
                    None => println!("Usage: /{} <id or list index>", command),
                },
                "fav" | "favorite" => {
                    if arg.is_empty() {
                        println!("Usage: /fav <message-id>");
                    } else {
                        match client.toggle_favorite(arg).await {
                            Ok(true) => println!("Added to favorites."),
                            Ok(false) => println!("Removed from favorites."),
                            Err(e) => eprintln!("Error: {}", e),
                        }
                    }
                }
                "favorites" | "favs" => print_favorites(&client),
                "delete" | "rm" => match resolve_id(&client, arg) {
                    Some(id) => match client.delete_conversation(&id).await {
                        Ok(()) => println!("Deleted."),
                        Err(e) => eprintln!("Error: {}", e),
                    },
                    None => println!("Usage: /delete <id or list index>"),
                },
                "export" => {
                    let exported = client.with_store(|store| {
                        store.active.as_ref().map(|c| {
                            (
                                export::format_transcript(c),
                                export::default_filename(&c.title),
                            )
                        })
                    });
                    match exported {
                        Some((transcript, path)) => match std::fs::write(&path, transcript) {
                            Ok(()) => println!("Exported to {}", path.display()),
                            Err(e) => eprintln!("Error: {}", e),
                        },
                        None => println!("No conversation to export."),
                    }
                }
                _ => {
                    println!("Unknown command: /{}", command);
                    println!("Type /help for available commands.");
                }
            }
            continue;
        }

        if let Err(e) = client.submit(input).await {
            eprintln!("Error: {}", e);
        }
    }

    printer.abort();
    Ok(())
}

/// Resolve a user-supplied argument to a conversation id: a 1-based list
/// index, or the id itself.
fn resolve_id(client: &ChatClient, arg: &str) -> Option<String> {
    if arg.is_empty() {
        return None;
    }
    if let Ok(index) = arg.parse::<usize>() {
        return client.with_store(|store| {
            index
                .checked_sub(1)
                .and_then(|i| store.catalog.get(i))
                .map(|c| c.id.clone())
        });
    }
    Some(arg.to_string())
}

fn print_catalog(client: &ChatClient) {
    client.with_store(|store| {
        if store.catalog.is_empty() {
            println!("No conversations.");
            return;
        }
        for (index, entry) in store.catalog.iter().enumerate() {
            let pin = if entry.pinned { "* " } else { "  " };
            println!(
                "{:>3}. {}{} [{}] ({})",
                index + 1,
                pin,
                entry.title,
                entry.id,
                entry.last_updated.format("%Y-%m-%d %H:%M")
            );
            if let Some(ref preview) = entry.preview {
                println!("       {}", preview);
            }
        }
    });
}

fn print_favorites(client: &ChatClient) {
    client.with_store(|store| {
        let Some(active) = store.active.as_ref() else {
            println!("No conversation open.");
            return;
        };
        let mut count = 0;
        for message in active.favorites() {
            let id = message.id.as_deref().unwrap_or("-");
            println!("[{}] {}", id, message.content);
            count += 1;
        }
        if count == 0 {
            println!("No favorites in this conversation.");
        }
    });
}

fn print_help() {
    println!("Commands:");
    println!("  /new              Start a new conversation");
    println!("  /list             List conversations");
    println!("  /open <id|#>      Open a conversation");
    println!("  /pin <id|#>       Pin a conversation");
    println!("  /unpin <id|#>     Unpin a conversation");
    println!("  /fav <msg-id>     Toggle a message's favorite flag");
    println!("  /favorites        Show favorited messages");
    println!("  /export           Export the open conversation");
    println!("  /delete <id|#>    Delete a conversation");
    println!("  /quit             Exit");
    println!();
    println!("Anything else is sent as a prompt.");
}

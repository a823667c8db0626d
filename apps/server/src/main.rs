use anyhow::Context;
use buzzhub_auth::ExternalIdentity;
use buzzhub_config::{load as load_config, AppConfig};
use buzzhub_database::{ConversationRepository, MessageRepository, UserRepository};
use buzzhub_gateway::build_router;
use buzzhub_runtime::{shutdown_signal, telemetry, BackendServices};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

const SEED_PROVIDER: &str = "seed";
const SEED_USERS: &[(&str, &str)] = &[("ada", "Ada Lovelace"), ("grace", "Grace Hopper")];

#[derive(Parser)]
#[command(name = "buzzhub-server")]
#[command(about = "BuzzHub messaging backend (serves HTTP by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Create demo users, sessions and a conversation
    SeedData,
    /// Print conversations and their messages
    DumpData,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing().context("failed to initialise tracing")?;

    let config = load_config().context("failed to load configuration")?;
    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(&config, &services).await,
        Commands::SeedData => seed_data(&services).await,
        Commands::DumpData => dump_data(&services).await,
    }
}

async fn run_server(config: &AppConfig, services: &BackendServices) -> anyhow::Result<()> {
    info!("starting BuzzHub backend");

    let app = build_router(services.gateway_state(config));

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    services.db_pool.close().await;
    info!("backend shut down");
    Ok(())
}

async fn seed_data(services: &BackendServices) -> anyhow::Result<()> {
    info!("seeding database with demo data");

    let mut user_ids = Vec::with_capacity(SEED_USERS.len());
    for (username, display_name) in SEED_USERS {
        let identity = ExternalIdentity {
            provider: SEED_PROVIDER.to_string(),
            subject: username.to_string(),
            email: Some(format!("{username}@example.com")),
            display_name: Some(display_name.to_string()),
        };
        let mut user = services
            .authenticator
            .resolve_identity(&identity)
            .await
            .with_context(|| format!("failed to create user {username}"))?;
        if user.needs_username() {
            user = services
                .authenticator
                .set_username(user.id, username)
                .await
                .with_context(|| format!("failed to claim username {username}"))?;
        }

        let session = services
            .authenticator
            .issue_session(user.id)
            .await
            .with_context(|| format!("failed to issue session for {username}"))?;
        println!(
            "{:<8} id={:<4} token={} (expires {})",
            username, user.id, session.token, session.expires_at
        );
        user_ids.push(user.id);
    }

    let Some((&creator, others)) = user_ids.split_first() else {
        return Ok(());
    };

    let conversation = services
        .router
        .create_conversation(creator, others)
        .await
        .context("failed to create demo conversation")?;

    let script = [
        (creator, "hi"),
        (others.first().copied().unwrap_or(creator), "hello, welcome to BuzzHub"),
    ];
    for (sender, body) in script {
        services
            .router
            .send(&conversation.id, sender, body)
            .await
            .context("failed to send demo message")?;
    }

    println!("conversation {} with {} messages", conversation.id, script.len());
    Ok(())
}

async fn dump_data(services: &BackendServices) -> anyhow::Result<()> {
    let users = UserRepository::new(services.db_pool.clone())
        .list()
        .await
        .context("failed to fetch users")?;

    println!("=== USERS ===");
    if users.is_empty() {
        println!("No users found in database");
    } else {
        println!("{:<5} {:<28} {:<20} {:<25}", "ID", "Public ID", "Username", "Created At");
        println!("{}", "-".repeat(80));
        for user in &users {
            println!(
                "{:<5} {:<28} {:<20} {:<25}",
                user.id,
                user.public_id,
                user.username.as_deref().unwrap_or("NULL"),
                user.created_at.to_rfc3339()
            );
        }
    }

    let conversations = ConversationRepository::new(services.db_pool.clone())
        .list_all()
        .await
        .context("failed to fetch conversations")?;
    let messages = MessageRepository::new(services.db_pool.clone());

    println!("\n=== CONVERSATIONS ===");
    if conversations.is_empty() {
        println!("No conversations found in database");
    }
    for conversation in conversations {
        let participants: Vec<String> = conversation
            .participant_ids
            .iter()
            .map(|id| id.to_string())
            .collect();
        println!(
            "{} (created by {}, participants [{}], {})",
            conversation.id,
            conversation.created_by,
            participants.join(", "),
            conversation.created_at.to_rfc3339()
        );

        let history = messages
            .list_by_conversation(&conversation.id, None)
            .await
            .with_context(|| format!("failed to fetch messages of {}", conversation.id))?;
        for message in history {
            println!(
                "  [{}] user {}: {}",
                message.created_at.to_rfc3339(),
                message.sender_id,
                message.body
            );
        }
    }

    Ok(())
}

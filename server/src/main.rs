// Tabshare server - administrative entry point.
//
// The HTTP/socket surface is hosted by an external transport layer; this
// binary covers bootstrap chores: migrations, seeding accounts, creating
// workspaces, and issuing invites from the command line.

pub use tabshare_server::*;

use anyhow::{anyhow, bail};
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tabshare_core::{
    config::AppConfig,
    db::Database,
    user::SubscriptionTier,
    workspace::MemberRole,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Tabshare workspace engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run database migrations
    Migrate,
    /// Create or refresh a user account
    CreateUser(CreateUserArgs),
    /// Create a workspace owned by an existing user
    CreateWorkspace(CreateWorkspaceArgs),
    /// Issue a workspace invite and print the join link
    Invite(InviteArgs),
}

#[derive(Args, Debug)]
struct CreateUserArgs {
    /// Email for the account
    #[arg(long, value_name = "EMAIL")]
    email: String,
    /// Display name
    #[arg(long, value_name = "NAME")]
    name: String,
    /// Subscription tier: free, premium, or enterprise
    #[arg(long, value_name = "TIER", default_value = "free")]
    tier: String,
}

#[derive(Args, Debug)]
struct CreateWorkspaceArgs {
    /// Owner user ID to associate with the workspace
    #[arg(long = "owner-id", value_name = "ID")]
    owner_id: String,
    /// Display name for the workspace
    #[arg(long, value_name = "NAME")]
    name: String,
    /// Optional description
    #[arg(long, value_name = "TEXT")]
    description: Option<String>,
}

#[derive(Args, Debug)]
struct InviteArgs {
    /// Workspace to invite into
    #[arg(long = "workspace-id", value_name = "ID")]
    workspace_id: String,
    /// Email address of the invitee
    #[arg(long, value_name = "EMAIL")]
    email: String,
    /// Requesting user; must be the workspace owner
    #[arg(long = "sender-id", value_name = "ID")]
    sender_id: String,
    /// Role granted on join: admin, member, or viewer
    #[arg(long, value_name = "ROLE", default_value = "member")]
    role: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::load()?;

    match cli.command {
        Command::Migrate => run_migrate(config).await,
        Command::CreateUser(args) => run_create_user(config, args).await,
        Command::CreateWorkspace(args) => run_create_workspace(config, args).await,
        Command::Invite(args) => run_invite(config, args).await,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

async fn run_migrate(config: AppConfig) -> anyhow::Result<()> {
    let _database = Database::connect(&config).await?;
    info!("migrations completed");
    Ok(())
}

async fn run_create_user(config: AppConfig, args: CreateUserArgs) -> anyhow::Result<()> {
    let email = args.email.trim();
    if email.is_empty() {
        bail!("email must not be empty");
    }

    let name = args.name.trim();
    if name.is_empty() {
        bail!("name must not be empty");
    }

    let tier = SubscriptionTier::parse(args.tier.trim())
        .ok_or_else(|| anyhow!("unknown subscription tier: {}", args.tier))?;

    let database = Database::connect(&config).await?;
    let state = build_state(&database, &config);

    let user = state.user_store.upsert(None, email, name, tier).await?;

    info!(user_id = %user.id, tier = %user.tier, "created user");
    println!("Created user '{}' ({})", user.name, user.id);

    Ok(())
}

async fn run_create_workspace(config: AppConfig, args: CreateWorkspaceArgs) -> anyhow::Result<()> {
    let database = Database::connect(&config).await?;
    let state = build_state(&database, &config);

    let workspace = state
        .workspace_service
        .create_workspace(&args.owner_id, &args.name, args.description.as_deref())
        .await
        .map_err(|err| anyhow!("failed to create workspace: {err}"))?;

    info!(
        workspace_id = %workspace.id,
        owner_id = %workspace.owner_id,
        "created workspace"
    );
    println!(
        "Created workspace '{}' ({}) for owner {}",
        workspace.name, workspace.id, workspace.owner_id
    );

    Ok(())
}

async fn run_invite(config: AppConfig, args: InviteArgs) -> anyhow::Result<()> {
    let role = MemberRole::parse(args.role.trim())
        .ok_or_else(|| anyhow!("unknown member role: {}", args.role))?;

    let database = Database::connect(&config).await?;
    let state = build_state(&database, &config);

    let issued = state
        .workspace_service
        .invite_member(&args.workspace_id, &args.email, role, &args.sender_id)
        .await
        .map_err(|err| anyhow!("failed to issue invite: {err}"))?;

    info!(
        workspace_id = %issued.invite.workspace_id,
        email = %issued.invite.email,
        "issued invite"
    );
    println!("Join link: {}", issued.join_link);

    Ok(())
}

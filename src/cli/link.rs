use std::net::IpAddr;
use std::sync::Arc;

use clap::{Args, Subcommand};
use rfq_app::{
    context::AppContext,
    database,
    domain::links::{
        IssueLinkRequest, LinkService, LinkSettings, LinksService, PgLinkRepository,
        SecureLinkMetadata,
    },
    domain::rfqs::records::RfqUuid,
};
use uuid::Uuid;

#[derive(Debug, Args)]
pub(crate) struct LinkCommand {
    #[command(subcommand)]
    command: LinkSubcommand,
}

#[derive(Debug, Subcommand)]
enum LinkSubcommand {
    /// Issue a secure link for an RFQ.
    Issue(IssueArgs),
    /// Resolve a token through the full access pipeline.
    Resolve(ResolveArgs),
    /// Permanently invalidate a link.
    Invalidate(TokenArgs),
    /// Show link metadata without recording an access.
    Inspect(TokenArgs),
}

#[derive(Debug, Args)]
struct IssueArgs {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    /// RFQ the link grants access to
    #[arg(long)]
    rfq_uuid: Uuid,

    /// Link lifetime in milliseconds; non-positive falls back to 7 days
    #[arg(long)]
    ttl_ms: Option<i64>,

    /// Permit exactly one successful resolution
    #[arg(long)]
    one_time: bool,

    /// Base URL the shareable link is built from
    #[arg(long, env = "SHARE_BASE_URL", default_value = "http://localhost:9000/rfq/link")]
    share_base_url: String,
}

#[derive(Debug, Args)]
struct ResolveArgs {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    /// Optional shared cache URL for distributed rate limiting
    #[arg(long, env = "REDIS_URL", hide_env_values = true)]
    cache_url: Option<String>,

    /// The presented token
    #[arg(long)]
    token: String,

    /// Client address attributed to the access
    #[arg(long, default_value = "127.0.0.1")]
    ip: IpAddr,
}

#[derive(Debug, Args)]
struct TokenArgs {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    /// The link token
    #[arg(long)]
    token: String,
}

pub(crate) async fn run(command: LinkCommand) -> Result<(), String> {
    match command.command {
        LinkSubcommand::Issue(args) => issue(args).await,
        LinkSubcommand::Resolve(args) => resolve(args).await,
        LinkSubcommand::Invalidate(args) => invalidate(args).await,
        LinkSubcommand::Inspect(args) => inspect(args).await,
    }
}

async fn links_service(
    database_url: &str,
    settings: LinkSettings,
) -> Result<LinksService<PgLinkRepository>, String> {
    let pool = database::connect(database_url)
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

    Ok(LinksService::new(
        Arc::new(PgLinkRepository::new(pool)),
        settings,
    ))
}

async fn issue(args: IssueArgs) -> Result<(), String> {
    let service = links_service(
        &args.database_url,
        LinkSettings {
            share_base_url: args.share_base_url,
        },
    )
    .await?;

    let issued = service
        .issue(
            RfqUuid::from_uuid(args.rfq_uuid),
            IssueLinkRequest {
                ttl_ms: args.ttl_ms,
                one_time: Some(args.one_time),
            },
        )
        .await
        .map_err(|error| format!("failed to issue link: {error}"))?;

    println!("share_url: {}", issued.share_url);
    print_metadata(&issued.metadata());

    Ok(())
}

async fn resolve(args: ResolveArgs) -> Result<(), String> {
    let context = AppContext::from_urls(
        &args.database_url,
        args.cache_url.as_deref(),
        LinkSettings::default(),
    )
    .await
    .map_err(|error| format!("failed to initialise application: {error}"))?;

    let opened = context
        .access
        .open_link(&args.token, args.ip)
        .await
        .map_err(|error| format!("resolution failed ({}): {error}", error.status()))?;

    let rfq = serde_json::to_string_pretty(&opened.rfq)
        .map_err(|error| format!("failed to serialize rfq: {error}"))?;

    println!("{rfq}");
    print_metadata(&opened.link);

    Ok(())
}

async fn invalidate(args: TokenArgs) -> Result<(), String> {
    let service = links_service(&args.database_url, LinkSettings::default()).await?;

    let record = service
        .invalidate(&args.token)
        .await
        .map_err(|error| format!("failed to invalidate link: {error}"))?;

    println!("disabled: {}", record.disabled);
    println!("expires_at: {}", record.expires_at);

    Ok(())
}

async fn inspect(args: TokenArgs) -> Result<(), String> {
    let service = links_service(&args.database_url, LinkSettings::default()).await?;

    let record = service
        .inspect(&args.token)
        .await
        .map_err(|error| format!("failed to inspect link: {error}"))?;

    print_metadata(&SecureLinkMetadata::from(&record));

    Ok(())
}

fn print_metadata(metadata: &SecureLinkMetadata) {
    println!("token: {}", metadata.token);
    println!("rfq_uuid: {}", metadata.rfq_uuid);
    println!("created_at: {}", metadata.created_at);
    println!("expires_at: {}", metadata.expires_at);
    println!("one_time: {}", metadata.one_time);
    println!("access_count: {}", metadata.access_count);

    if let Some(first_access_at) = metadata.first_access_at {
        println!("first_access_at: {first_access_at}");
    }

    if let Some(last_access_ip) = &metadata.last_access_ip {
        println!("last_access_ip: {last_access_ip}");
    }
}

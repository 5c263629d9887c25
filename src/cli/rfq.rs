use clap::{Args, Subcommand};
use rfq_app::{
    database,
    domain::rfqs::{PgRfqsService, RfqsService, data::NewRfq, records::RfqUuid},
};

#[derive(Debug, Args)]
pub(crate) struct RfqCommand {
    #[command(subcommand)]
    command: RfqSubcommand,
}

#[derive(Debug, Subcommand)]
enum RfqSubcommand {
    /// Create an RFQ record.
    Create(CreateRfqArgs),
}

#[derive(Debug, Args)]
struct CreateRfqArgs {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    /// Company name
    #[arg(long)]
    company: String,

    /// Contact person
    #[arg(long)]
    contact_name: String,

    /// Contact email
    #[arg(long)]
    contact_email: String,

    /// Optional contact phone
    #[arg(long)]
    contact_phone: Option<String>,
}

pub(crate) async fn run(command: RfqCommand) -> Result<(), String> {
    match command.command {
        RfqSubcommand::Create(args) => create(args).await,
    }
}

async fn create(args: CreateRfqArgs) -> Result<(), String> {
    let pool = database::connect(&args.database_url)
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

    let service = PgRfqsService::new(pool);

    let rfq = service
        .create_rfq(NewRfq {
            uuid: RfqUuid::new(),
            company: args.company,
            contact_name: args.contact_name,
            contact_email: args.contact_email,
            contact_phone: args.contact_phone,
        })
        .await
        .map_err(|error| format!("failed to create rfq: {error}"))?;

    println!("rfq_uuid: {}", rfq.uuid);
    println!("company: {}", rfq.company);

    Ok(())
}

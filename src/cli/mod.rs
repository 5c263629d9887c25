use clap::{Parser, Subcommand};

mod db;
mod link;
mod rfq;

#[derive(Debug, Parser)]
#[command(name = "rfq-app", about = "RFQ intake CLI", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Db(db::DbCommand),
    Rfq(rfq::RfqCommand),
    Link(link::LinkCommand),
}

impl Cli {
    pub(crate) async fn run(self) -> Result<(), String> {
        match self.command {
            Commands::Db(command) => db::run(command).await,
            Commands::Rfq(command) => rfq::run(command).await,
            Commands::Link(command) => link::run(command).await,
        }
    }
}

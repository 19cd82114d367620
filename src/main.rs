// Back Office - command line
//
// Maintenance tasks that run against the same database as the server.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use back_office::config::{CliArgs, Config};
use back_office::entities::offer;
use back_office::entities::user::{self, UserInput};
use back_office::entities::wallet;
use back_office::{db, import, logging, pricing, Role};

#[derive(Parser, Debug)]
#[command(name = "back-office", version, about = "Back office maintenance commands")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "back-office.toml")]
    config: String,

    /// SQLite database path (overrides config file)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Log level (overrides config file)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database file and bring the schema up to date
    Migrate,

    /// Create a user and print their API token
    CreateUser {
        /// admin, manager, sales, lead or customer
        #[arg(long)]
        role: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        company: Option<String>,
    },

    /// Import a CSV file (date,description,amount[,category]) into a wallet
    ImportTransactions {
        #[arg(long)]
        wallet: String,
        /// Email or id of the wallet member doing the import
        #[arg(long)]
        user: String,
        file: PathBuf,
    },

    /// Mark pending offers past their validity date as expired
    ExpireOffers,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&CliArgs {
        config: cli.config.clone(),
        database: cli.database.clone(),
        log_level: cli.log_level.clone(),
        ..CliArgs::default()
    })?;
    logging::init(&config.logging);

    let conn = db::open_database(&config.database.path)?;
    tracing::debug!(database = %config.database.path.display(), "database opened");

    match cli.command {
        Command::Migrate => {
            println!("✓ Database ready at {}", config.database.path.display());
        }

        Command::CreateUser { role, name, email, phone, company } => {
            let Some(role) = Role::parse(&role) else {
                bail!("Unknown role '{}' (expected admin, manager, sales, lead or customer)", role);
            };
            let input = UserInput {
                name: Some(name),
                email: Some(email),
                phone,
                company,
                address: None,
            };
            let created = user::create_user(&conn, &input, role)?;
            println!("✓ Created {} {} ({})", role.as_str(), created.user.name, created.user.id);
            println!("  API token: {}", created.api_token);
            println!("  The token is not stored in plain text; keep it now.");
        }

        Command::ImportTransactions { wallet: wallet_id, user: who, file } => {
            let actor = match user::find_by_email(&conn, &who)? {
                Some(found) => found,
                None => user::get_user(&conn, &who).with_context(|| format!("No user with email or id '{}'", who))?,
            };
            let wallet = wallet::get_wallet_for(&conn, &wallet_id, &actor)
                .with_context(|| format!("Wallet {} is not accessible to {}", wallet_id, actor.email))?;

            println!("📂 Importing {} into {}...", file.display(), wallet.name);
            let report = import::import_transactions_file(&conn, &wallet, &actor, &file)?;
            println!("✓ Rows read:   {}", report.rows);
            println!("✓ Inserted:    {}", report.inserted);
            println!("✓ Duplicates:  {}", report.duplicates);
            if !report.errors.is_empty() {
                println!("⚠ Skipped:     {}", report.errors.len());
                for error in &report.errors {
                    println!("    {}", error);
                }
            }
        }

        Command::ExpireOffers => {
            let expired = offer::expire_offers(&conn, pricing::today())?;
            println!("✓ {} offer(s) marked expired", expired);
        }
    }

    Ok(())
}

use std::path::PathBuf;
use std::process::ExitCode;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use invoicer::error::describe_field_errors;
use invoicer::net::api;
use invoicer::net::types::{ClientUpdate, InvoiceQuery, InvoiceStatus, InvoiceUpdate, NewClient, NewInvoice, Page};
use invoicer::{ApiError, AuthController, AuthOutcome, ClientConfig, FieldError};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("{0}")]
    Auth(String),
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("not logged in; run `invoicer login` first")]
    NotLoggedIn,
    #[error("nothing to update; pass at least one field")]
    EmptyUpdate,
    #[error("failed to render JSON: {0}")]
    Render(#[from] serde_json::Error),
}

impl From<Vec<FieldError>> for CliError {
    fn from(errors: Vec<FieldError>) -> Self {
        Self::Invalid(describe_field_errors(&errors))
    }
}

#[derive(Parser, Debug)]
#[command(name = "invoicer", about = "Invoice backend client")]
struct Cli {
    /// Backend base URL (falls back to VITE_API_URL, then http://localhost:8000).
    #[arg(long, env = "INVOICER_API_URL")]
    api_url: Option<String>,

    /// JSON file holding the persisted session token.
    #[arg(long, env = "INVOICER_STORAGE_PATH")]
    storage: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Ping,
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "INVOICER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        full_name: Option<String>,
    },
    Logout,
    Whoami,
    Invoice(InvoiceCommand),
    Client(ClientCommand),
}

#[derive(Args, Debug)]
struct InvoiceCommand {
    #[command(subcommand)]
    command: InvoiceSubcommand,
}

#[derive(Subcommand, Debug)]
enum InvoiceSubcommand {
    List {
        #[arg(long)]
        status: Option<InvoiceStatus>,
        #[arg(long)]
        skip: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
    },
    Get {
        id: i64,
    },
    Create(InvoiceCreateArgs),
    Update(InvoiceUpdateArgs),
    Delete {
        id: i64,
    },
}

#[derive(Args, Debug)]
struct InvoiceCreateArgs {
    #[arg(long)]
    number: String,
    #[arg(long)]
    customer: String,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    amount: BigDecimal,
    #[arg(long, default_value = "draft")]
    status: InvoiceStatus,
    #[arg(long)]
    description: Option<String>,
    #[arg(long, help = "YYYY-MM-DD")]
    issue_date: NaiveDate,
    #[arg(long, help = "YYYY-MM-DD")]
    due_date: NaiveDate,
}

#[derive(Args, Debug)]
struct InvoiceUpdateArgs {
    id: i64,
    #[arg(long)]
    number: Option<String>,
    #[arg(long)]
    customer: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    amount: Option<BigDecimal>,
    #[arg(long)]
    status: Option<InvoiceStatus>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    issue_date: Option<NaiveDate>,
    #[arg(long)]
    due_date: Option<NaiveDate>,
}

#[derive(Args, Debug)]
struct ClientCommand {
    #[command(subcommand)]
    command: ClientSubcommand,
}

#[derive(Subcommand, Debug)]
enum ClientSubcommand {
    List {
        #[arg(long)]
        skip: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
    },
    Get {
        id: i64,
    },
    Create(ClientFields),
    Update {
        id: i64,
        #[command(flatten)]
        fields: ClientUpdateFields,
    },
    Delete {
        id: i64,
    },
}

#[derive(Args, Debug)]
struct ClientFields {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    company: Option<String>,
    #[arg(long)]
    address: Option<String>,
}

#[derive(Args, Debug)]
struct ClientUpdateFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    company: Option<String>,
    #[arg(long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(api_url) = cli.api_url {
        config.api_url = invoicer::config::normalize_api_url(&api_url);
    }
    if let Some(storage) = cli.storage {
        config.storage_path = storage;
    }
    tracing::debug!(api_url = %config.api_url, storage = %config.storage_path.display(), "client config");

    let controller = invoicer::connect(&config);
    controller.restore().await;

    match run(&controller, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(controller: &AuthController, command: Command) -> Result<(), CliError> {
    let gateway = controller.gateway();
    match command {
        Command::Ping => print_json(&api::ping(gateway).await?),
        Command::Login { email, password } => {
            let outcome = controller.login(&email, &password).await;
            finish_auth(controller, outcome)
        }
        Command::Register { email, password, full_name } => {
            let outcome = controller
                .register(&email, &password, full_name.as_deref())
                .await;
            finish_auth(controller, outcome)
        }
        Command::Logout => {
            controller.logout();
            print_json(&AuthOutcome::Success)
        }
        Command::Whoami => {
            let user = controller.session().user().ok_or(CliError::NotLoggedIn)?;
            print_json(&user)
        }
        Command::Invoice(invoice) => run_invoice(controller, invoice).await,
        Command::Client(client) => run_client(controller, client).await,
    }
}

fn finish_auth(controller: &AuthController, outcome: AuthOutcome) -> Result<(), CliError> {
    match outcome {
        AuthOutcome::Success => print_json(&json!({
            "success": true,
            "user": controller.session().user(),
        })),
        AuthOutcome::Failure { error } => Err(CliError::Auth(error)),
    }
}

fn require_session(controller: &AuthController) -> Result<(), CliError> {
    if controller.session().is_authenticated() { Ok(()) } else { Err(CliError::NotLoggedIn) }
}

async fn run_invoice(controller: &AuthController, invoice: InvoiceCommand) -> Result<(), CliError> {
    require_session(controller)?;
    let gateway = controller.gateway();
    match invoice.command {
        InvoiceSubcommand::List { status, skip, limit } => {
            let invoices = api::list_invoices(gateway, InvoiceQuery { status, skip, limit }).await?;
            print_json(&invoices)
        }
        InvoiceSubcommand::Get { id } => print_json(&api::get_invoice(gateway, id).await?),
        InvoiceSubcommand::Create(args) => {
            let draft = NewInvoice {
                invoice_number: args.number,
                customer_name: args.customer,
                customer_email: args.email,
                amount: args.amount,
                status: args.status,
                description: args.description,
                issue_date: args.issue_date,
                due_date: args.due_date,
            }
            .normalized();
            draft.validate()?;
            print_json(&api::create_invoice(gateway, &draft).await?)
        }
        InvoiceSubcommand::Update(args) => {
            let update = InvoiceUpdate {
                invoice_number: args.number,
                customer_name: args.customer,
                customer_email: args.email,
                amount: args.amount,
                status: args.status,
                description: args.description,
                issue_date: args.issue_date,
                due_date: args.due_date,
            };
            if update.is_empty() {
                return Err(CliError::EmptyUpdate);
            }
            print_json(&api::update_invoice(gateway, args.id, &update).await?)
        }
        InvoiceSubcommand::Delete { id } => {
            api::delete_invoice(gateway, id).await?;
            print_json(&json!({ "deleted": id }))
        }
    }
}

async fn run_client(controller: &AuthController, client: ClientCommand) -> Result<(), CliError> {
    require_session(controller)?;
    let gateway = controller.gateway();
    match client.command {
        ClientSubcommand::List { skip, limit } => {
            print_json(&api::list_clients(gateway, Page { skip, limit }).await?)
        }
        ClientSubcommand::Get { id } => print_json(&api::get_client(gateway, id).await?),
        ClientSubcommand::Create(fields) => {
            let draft = NewClient {
                name: fields.name,
                email: fields.email,
                phone: fields.phone,
                company: fields.company,
                address: fields.address,
            }
            .normalized();
            draft.validate()?;
            print_json(&api::create_client(gateway, &draft).await?)
        }
        ClientSubcommand::Update { id, fields } => {
            let update = ClientUpdate {
                name: fields.name,
                email: fields.email,
                phone: fields.phone,
                company: fields.company,
                address: fields.address,
            };
            if update.is_empty() {
                return Err(CliError::EmptyUpdate);
            }
            print_json(&api::update_client(gateway, id, &update).await?)
        }
        ClientSubcommand::Delete { id } => {
            api::delete_client(gateway, id).await?;
            print_json(&json!({ "deleted": id }))
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

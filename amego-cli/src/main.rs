use amego_core::allowance::AllowanceRecord;
use amego_core::api::{AmegoClient, ApiResponse, ListQuery};
use amego_core::config::Config;
use amego_core::invoice::tax::{self, AmountOptions};
use amego_core::invoice::{InvoiceRecord, LineItem, PrinterEncoding};
use amego_core::sign::SignedRequest;
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "amego")]
#[command(about = "Amego e-invoice API client", version)]
struct Cli {
    #[command(flatten)]
    credentials: Credentials,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Credentials {
    /// Seller tax id (統一編號).
    #[arg(long, env = "AMEGO_TAX_ID", global = true)]
    tax_id: Option<String>,
    #[arg(long, env = "AMEGO_APP_KEY", hide_env_values = true, global = true)]
    app_key: Option<String>,
    #[arg(long, env = "AMEGO_BASE_URL", global = true)]
    base_url: Option<String>,
    #[arg(long, env = "AMEGO_TIMEOUT_SECS", global = true)]
    timeout_secs: Option<u64>,
    /// Measure the gateway clock offset before sending a signed request.
    #[arg(long, global = true)]
    sync_time: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the signed form body for an invoice file without sending it.
    Sign {
        #[arg(long)]
        invoice: PathBuf,
        /// Unix timestamp to sign with instead of the current time.
        #[arg(long)]
        time: Option<i64>,
        /// Print the signed request as JSON instead of a form body.
        #[arg(long)]
        json: bool,
    },
    /// Issue an invoice with a gateway-assigned number.
    Submit {
        #[arg(long)]
        invoice: PathBuf,
        /// Send even if local validation fails.
        #[arg(long)]
        skip_validation: bool,
    },
    /// Issue an invoice under a caller-chosen number.
    SubmitWithNumber {
        #[arg(long)]
        invoice: PathBuf,
        #[arg(long)]
        number: String,
        #[arg(long)]
        skip_validation: bool,
    },
    Cancel {
        #[arg(required = true)]
        numbers: Vec<String>,
    },
    Status {
        #[arg(required = true)]
        numbers: Vec<String>,
    },
    Detail {
        number: String,
    },
    /// List issued invoices.
    List(ListArgs),
    /// Download an invoice PDF.
    File(FileArgs),
    /// Fetch thermal printer data for an invoice.
    Print(PrintArgs),
    /// Allowances (折讓) against issued invoices.
    Allowance {
        #[command(subcommand)]
        command: AllowanceCommand,
    },
    /// Look up company names by tax id.
    Company {
        #[arg(required = true)]
        tax_ids: Vec<String>,
    },
    /// Check that a mobile barcode carrier is registered.
    Barcode {
        barcode: String,
    },
    /// Lottery result for an invoice.
    Lottery {
        number: String,
    },
    /// Prize definitions for a period (e.g. 11312).
    Prizes {
        #[arg(long)]
        period: Option<String>,
    },
    /// Number tracks assigned to the seller.
    Tracks {
        #[arg(long)]
        period: Option<String>,
    },
    /// Reserve invoice numbers.
    Reserve {
        count: u32,
        #[arg(long)]
        track_code: Option<String>,
    },
    /// Usage status of a reserved invoice number.
    NumberStatus {
        number: String,
    },
    /// Show the gateway clock and its offset from the local clock.
    Time,
    /// Check an invoice file without contacting the gateway.
    Validate {
        #[arg(long)]
        invoice: PathBuf,
    },
    /// Compute invoice totals for a JSON array of line items.
    Calculate {
        #[arg(long)]
        items: PathBuf,
        #[arg(long, default_value = "0000000000")]
        buyer: String,
        #[arg(long, default_value_t = tax::DEFAULT_TAX_RATE)]
        tax_rate: Decimal,
        /// Line amounts exclude tax.
        #[arg(long)]
        exclusive: bool,
    },
}

#[derive(Subcommand)]
enum AllowanceCommand {
    Create {
        #[arg(long)]
        allowance: PathBuf,
        #[arg(long)]
        skip_validation: bool,
    },
    Cancel {
        #[arg(required = true)]
        numbers: Vec<String>,
    },
    Status {
        #[arg(required = true)]
        numbers: Vec<String>,
    },
    Detail {
        number: String,
    },
    List(ListArgs),
    File(FileArgs),
    Print(PrintArgs),
    /// Check an allowance file without contacting the gateway.
    Validate {
        #[arg(long)]
        allowance: PathBuf,
    },
}

#[derive(Args)]
struct ListArgs {
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long)]
    page: Option<u32>,
    #[arg(long, default_value_t = 20)]
    page_size: u32,
}

#[derive(Args)]
struct FileArgs {
    number: String,
    /// Where to write the PDF.
    #[arg(long)]
    output: PathBuf,
}

#[derive(Args)]
struct PrintArgs {
    number: String,
    #[arg(long, default_value_t = 2)]
    printer_type: u32,
    /// BIG5, GBK or UTF-8.
    #[arg(long)]
    encoding: Option<PrinterEncoding>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Sign {
            invoice,
            time,
            json,
        } => {
            let config = cli.credentials.config()?;
            let invoice = load_invoice(&invoice)?;
            let signed = match time {
                Some(timestamp) => SignedRequest::new(
                    &invoice,
                    config.seller_tax_id(),
                    config.app_key(),
                    timestamp,
                )?,
                None => client(config)?.sign(&invoice)?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&signed)?);
            } else {
                println!("{}", signed.to_form_body()?);
            }
        }
        Commands::Submit {
            invoice,
            skip_validation,
        } => {
            let invoice = load_checked_invoice(&invoice, skip_validation)?;
            let client = cli.credentials.client()?;
            print_response(client.create_invoice(&invoice)?)?;
        }
        Commands::SubmitWithNumber {
            invoice,
            number,
            skip_validation,
        } => {
            let invoice = load_checked_invoice(&invoice, skip_validation)?;
            let client = cli.credentials.client()?;
            print_response(client.create_invoice_with_number(&invoice, &number)?)?;
        }
        Commands::Cancel { numbers } => {
            let client = cli.credentials.client()?;
            print_response(client.cancel_invoices(&as_strs(&numbers))?)?;
        }
        Commands::Status { numbers } => {
            let client = cli.credentials.client()?;
            print_response(client.invoice_status(&as_strs(&numbers))?)?;
        }
        Commands::Detail { number } => {
            let client = cli.credentials.client()?;
            print_response(client.invoice_detail(&number)?)?;
        }
        Commands::List(args) => {
            let client = cli.credentials.client()?;
            print_response(client.invoice_list(&args.query())?)?;
        }
        Commands::File(args) => {
            let client = cli.credentials.client()?;
            save_file(client.invoice_file(&args.number)?, &args.output)?;
        }
        Commands::Print(args) => {
            let client = cli.credentials.client()?;
            print_response(client.invoice_print(&args.number, args.printer_type, args.encoding)?)?;
        }
        Commands::Allowance { command } => run_allowance(&cli.credentials, command)?,
        Commands::Company { tax_ids } => {
            let client = cli.credentials.client()?;
            print_response(client.query_companies(&as_strs(&tax_ids))?)?;
        }
        Commands::Barcode { barcode } => {
            let client = cli.credentials.client()?;
            print_response(client.validate_barcode(&barcode)?)?;
        }
        Commands::Lottery { number } => {
            let client = cli.credentials.client()?;
            print_response(client.lottery_status(&number)?)?;
        }
        Commands::Prizes { period } => {
            let client = cli.credentials.client()?;
            print_response(client.lottery_prizes(period.as_deref())?)?;
        }
        Commands::Tracks { period } => {
            let client = cli.credentials.client()?;
            print_response(client.track_info(period.as_deref())?)?;
        }
        Commands::Reserve { count, track_code } => {
            let client = cli.credentials.client()?;
            print_response(client.reserve_numbers(count, track_code.as_deref())?)?;
        }
        Commands::NumberStatus { number } => {
            let client = cli.credentials.client()?;
            print_response(client.number_status(&number)?)?;
        }
        Commands::Time => {
            let client = client(cli.credentials.config()?)?;
            let reading = client.read_clock()?;
            println!("{}", serde_json::to_string_pretty(&reading)?);
        }
        Commands::Validate { invoice } => {
            let record = load_invoice(&invoice)?;
            match record.validate() {
                Ok(()) => println!("OK"),
                Err(err) => {
                    for issue in &err.issues {
                        eprintln!("{issue}");
                    }
                    bail!("{}: {err}", invoice.display());
                }
            }
        }
        Commands::Calculate {
            items,
            buyer,
            tax_rate,
            exclusive,
        } => {
            let raw = std::fs::read_to_string(&items)
                .with_context(|| format!("failed to read {}", items.display()))?;
            let line_items: Vec<LineItem> = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse line items in {}", items.display()))?;
            let options = AmountOptions {
                buyer_has_tax_id: tax::buyer_has_tax_id(&buyer),
                tax_rate,
                price_exclusive: exclusive,
            };
            let amounts = tax::calculate_amounts(&line_items, &options)?;
            println!("{}", serde_json::to_string_pretty(&amounts)?);
        }
    }

    Ok(())
}

fn run_allowance(credentials: &Credentials, command: AllowanceCommand) -> Result<()> {
    match command {
        AllowanceCommand::Create {
            allowance,
            skip_validation,
        } => {
            let record = load_allowance(&allowance)?;
            if !skip_validation {
                record
                    .validate()
                    .with_context(|| format!("allowance {} failed validation", allowance.display()))?;
            }
            print_response(credentials.client()?.create_allowance(&record)?)
        }
        AllowanceCommand::Cancel { numbers } => {
            print_response(credentials.client()?.cancel_allowances(&as_strs(&numbers))?)
        }
        AllowanceCommand::Status { numbers } => {
            print_response(credentials.client()?.allowance_status(&as_strs(&numbers))?)
        }
        AllowanceCommand::Detail { number } => {
            print_response(credentials.client()?.allowance_detail(&number)?)
        }
        AllowanceCommand::List(args) => {
            print_response(credentials.client()?.allowance_list(&args.query())?)
        }
        AllowanceCommand::File(args) => {
            save_file(credentials.client()?.allowance_file(&args.number)?, &args.output)
        }
        AllowanceCommand::Print(args) => print_response(credentials.client()?.allowance_print(
            &args.number,
            args.printer_type,
            args.encoding,
        )?),
        AllowanceCommand::Validate { allowance } => {
            let record = load_allowance(&allowance)?;
            match record.validate() {
                Ok(()) => {
                    println!("OK");
                    Ok(())
                }
                Err(err) => {
                    for issue in &err.issues {
                        eprintln!("{issue}");
                    }
                    bail!("{}: {err}", allowance.display());
                }
            }
        }
    }
}

impl ListArgs {
    fn query(&self) -> ListQuery {
        let mut query = ListQuery::default();
        if let Some(from) = self.from {
            query = query.start_date(from);
        }
        if let Some(to) = self.to {
            query = query.end_date(to);
        }
        if let Some(page) = self.page {
            query = query.page(page, self.page_size);
        }
        query
    }
}

impl Credentials {
    fn config(&self) -> Result<Config> {
        let tax_id = self
            .tax_id
            .as_deref()
            .context("seller tax id is required (--tax-id or AMEGO_TAX_ID)")?;
        let app_key = self
            .app_key
            .as_deref()
            .context("app key is required (--app-key or AMEGO_APP_KEY)")?;
        let mut config = Config::new(tax_id, app_key)?;
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url)?;
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs))?;
        }
        Ok(config)
    }

    fn client(&self) -> Result<AmegoClient> {
        let config = self.config()?;
        if !self.sync_time {
            return client(config);
        }
        let offset = client(config.clone())?
            .time_offset()
            .context("failed to read gateway clock")?;
        tracing::info!(offset, "using gateway clock offset");
        client(config.with_time_offset(offset))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn client(config: Config) -> Result<AmegoClient> {
    AmegoClient::new(config).context("failed to build HTTP client")
}

fn load_invoice(path: &Path) -> Result<InvoiceRecord> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    InvoiceRecord::from_json(&json)
        .with_context(|| format!("failed to parse invoice {}", path.display()))
}

fn load_checked_invoice(path: &Path, skip_validation: bool) -> Result<InvoiceRecord> {
    let invoice = load_invoice(path)?;
    if !skip_validation {
        invoice
            .validate()
            .with_context(|| format!("invoice {} failed validation", path.display()))?;
    }
    Ok(invoice)
}

fn load_allowance(path: &Path) -> Result<AllowanceRecord> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    AllowanceRecord::from_json(&json)
        .with_context(|| format!("failed to parse allowance {}", path.display()))
}

fn save_file(response: ApiResponse, output: &Path) -> Result<()> {
    let contents = response.file_contents()?;
    std::fs::write(output, &contents)
        .with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!(bytes = contents.len(), path = %output.display(), "saved file");
    println!("{}", output.display());
    Ok(())
}

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

fn print_response(response: ApiResponse) -> Result<()> {
    if let Some(code) = response.code().filter(|code| *code != 0) {
        eprintln!(
            "gateway returned code {code}: {}",
            response.message().unwrap_or("(no message)")
        );
    }
    println!("{}", serde_json::to_string_pretty(response.value())?);
    Ok(())
}

use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::process::exit;

use certcheck::config::Config;
use certcheck::{check_certificate_validity, write_result, CertificateCheckResult, HttpMethod};

#[derive(Parser, Debug)]
#[command(name = "certcheck", version, author, about, long_about = None)]
struct Cli {
    /// Keep the connection alive instead of a one-off connection
    #[arg(short = 'a', long)]
    agent: bool,

    /// HTTP method used to frame the request: get, post or head
    #[arg(short = 'm', long)]
    method: Option<HttpMethod>,

    /// TCP port of the TLS endpoint [default: 443]
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Host to check, or an https:// URL
    #[arg(short = 'H', long)]
    hostname: Option<String>,

    /// Abort connect, read or write after this many seconds
    #[arg(short = 't', long)]
    timeout: Option<u64>,

    /// Result file [default: certificateCheck.json]
    #[arg(short = 'o', long)]
    output: Option<String>,

    /// Configuration file [default: certcheck.toml if present]
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Warn when fewer days than this remain [default: 30]
    #[arg(long)]
    warn_days: Option<i64>,

    /// strftime pattern for the validity dates
    #[arg(long)]
    date_format: Option<String>,

    /// PEM file with additional trusted certificates
    #[arg(long)]
    ca_file: Option<String>,

    /// Exit code when the certificate is not valid [default: 0]
    #[arg(long)]
    exit_code: Option<i32>,

    /// Print an example configuration file and exit
    #[arg(long)]
    example_config: bool,

    /// Log connection details to stderr
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Cli {
    fn to_config(&self) -> Config {
        Config {
            hostname: self.hostname.clone(),
            port: self.port,
            method: self.method,
            agent: self.agent.then_some(true),
            timeout: self.timeout,
            output: self.output.clone(),
            warn_days: self.warn_days,
            exit_code: self.exit_code,
            date_format: self.date_format.clone(),
            ca_file: self.ca_file.clone(),
        }
    }
}

fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env = env_logger::Env::default().default_filter_or(default_level);
    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .init();
}

/// What a finished run prints to stdout and exits with.
#[derive(Debug)]
struct Outcome {
    code: i32,
    report: String,
}

fn run(cli: &Cli) -> Result<Outcome, Box<dyn Error>> {
    let config = Config::default()
        .merge_with(Config::discover(cli.config.as_deref())?)
        .merge_with(cli.to_config());
    let options = config.to_options()?;

    let result = check_certificate_validity(&options)?;
    if !result.is_valid {
        log::warn!(
            "certificate for {} is not valid ({} days remaining, trusted: {}); nothing written",
            options.hostname,
            result.day_remaining,
            result.valid
        );
        return Ok(Outcome {
            code: config.exit_code(),
            report: String::new(),
        });
    }

    write_result(&result, config.output_path())?;
    Ok(Outcome {
        code: 0,
        report: render_report(&result, config.warn_days())?,
    })
}

fn render_report(
    result: &CertificateCheckResult,
    warn_days: i64,
) -> Result<String, serde_json::Error> {
    let mut report = serde_json::to_string_pretty(result)?;
    report.push('\n');
    if result.day_remaining < warn_days {
        report.push_str(&format!(
            "Certificate expires soon, only {} days remaining\n",
            result.day_remaining
        ));
    }
    Ok(report)
}

/// Prints the outcome and returns the process exit status; errors exit 1.
fn finish(outcome: Result<Outcome, Box<dyn Error>>) -> i32 {
    match outcome {
        Ok(outcome) => {
            print!("{}", outcome.report);
            outcome.code
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    if cli.example_config {
        println!("{}", Config::example_toml());
        exit(0);
    }

    exit(finish(run(&cli)));
}

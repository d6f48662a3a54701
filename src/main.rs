use std::path::PathBuf;
use std::process;

use clap::Parser;

use oktad::aws::AwsClient;
use oktad::aws_profile::AwsConfigFile;
use oktad::broker::{Broker, RunRequest};
use oktad::cache::CredentialCache;
use oktad::credentials_file::CredentialsFile;
use oktad::launch::CommandLauncher;
use oktad::okta::{Okta, OktaClient};
use oktad::secret_store;
use oktad::settings::OktaConfig;
use oktad::ui::StdUI;
use oktad::BrokerError;

/// Log in through Okta, assume an AWS role and run a command with the
/// temporary credentials in its environment.
#[derive(Parser, Debug)]
#[command(name = "oktad", version, trailing_var_arg = true)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ignore cached credentials
    #[arg(short, long)]
    force: bool,

    /// Don't copy credentials into the AWS CLI credentials file
    #[arg(long)]
    no_mirror: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// AWS profile naming the destination role
    profile: String,

    /// Program to launch, with its arguments
    #[arg(required = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "oktad=debug" } else { "oktad=warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(BrokerError::Aborted) => {
            eprintln!("Aborted.");
            process::exit(130);
        }
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> oktad::Result<i32> {
    let okta_config = OktaConfig::load(cli.config.as_deref())?;
    log::debug!("okta base url: {}", okta_config.base_url);

    let aws_config = match AwsConfigFile::default_location() {
        Some(path) => AwsConfigFile::load(&path)?,
        None => AwsConfigFile::empty(),
    };

    let store = secret_store::open_default_store()?;
    let mut cache = CredentialCache::new(store.as_ref());
    if !cli.no_mirror {
        if let Some(path) = CredentialsFile::default_location() {
            cache = cache.with_mirror(CredentialsFile::new(path));
        }
    }

    let ui = StdUI::new();
    let okta_client = OktaClient::new(&okta_config)?;
    let okta = Okta::new(&ui, &okta_client, store.as_ref(), &okta_config);
    let sts = AwsClient::new()?;

    let broker = Broker {
        identity_provider: &okta,
        sts: &sts,
        cache: &cache,
        launcher: &CommandLauncher,
        aws_config: &aws_config,
        user_arn: okta_config.user_arn.clone(),
    };

    let command = match cli.command.split_first() {
        Some((first, rest)) if first == "--" => rest.to_vec(),
        _ => cli.command,
    };

    broker.run(&RunRequest {
        profile: cli.profile,
        command,
        force_refresh: cli.force,
    })
}

//! omni-connect - Link social accounts to Omnicast

use clap::{Parser, Subcommand};
use libomnicast::platforms::{telegram::TelegramClient, PlatformRegistry};
use libomnicast::{
    AccountConnector, Config, Credentials, Database, OmnicastError, Platform, Result,
    SessionCipher,
};

#[derive(Parser, Debug)]
#[command(name = "omni-connect")]
#[command(version)]
#[command(about = "Link social accounts to Omnicast", long_about = None)]
struct Cli {
    /// Owner identity the accounts belong to
    #[arg(long, env = "OMNICAST_OWNER", default_value = "default")]
    owner: String,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start an OAuth flow and print the authorization URL
    Oauth {
        /// Platform to connect (e.g. twitter)
        platform: String,
    },
    /// Finish an OAuth flow with the callback parameters
    Callback {
        /// State token from the callback
        state: String,
        /// Authorization code from the callback
        code: String,
    },
    /// Connect with a username and password
    Login {
        /// Platform to connect (instagram, tiktok, youtube)
        platform: String,
        username: String,
        /// Password (prompted via env to keep it out of shell history)
        #[arg(long, env = "OMNICAST_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Request a Telegram login code for a phone number
    SendCode {
        phone: String,
    },
    /// Connect Telegram with the code the user received
    Verify {
        phone: String,
        code: String,
        /// Code hash printed by send-code
        code_hash: String,
    },
    /// List connected accounts
    List {
        /// Restrict to one platform
        #[arg(short, long)]
        platform: Option<String>,
    },
    /// Disconnect an account (its history is kept)
    Disconnect {
        account_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("OMNICAST_LOG_LEVEL", "debug");
    }
    libomnicast::logging::init_default();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;
    let cipher = SessionCipher::from_config(&config)?;
    let registry = PlatformRegistry::from_config(&config);
    let connector = AccountConnector::new(db, registry, cipher, config.clone());

    let json = cli.format == "json";

    match cli.command {
        Command::Oauth { platform } => {
            let platform = parse_platform(&platform)?;
            let request = connector.begin_oauth(&cli.owner, platform).await?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "authorize_url": request.authorize_url,
                        "state": request.state_token,
                    })
                );
            } else {
                println!("Open this URL to authorize {}:", platform);
                println!("{}", request.authorize_url);
            }
        }
        Command::Callback { state, code } => {
            let account = connector.complete_oauth(&state, &code).await?;
            print_account(&account, json);
        }
        Command::Login {
            platform,
            username,
            password,
        } => {
            let platform = parse_platform(&platform)?;
            let credentials = Credentials::Password {
                username,
                password,
                email: None,
            };
            let account = connector
                .connect_with_credentials(&cli.owner, platform, &credentials)
                .await?;
            print_account(&account, json);
        }
        Command::SendCode { phone } => {
            let telegram = config
                .telegram
                .as_ref()
                .ok_or_else(|| OmnicastError::InvalidInput("telegram not configured".to_string()))?;
            let client = TelegramClient::new(telegram.clone());
            let code_hash = client.send_code(&phone).await?;
            if json {
                println!("{}", serde_json::json!({ "code_hash": code_hash }));
            } else {
                println!("Code sent to {}. Verify with:", phone);
                println!("  omni-connect verify {} <code> {}", phone, code_hash);
            }
        }
        Command::Verify {
            phone,
            code,
            code_hash,
        } => {
            let credentials = Credentials::Phone {
                phone,
                code,
                code_hash,
            };
            let account = connector
                .connect_with_credentials(&cli.owner, Platform::Telegram, &credentials)
                .await?;
            print_account(&account, json);
        }
        Command::List { platform } => {
            let platform = platform.as_deref().map(parse_platform).transpose()?;
            let accounts = connector.list_accounts(&cli.owner, platform).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&accounts).unwrap_or_default());
            } else if accounts.is_empty() {
                println!("No connected accounts");
            } else {
                for account in accounts {
                    let active = if account.is_active { "" } else { " (inactive)" };
                    println!(
                        "{}  {:10} @{}{}",
                        account.id, account.platform, account.external_user_id, active
                    );
                }
            }
        }
        Command::Disconnect { account_id } => {
            connector.disconnect(&cli.owner, &account_id).await?;
            if !json {
                println!("Disconnected {}", account_id);
            }
        }
    }

    Ok(())
}

fn parse_platform(s: &str) -> Result<Platform> {
    s.parse::<Platform>().map_err(OmnicastError::InvalidInput)
}

fn print_account(account: &libomnicast::ConnectedAccount, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(account).unwrap_or_default()
        );
    } else {
        println!(
            "Connected {} account @{} ({})",
            account.platform, account.external_user_id, account.id
        );
    }
}

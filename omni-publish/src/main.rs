//! omni-publish - Cross-post content to connected accounts

use clap::Parser;
use libomnicast::platforms::PlatformRegistry;
use libomnicast::{
    Config, Database, MediaKind, OmnicastError, PostContent, PostStatus, Publisher, Result,
    SessionCipher,
};
use std::io::Read;

#[derive(Parser, Debug)]
#[command(name = "omni-publish")]
#[command(version)]
#[command(about = "Cross-post content to connected accounts", long_about = None)]
struct Cli {
    /// Content to post (reads from stdin if not provided)
    content: Option<String>,

    /// Owner identity the accounts belong to
    #[arg(long, env = "OMNICAST_OWNER", default_value = "default")]
    owner: String,

    /// Target account ids (repeatable). Defaults to every active account.
    #[arg(short, long = "account")]
    accounts: Vec<String>,

    /// Attach a media file
    #[arg(short, long)]
    media: Option<String>,

    /// Media kind (photo or video); inferred from the file extension if omitted
    #[arg(long)]
    media_kind: Option<String>,

    /// Title for platforms that want one (YouTube)
    #[arg(short, long)]
    title: Option<String>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
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
    let text = match cli.content {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| OmnicastError::InvalidInput(format!("cannot read stdin: {}", e)))?;
            buffer.trim_end().to_string()
        }
    };

    let media_kind = match (&cli.media, &cli.media_kind) {
        (_, Some(kind)) => Some(
            MediaKind::parse(kind)
                .ok_or_else(|| OmnicastError::InvalidInput(format!("unknown media kind: {}", kind)))?,
        ),
        (Some(path), None) => infer_media_kind(path),
        (None, None) => None,
    };

    let content = PostContent {
        text,
        media_path: cli.media,
        media_kind,
        title: cli.title,
    };

    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;
    let cipher = SessionCipher::from_config(&config)?;
    let registry = PlatformRegistry::from_config(&config);

    // Default target set: every active account the owner has
    let account_ids = if cli.accounts.is_empty() {
        db.get_accounts_for_owner(&cli.owner, None)
            .await?
            .into_iter()
            .filter(|a| a.is_active)
            .map(|a| a.id)
            .collect()
    } else {
        cli.accounts
    };

    let publisher = Publisher::new(db, registry, cipher, &config);
    let report = publisher.publish(&cli.owner, content, &account_ids).await?;

    if cli.format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_default()
        );
    } else {
        println!(
            "Post {}: {} ({}/{} accounts succeeded)",
            report.post_id,
            report.status.as_str(),
            report.succeeded,
            report.total
        );
        for result in &report.results {
            if result.succeeded() {
                let url = result.external_url.as_deref().unwrap_or("-");
                println!("  ok   {:10} {}", result.platform, url);
            } else {
                let reason = result.error_message.as_deref().unwrap_or("unknown error");
                println!("  fail {:10} {}", result.platform, reason);
            }
        }
    }

    // Partial success is still an error for scripting purposes
    match report.status {
        PostStatus::Published => Ok(()),
        PostStatus::Partial => std::process::exit(4),
        _ => std::process::exit(1),
    }
}

fn infer_media_kind(path: &str) -> Option<MediaKind> {
    let ext = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())?
        .to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" | "png" | "gif" | "webp" => Some(MediaKind::Photo),
        "mp4" | "mov" | "webm" | "mkv" => Some(MediaKind::Video),
        _ => None,
    }
}

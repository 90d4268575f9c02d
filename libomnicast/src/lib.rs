//! Omnicast core library
//!
//! Cross-posting engine for social platforms: connect accounts (OAuth or
//! direct credentials), keep their sessions encrypted at rest, and fan
//! content out to every connected account concurrently with per-account
//! result tracking.
//!
//! # Examples
//!
//! ```no_run
//! use libomnicast::{Config, Database, Publisher, SessionCipher};
//! use libomnicast::platforms::PlatformRegistry;
//! use libomnicast::types::PostContent;
//!
//! # async fn example() -> libomnicast::Result<()> {
//! let config = Config::load()?;
//! let db = Database::new(&config.database.path).await?;
//! let cipher = SessionCipher::from_config(&config)?;
//! let registry = PlatformRegistry::from_config(&config);
//!
//! let publisher = Publisher::new(db, registry, cipher, &config);
//! let report = publisher
//!     .publish("user-1", PostContent::text("Hello from Omnicast"), &["acct-1".to_string()])
//!     .await?;
//! println!("{}: {}/{} succeeded", report.status.as_str(), report.succeeded, report.total);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connector;
pub mod error;
pub mod logging;
pub mod oauth;
pub mod platforms;
pub mod publisher;
pub mod session;
pub mod store;
pub mod types;
pub mod worker;

pub use config::Config;
pub use connector::AccountConnector;
pub use error::{OmnicastError, PlatformError, Result};
pub use oauth::OAuthStateManager;
pub use publisher::Publisher;
pub use session::{SessionCipher, SessionData};
pub use store::Database;
pub use types::{
    AccountStatus, ConnectedAccount, Credentials, MediaKind, Platform, Post, PostContent,
    PostResult, PostStatus, PublishReport,
};
pub use worker::WorkerClient;

//! Zalo Official Account client.
//!
//! Two pieces carry all of the state and failure handling:
//!
//! - [`TokenManager`]: keeps one OA access token alive, refreshing it shortly
//!   before expiry. Concurrent callers share a single in-flight refresh.
//! - [`SmartSender`]: delivers a text to a follower through the free
//!   consultation channel and falls back to a paid promotion message only when
//!   Zalo reports the recipient as ineligible for the free path.
//!
//! [`ZaloClient`] wires both together from a [`ZaloConfig`].
//!
//! # Example
//!
//! ```ignore
//! use zalo_oa::{ZaloClient, ZaloConfig};
//!
//! let config = ZaloConfig {
//!     app_id: "1234567890".to_string(),
//!     secret_key: "secret".to_string(),
//!     refresh_token: "refresh".to_string(),
//!     ..Default::default()
//! };
//! let client = ZaloClient::new(config)?;
//! let result = client
//!     .sender()
//!     .send_smart_message("user-id", "Hello", Some("attachment-id"))
//!     .await?;
//! ```

pub mod codes;
pub mod config;
pub mod error;
pub mod http_client;
pub mod message;
pub mod token;

mod client;

pub use client::ZaloClient;
pub use codes::ErrorCategory;
pub use config::ZaloConfig;
pub use error::{Result, ZaloError};
pub use message::{
    BatchSummary, DeliveryChannel, HttpMessageApi, MessageApi, SendOutcome, SendResult,
    SmartSender,
};
pub use token::{
    AccessTokenProvider, HttpTokenRefresher, RefreshOutcome, RefreshedToken, TokenInfo,
    TokenManager, TokenRefresher,
};

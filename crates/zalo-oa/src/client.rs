use std::sync::Arc;

use tracing::info;

use crate::config::ZaloConfig;
use crate::error::Result;
use crate::http_client::build_client;
use crate::message::{HttpMessageApi, SmartSender};
use crate::token::{HttpTokenRefresher, TokenManager};

/// Token manager and sender sharing one HTTP client.
#[derive(Clone)]
pub struct ZaloClient {
    tokens: TokenManager,
    sender: SmartSender,
}

impl ZaloClient {
    /// Validate `config` and wire the HTTP-backed components.
    pub fn new(config: ZaloConfig) -> Result<Self> {
        config.validate()?;
        let client = build_client(&config)?;

        let refresher = Arc::new(HttpTokenRefresher::new(client.clone(), &config));
        let tokens = TokenManager::new(&config, refresher);
        let api = Arc::new(HttpMessageApi::new(client, &config));
        let sender = SmartSender::new(Arc::new(tokens.clone()), api)
            .with_batch_delay(config.batch_delay);

        info!(
            oauth = %config.oauth_base_url,
            openapi = %config.openapi_base_url,
            can_refresh = config.can_refresh(),
            "Zalo client initialized"
        );

        Ok(Self { tokens, sender })
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn sender(&self) -> &SmartSender {
        &self.sender
    }
}

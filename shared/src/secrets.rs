//! AWS Secrets Manager integration.

use aws_sdk_secretsmanager::Client as SecretsClient;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{Error, Result};

/// Database credentials stored as a JSON secret.
#[derive(Debug, Deserialize)]
pub struct DatabaseCredentials {
    pub username: String,
    pub password: String,
    pub port: Option<u16>,
}

/// Secrets Manager client that remembers every secret it has fetched.
///
/// A Lambda container lives for many invocations, so one instance is built
/// at cold start and shared through the handler state.
pub struct SecretsCache {
    client: SecretsClient,
    values: RwLock<HashMap<String, String>>,
}

impl SecretsCache {
    pub fn new(client: SecretsClient) -> Self {
        Self {
            client,
            values: RwLock::new(HashMap::new()),
        }
    }

    /// Get a secret string, fetching it on first use.
    pub async fn get(&self, secret_arn: &str) -> Result<String> {
        if let Some(value) = self.values.read().await.get(secret_arn) {
            return Ok(value.clone());
        }

        let response = self
            .client
            .get_secret_value()
            .secret_id(secret_arn)
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to get secret: {}", e)))?;

        let value = response
            .secret_string()
            .ok_or_else(|| Error::Aws("Secret has no string value".to_string()))?
            .to_string();

        self.values
            .write()
            .await
            .insert(secret_arn.to_string(), value.clone());

        Ok(value)
    }

    /// Get and parse database credentials.
    pub async fn database_credentials(&self, secret_arn: &str) -> Result<DatabaseCredentials> {
        let raw = self.get(secret_arn).await?;
        parse_database_credentials(&raw)
    }
}

fn parse_database_credentials(raw: &str) -> Result<DatabaseCredentials> {
    Ok(serde_json::from_str(raw)?)
}

use crate::payments::providers::ProviderProfile;
use crate::payments::signature::{
    DigestCredentials, ProviderCredentials, SignatureVerifier, StaticCredentials,
};
use crate::payments::types::Provider;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub linkqu: LinkQuConfig,
    pub pakailink: PakaiLinkConfig,
    pub telegram: TelegramConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone, Deserialize)]
pub struct LinkQuConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for LinkQuConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkQuConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct PakaiLinkConfig {
    pub client_secret: String,
    /// PEM public key used for asymmetric signature verification
    pub rsa_public_key_path: Option<String>,
    pub require_signature: bool,
}

impl std::fmt::Debug for PakaiLinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PakaiLinkConfig")
            .field("client_secret", &"<redacted>")
            .field("rsa_public_key_path", &self.rsa_public_key_path)
            .field("require_signature", &self.require_signature)
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct TelegramConfig {
    pub token: Option<String>,
    pub chat_id: Option<String>,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl TelegramConfig {
    /// Token and chat id, when both are set
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.token.as_deref(), self.chat_id.as_deref()) {
            (Some(token), Some(chat_id)) => Some((token, chat_id)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub callback_timeout_secs: u64,
    pub notify_timeout_secs: u64,
}

impl HttpConfig {
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| var(key).with_context(|| format!("{} not set", key));

        let server = ServerConfig {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: var("WEBHOOK_PORT")
                .unwrap_or_else(|| "8081".to_string())
                .parse()
                .context("WEBHOOK_PORT must be a valid number")?,
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
        };

        let database = DatabaseConfig {
            url: required("DATABASE_URL")?,
            max_connections: var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|| "20".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid number")?,
        };

        let linkqu = LinkQuConfig {
            client_id: required("LINKQU_CLIENT_ID")?,
            client_secret: required("LINKQU_CLIENT_SECRET")?,
        };

        let pakailink = PakaiLinkConfig {
            client_secret: var("PAKAILINK_CLIENT_SECRET").unwrap_or_default(),
            rsa_public_key_path: var("PAKAILINK_RSA_PUBLIC_KEY_PATH"),
            require_signature: match var("PAKAILINK_REQUIRE_SIGNATURE") {
                Some(value) => parse_bool(&value)
                    .context("PAKAILINK_REQUIRE_SIGNATURE must be true or false")?,
                None => false,
            },
        };

        let telegram = TelegramConfig {
            token: var("TELEGRAM_TOKEN"),
            chat_id: var("TELEGRAM_CHAT_ID"),
        };

        let http = HttpConfig {
            callback_timeout_secs: var("CALLBACK_TIMEOUT_SECS")
                .unwrap_or_else(|| "30".to_string())
                .parse()
                .context("CALLBACK_TIMEOUT_SECS must be a valid number")?,
            notify_timeout_secs: var("NOTIFY_TIMEOUT_SECS")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .context("NOTIFY_TIMEOUT_SECS must be a valid number")?,
        };

        let config = Config {
            server,
            database,
            linkqu,
            pakailink,
            telegram,
            http,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Validate port range
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if self.database.url.trim().is_empty() {
            return Err(anyhow!("DATABASE_URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        if self.pakailink.require_signature
            && self.pakailink.client_secret.trim().is_empty()
            && self.pakailink.rsa_public_key_path.is_none()
        {
            return Err(anyhow!(
                "PAKAILINK_REQUIRE_SIGNATURE needs PAKAILINK_CLIENT_SECRET or PAKAILINK_RSA_PUBLIC_KEY_PATH"
            ));
        }

        if self.http.callback_timeout_secs == 0 || self.http.notify_timeout_secs == 0 {
            return Err(anyhow!("HTTP timeouts must be greater than 0"));
        }

        Ok(())
    }

    pub fn provider_profile(&self, provider: Provider) -> ProviderProfile {
        match provider {
            Provider::LinkQu => ProviderProfile::linkqu(),
            Provider::PakaiLink => ProviderProfile::pakailink(self.pakailink.require_signature),
        }
    }

    /// Build the signature verifier, loading the PakaiLink public key if one
    /// is configured
    pub fn signature_verifier(&self) -> Result<SignatureVerifier> {
        let linkqu = StaticCredentials::new(&self.linkqu.client_id, &self.linkqu.client_secret);

        let pakailink = match &self.pakailink.rsa_public_key_path {
            Some(path) => {
                let pem = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read PakaiLink public key at {}", path))?;
                DigestCredentials::from_pem(&self.pakailink.client_secret, &pem)
                    .with_context(|| format!("Failed to parse PakaiLink public key at {}", path))?
            }
            None => DigestCredentials::symmetric(&self.pakailink.client_secret),
        };

        Ok(SignatureVerifier::new()
            .with_credentials(Provider::LinkQu, ProviderCredentials::Static(linkqu))
            .with_credentials(Provider::PakaiLink, ProviderCredentials::Digest(pakailink)))
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(anyhow!("invalid boolean '{}'", other)),
    }
}

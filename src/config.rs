use anyhow::{bail, Context};
use clap::ValueEnum;
use sqlx::postgres::PgConnectOptions;

pub const DEFAULT_TABLE: &str = "demo_schema.customer_purchase_behavior";
pub const ROW_LIMIT: u32 = 5000;
pub const USER_TOKEN_HEADER: &str = "X-Forwarded-Access-Token";

/// Username sent alongside a forwarded bearer token.
const TOKEN_USER: &str = "token";

#[derive(Clone, PartialEq, Eq)]
pub struct ServicePrincipal {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ServicePrincipal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePrincipal")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Where and what to query. Built once at startup and passed to the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseConfig {
    pub host: String,
    pub port: u16,
    pub warehouse_id: String,
    pub table: String,
    pub row_limit: u32,
    pub service_principal: Option<ServicePrincipal>,
}

impl WarehouseConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let warehouse_id = get("WAREHOUSE_ID").context(
            "WAREHOUSE_ID environment variable is not set; configure it before starting",
        )?;
        let host = get("WAREHOUSE_HOST").unwrap_or_else(|| "localhost".to_string());
        let port = match get("WAREHOUSE_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("WAREHOUSE_PORT is not a valid port: {raw}"))?,
            None => 5432,
        };
        let table = get("WAREHOUSE_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string());
        validate_table_name(&table)?;

        let service_principal = match (get("WAREHOUSE_CLIENT_ID"), get("WAREHOUSE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(ServicePrincipal {
                client_id,
                client_secret,
            }),
            (None, None) => None,
            _ => bail!("WAREHOUSE_CLIENT_ID and WAREHOUSE_CLIENT_SECRET must be set together"),
        };

        Ok(Self {
            host,
            port,
            warehouse_id,
            table,
            row_limit: ROW_LIMIT,
            service_principal,
        })
    }

    /// The single statement the dashboard runs.
    pub fn query(&self) -> String {
        format!("SELECT * FROM {} LIMIT {}", self.table, self.row_limit)
    }

    pub fn connect_options(&self, credentials: &Credentials) -> PgConnectOptions {
        let (username, password) = match credentials {
            Credentials::ServicePrincipal(principal) => {
                (principal.client_id.as_str(), principal.client_secret.as_str())
            }
            Credentials::UserToken(token) => (TOKEN_USER, token.as_str()),
        };

        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.warehouse_id)
            .username(username)
            .password(password)
            .application_name("purchase-analytics")
    }

    /// Resolves the credentials for one load in the given mode.
    pub fn credentials(&self, mode: AuthMode, user_token: Option<&str>) -> anyhow::Result<Credentials> {
        match mode {
            AuthMode::ServicePrincipal => self
                .service_principal
                .clone()
                .map(Credentials::ServicePrincipal)
                .context("service principal credentials are not configured"),
            AuthMode::UserToken => match user_token.map(str::trim) {
                Some(token) if !token.is_empty() => Ok(Credentials::UserToken(token.to_string())),
                _ => bail!("User access token is missing."),
            },
        }
    }
}

fn validate_table_name(table: &str) -> anyhow::Result<()> {
    let valid = !table.is_empty()
        && !table.starts_with('.')
        && !table.ends_with('.')
        && table
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.');
    if !valid {
        bail!("WAREHOUSE_TABLE must be a dotted identifier, got {table:?}");
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuthMode {
    /// Query on behalf of the user with a forwarded access token
    UserToken,
    /// Query with the app's own service principal
    ServicePrincipal,
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    ServicePrincipal(ServicePrincipal),
    UserToken(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::ServicePrincipal(principal) => std::fmt::Debug::fmt(principal, f),
            Credentials::UserToken(_) => f.write_str("UserToken(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<WarehouseConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WarehouseConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn missing_warehouse_id_is_fatal() {
        let err = config_from(&[("WAREHOUSE_HOST", "wh.example.com")]).unwrap_err();
        assert!(err.to_string().contains("WAREHOUSE_ID"));
    }

    #[test]
    fn defaults_fill_optional_settings() {
        let config = config_from(&[("WAREHOUSE_ID", "abc123")]).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.table, DEFAULT_TABLE);
        assert_eq!(config.service_principal, None);
        assert_eq!(
            config.query(),
            "SELECT * FROM demo_schema.customer_purchase_behavior LIMIT 5000"
        );
    }

    #[test]
    fn rejects_suspicious_table_names() {
        assert!(config_from(&[("WAREHOUSE_ID", "a"), ("WAREHOUSE_TABLE", "t; DROP TABLE x")]).is_err());
        assert!(config_from(&[("WAREHOUSE_ID", "a"), ("WAREHOUSE_TABLE", "sales.orders_2024")]).is_ok());
    }

    #[test]
    fn client_id_without_secret_is_rejected() {
        let err = config_from(&[("WAREHOUSE_ID", "a"), ("WAREHOUSE_CLIENT_ID", "sp")]).unwrap_err();
        assert!(err.to_string().contains("together"));
    }

    #[test]
    fn bad_port_is_reported() {
        assert!(config_from(&[("WAREHOUSE_ID", "a"), ("WAREHOUSE_PORT", "http")]).is_err());
    }

    #[test]
    fn user_token_mode_requires_a_token() {
        let config = config_from(&[("WAREHOUSE_ID", "a")]).unwrap();
        let err = config.credentials(AuthMode::UserToken, Some("  ")).unwrap_err();
        assert_eq!(err.to_string(), "User access token is missing.");
        assert_eq!(
            config.credentials(AuthMode::UserToken, Some("dapi123")).unwrap(),
            Credentials::UserToken("dapi123".to_string())
        );
    }

    #[test]
    fn service_principal_mode_uses_configured_pair() {
        let config = config_from(&[
            ("WAREHOUSE_ID", "a"),
            ("WAREHOUSE_CLIENT_ID", "sp-id"),
            ("WAREHOUSE_CLIENT_SECRET", "sp-secret"),
        ])
        .unwrap();
        let credentials = config.credentials(AuthMode::ServicePrincipal, None).unwrap();
        assert!(matches!(credentials, Credentials::ServicePrincipal(ref p) if p.client_id == "sp-id"));
        assert!(!format!("{credentials:?}").contains("sp-secret"));
    }

    #[test]
    fn debug_output_never_shows_the_client_secret() {
        let config = config_from(&[
            ("WAREHOUSE_ID", "a"),
            ("WAREHOUSE_CLIENT_ID", "sp-id"),
            ("WAREHOUSE_CLIENT_SECRET", "sp-secret"),
        ])
        .unwrap();
        let rendered = format!("{config:?}");
        assert!(rendered.contains("sp-id"));
        assert!(!rendered.contains("sp-secret"));
    }
}

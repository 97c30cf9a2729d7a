//! Connection configuration.
use std::{path::PathBuf, time::Duration};

use crate::protocol::ClientProtocolVersion;

/// TLS verification mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Verify the certificate chain against the trust roots.
    VerifyCa,
    /// Chain verification plus hostname match.
    VerifyFull,
}

const SERVERLESS_DOMAINS: [&str; 2] =
    ["redshift-serverless.amazonaws.com", "redshift-serverless-dev.amazonaws.com"];

/// Connection options the engine consumes.
///
/// Credential acquisition (IAM/IdP plugins) happens outside the engine;
/// what lands here is the resolved user, password or web identity token.
#[derive(Debug, Clone)]
pub struct Config {
    /// The host to connect to.
    pub host: String,
    /// The port to connect to.
    pub port: u16,
    /// The user name for authentication. Required unless native
    /// identity-provider auth carries it in the token.
    pub user: String,
    /// The password for password-based authentication flows.
    pub password: Option<String>,
    /// The database to connect to.
    pub database: String,
    /// Reported application name.
    pub application_name: Option<String>,
    /// Streaming replication mode.
    pub replication: Option<String>,
    /// Whether to negotiate TLS before startup.
    pub ssl: bool,
    /// TLS verification mode.
    pub ssl_mode: TlsMode,
    /// An additional CA bundle for chain verification.
    pub ca_file: Option<PathBuf>,
    /// Socket read/write timeout. `None` means no timeout.
    pub timeout: Option<Duration>,
    /// Bound of the per-paramstyle prepared statement cache.
    pub max_prepared_statements: usize,
    /// The requested transfer protocol.
    pub client_protocol_version: ClientProtocolVersion,
    /// Class path of the credential-provider plugin, reported to the
    /// server as `plugin_name`.
    pub credentials_provider: Option<String>,
    /// Native auth provider name.
    pub provider_name: Option<String>,
    /// Web identity token for native identity-provider integration.
    pub web_identity_token: Option<String>,
}

impl Config {
    /// Config for `user` against `database` with library defaults: port
    /// 5439, TLS on with `verify-ca`, extended result metadata, a
    /// thousand cached statements.
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: "localhost".into(),
            port: 5439,
            user: user.into(),
            password: Some(password.into()),
            database: database.into(),
            application_name: None,
            replication: None,
            ssl: true,
            ssl_mode: TlsMode::VerifyCa,
            ca_file: None,
            timeout: None,
            max_prepared_statements: 1000,
            client_protocol_version: ClientProtocolVersion::ExtendedResultMetadata,
            credentials_provider: None,
            provider_name: None,
            web_identity_token: None,
        }
    }

    /// Whether `host` is a serverless endpoint,
    /// `<account>.<region>.redshift-serverless(-dev)?.amazonaws.com`.
    pub fn is_serverless_host(&self) -> bool {
        self.serverless_parts().is_some()
    }

    /// The account id parsed from a serverless endpoint.
    pub fn account_id_from_host(&self) -> Option<&str> {
        self.serverless_parts().map(|(account, _)| account)
    }

    /// The region parsed from a serverless endpoint.
    pub fn region_from_host(&self) -> Option<&str> {
        self.serverless_parts().map(|(_, region)| region)
    }

    fn serverless_parts(&self) -> Option<(&str, &str)> {
        let rest = SERVERLESS_DOMAINS
            .iter()
            .find_map(|domain| self.host.strip_suffix(domain))?
            .strip_suffix('.')?;
        // everything before the region label belongs to the account id
        let (account, region) = rest.rsplit_once('.')?;
        (!account.is_empty() && !region.is_empty()).then_some((account, region))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn with_host(host: &str) -> Config {
        let mut config = Config::new("u", "p", "db");
        config.host = host.into();
        config
    }

    #[test]
    fn serverless_endpoint_parsing() {
        let config = with_host("acct.us-east-1.redshift-serverless.amazonaws.com");
        assert!(config.is_serverless_host());
        assert_eq!(config.account_id_from_host(), Some("acct"));
        assert_eq!(config.region_from_host(), Some("us-east-1"));
    }

    #[test]
    fn serverless_dev_endpoint_parsing() {
        let config = with_host("012345.eu-west-2.redshift-serverless-dev.amazonaws.com");
        assert!(config.is_serverless_host());
        assert_eq!(config.account_id_from_host(), Some("012345"));
        assert_eq!(config.region_from_host(), Some("eu-west-2"));
    }

    #[test]
    fn provisioned_host_is_not_serverless() {
        let config = with_host("cluster.abc123.us-east-1.redshift.amazonaws.com");
        assert!(!config.is_serverless_host());
        assert_eq!(config.account_id_from_host(), None);
    }
}

//! Connection configuration: protocol selection, credentials, TLS and SSH
//! nodes, and the validation rules that keep incompatible combinations out
//! of the pipeline.

use std::path::PathBuf;

use serde::Deserialize;

use crate::config::de_opt_scalar_string;
use crate::error::user_error;

/// Connection protocol.
///
/// `mongodb+srv` and custom URIs are passed to mongoexport as a single
/// `--uri` argument; the standard protocol uses discrete `--host`/`--port`
/// flags because `--uri` misbehaves against some servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Protocol {
    #[default]
    #[serde(rename = "mongodb")]
    MongoDb,
    #[serde(rename = "mongodb+srv")]
    MongoDbSrv,
    #[serde(rename = "custom_uri")]
    CustomUri,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    #[serde(default)]
    pub protocol: Protocol,

    /// Full connection URI, `custom_uri` protocol only.
    #[serde(default)]
    pub uri: Option<String>,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default, deserialize_with = "de_opt_scalar_string")]
    pub port: Option<String>,

    #[serde(default)]
    pub database: Option<String>,

    #[serde(default, rename = "authenticationDatabase")]
    pub authentication_database: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Encrypted-at-rest variant of `password`; wins only when `password`
    /// itself is absent.
    #[serde(default, rename = "#password")]
    protected_password: Option<String>,

    #[serde(default)]
    pub ssl: Option<TlsConfig>,

    #[serde(default)]
    pub ssh: Option<SshConfig>,
}

impl DbConfig {
    /// Check protocol-conditional requirements and resolve the password.
    /// Rewrites the node in place: srv drops any configured port, and SSH
    /// redirects host/port to the local end of the tunnel.
    pub fn validate(&mut self) -> anyhow::Result<()> {
        if self.password.is_none() {
            self.password = self.protected_password.take();
        }

        match self.protocol {
            Protocol::CustomUri => {
                if self.uri.is_none() {
                    return Err(user_error(
                        "The child node \"uri\" at path \"parameters.db\" must be configured.",
                    ));
                }
                if self.ssh_enabled() {
                    return Err(user_error(
                        "Custom URI is not compatible with SSH tunnel support.",
                    ));
                }
                for (key, present) in [
                    ("host", self.host.is_some()),
                    ("port", self.port.is_some()),
                    ("database", self.database.is_some()),
                    ("authenticationDatabase", self.authentication_database.is_some()),
                ] {
                    if present {
                        return Err(user_error(format!(
                            "Configuration node \"db.{key}\" is not compatible with custom URI."
                        )));
                    }
                }
            }
            Protocol::MongoDb | Protocol::MongoDbSrv => {
                if self.host.is_none() {
                    return Err(user_error(
                        "The child node \"host\" at path \"parameters.db\" must be configured.",
                    ));
                }
                if self.database.is_none() {
                    return Err(user_error(
                        "The child node \"database\" at path \"parameters.db\" must be configured.",
                    ));
                }
                if self.user.is_some() != self.password.is_some() {
                    return Err(user_error(
                        "When passing authentication details, \
                         both \"user\" and \"password\" params are required",
                    ));
                }
                if self.protocol == Protocol::MongoDbSrv {
                    // A DNS seed-list URI must not carry a port number.
                    self.port = None;
                }
            }
        }

        if self.ssh_enabled() {
            // The tunnel's local end replaces the configured endpoint; the
            // tunnel itself is set up outside this pipeline.
            let local_port = self
                .ssh
                .as_ref()
                .and_then(|ssh| ssh.local_port.clone())
                .ok_or_else(|| user_error("SSH tunnel requires \"localPort\" to be configured."))?;
            self.host = Some("127.0.0.1".to_string());
            self.port = Some(local_port);
        }

        Ok(())
    }

    pub fn ssh_enabled(&self) -> bool {
        self.ssh.as_ref().is_some_and(|ssh| ssh.enabled)
    }

    pub fn tls_enabled(&self) -> bool {
        self.ssl.as_ref().is_some_and(|ssl| ssl.enabled)
    }
}

/// TLS node. The `ca`/`cert`/`key` fields hold PEM material inline; it is
/// staged to temp files before command construction and the resulting paths
/// land in `ca_file`/`cert_key_file`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub ca: Option<String>,

    #[serde(default)]
    pub cert: Option<String>,

    #[serde(default, rename = "#key")]
    pub key: Option<String>,

    #[serde(skip)]
    pub ca_file: Option<PathBuf>,

    #[serde(skip)]
    pub cert_key_file: Option<PathBuf>,
}

/// SSH tunnel node. Parsed and validated here; tunnel creation is an
/// external collaborator's job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SshConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub keys: Option<SshKeys>,

    #[serde(default, rename = "sshHost")]
    pub ssh_host: Option<String>,

    #[serde(default, rename = "sshPort", deserialize_with = "de_opt_scalar_string")]
    pub ssh_port: Option<String>,

    #[serde(default, rename = "remoteHost")]
    pub remote_host: Option<String>,

    #[serde(default, rename = "remotePort", deserialize_with = "de_opt_scalar_string")]
    pub remote_port: Option<String>,

    #[serde(default, rename = "localPort", deserialize_with = "de_opt_scalar_string")]
    pub local_port: Option<String>,

    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SshKeys {
    #[serde(default)]
    pub public: Option<String>,

    #[serde(default)]
    pub private: Option<String>,

    #[serde(default, rename = "#private")]
    pub protected_private: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn db(value: serde_json::Value) -> DbConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_standard_protocol_defaults() {
        let mut config = db(json!({"host": "localhost", "port": 27017, "database": "test"}));
        config.validate().unwrap();
        assert_eq!(config.protocol, Protocol::MongoDb);
        assert_eq!(config.port.as_deref(), Some("27017"));
    }

    #[test]
    fn test_srv_drops_port() {
        let mut config = db(json!({
            "protocol": "mongodb+srv",
            "host": "cluster0.mongodb.net",
            "port": 27017,
            "database": "test",
        }));
        config.validate().unwrap();
        assert_eq!(config.port, None);
    }

    #[test]
    fn test_missing_host_rejected() {
        let mut config = db(json!({"database": "test"}));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("\"host\""));
    }

    #[test]
    fn test_missing_database_rejected() {
        let mut config = db(json!({"host": "localhost", "port": 27017}));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("\"database\""));
    }

    #[test]
    fn test_user_without_password_rejected() {
        let mut config = db(json!({
            "host": "localhost", "port": 27017, "database": "test", "user": "admin",
        }));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("both \"user\" and \"password\""));
    }

    #[test]
    fn test_protected_password_resolves() {
        let mut config = db(json!({
            "host": "localhost", "port": 27017, "database": "test",
            "user": "admin", "#password": "secret",
        }));
        config.validate().unwrap();
        assert_eq!(config.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_custom_uri_requires_uri() {
        let mut config = db(json!({"protocol": "custom_uri"}));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("\"uri\""));
    }

    #[test]
    fn test_custom_uri_incompatible_with_host() {
        let mut config = db(json!({
            "protocol": "custom_uri",
            "uri": "mongodb://user@localhost/test",
            "host": "localhost",
        }));
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration node \"db.host\" is not compatible with custom URI."
        );
    }

    #[test]
    fn test_custom_uri_incompatible_with_ssh() {
        let mut config = db(json!({
            "protocol": "custom_uri",
            "uri": "mongodb://user@localhost/test",
            "ssh": {"enabled": true, "localPort": 33006},
        }));
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Custom URI is not compatible with SSH tunnel support."
        );
    }

    #[test]
    fn test_ssh_rewrites_endpoint_to_local_tunnel() {
        let mut config = db(json!({
            "host": "mongodb.internal", "port": 27017, "database": "test",
            "ssh": {"enabled": true, "sshHost": "bastion", "localPort": "33006"},
        }));
        config.validate().unwrap();
        assert_eq!(config.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(config.port.as_deref(), Some("33006"));
    }
}

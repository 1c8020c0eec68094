//! Connection settings for the MQTT 3.1.1 broker the agent worker connects to.

use std::env::{self, VarError};
use std::time::Duration;

use derive_builder::Builder;

/// All the settings required to establish an MQTT 3.1.1 connection.
///
/// Transport security (TLS, certificates) and SAT-based reauthentication are out of scope here:
/// they belong to whatever wraps the [`crate::interface::ProtocolEngine`] the agent is built
/// with, not to the connection parameters the dispatch core itself cares about.
#[derive(Builder, Clone, Debug)]
#[builder(pattern = "owned", setter(into), build_fn(validate = "Self::validate"))]
pub struct AgentConnectionSettings {
    /// Client identifier presented in the CONNECT packet.
    pub(crate) client_id: String,
    /// FQDN or IP address of the broker to connect to.
    pub(crate) hostname: String,
    /// TCP port to connect to the broker on.
    #[builder(default = "1883")]
    pub(crate) tcp_port: u16,
    /// Max time between communications before the connection is considered dead.
    #[builder(default = "Duration::from_secs(60)")]
    pub(crate) keep_alive: Duration,
    /// Time to wait for the broker to accept a TCP connection before giving up.
    #[builder(default = "Duration::from_secs(30)")]
    pub(crate) connection_timeout: Duration,
    /// Whether the broker should discard any existing session for this client identifier.
    #[builder(default = "true")]
    pub(crate) clean_session: bool,
    /// Username for the CONNECT packet.
    #[builder(default = "None")]
    pub(crate) username: Option<String>,
    /// Password for the CONNECT packet.
    #[builder(default = "None")]
    pub(crate) password: Option<String>,
}

impl AgentConnectionSettingsBuilder {
    /// Initialize the builder from environment variables.
    ///
    /// # Errors
    /// Returns a `String` describing the error if an environment variable is set but cannot be
    /// parsed into the expected type.
    pub fn from_environment() -> Result<Self, String> {
        let client_id = string_from_environment("MQTT_AGENT_CLIENT_ID")?;
        let hostname = string_from_environment("MQTT_AGENT_BROKER_HOSTNAME")?;
        let tcp_port = string_from_environment("MQTT_AGENT_BROKER_TCP_PORT")?
            .map(|v| v.parse::<u16>())
            .transpose()
            .map_err(|e| format!("MQTT_AGENT_BROKER_TCP_PORT: {e}"))?;
        let keep_alive = string_from_environment("MQTT_AGENT_KEEP_ALIVE")?
            .map(|v| v.parse::<u32>().map(u64::from).map(Duration::from_secs))
            .transpose()
            .map_err(|e| format!("MQTT_AGENT_KEEP_ALIVE: {e}"))?;
        let clean_session = string_from_environment("MQTT_AGENT_CLEAN_SESSION")?
            .map(|v| v.parse::<bool>())
            .transpose()
            .map_err(|e| format!("MQTT_AGENT_CLEAN_SESSION: {e}"))?;
        let username = Some(string_from_environment("MQTT_AGENT_USERNAME")?);

        // NOTE: Do not error on missing required values. It is valid for these to be filled in
        // later via the builder, and .validate() will report a clear error at build time.
        if client_id.is_none() {
            log::warn!("MQTT_AGENT_CLIENT_ID is not set in environment");
        }
        if hostname.is_none() {
            log::warn!("MQTT_AGENT_BROKER_HOSTNAME is not set in environment");
        }

        Ok(Self {
            client_id,
            hostname,
            tcp_port,
            keep_alive,
            connection_timeout: Some(Duration::from_secs(30)),
            clean_session,
            username,
            password: None,
        })
    }

    /// Validate the settings.
    ///
    /// # Errors
    /// Returns a `String` describing the error if `hostname` is empty, or if `client_id` is
    /// empty while `clean_session` is `false`.
    fn validate(&self) -> Result<(), String> {
        if let Some(hostname) = &self.hostname {
            if hostname.is_empty() {
                return Err("hostname cannot be empty".to_string());
            }
        }
        if let Some(client_id) = &self.client_id {
            if client_id.is_empty() {
                let clean_session = self.clean_session.unwrap_or(true);
                if !clean_session {
                    return Err(
                        "client_id is mandatory when clean_session is set to false".to_string()
                    );
                }
            }
        }
        Ok(())
    }
}

fn string_from_environment(key: &str) -> Result<Option<String>, String> {
    match env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => {
            Err("could not parse non-unicode environment variable".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimum_configuration() {
        let result = AgentConnectionSettingsBuilder::default()
            .client_id("test-client")
            .hostname("test-host")
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn empty_hostname_rejected() {
        let result = AgentConnectionSettingsBuilder::default()
            .client_id("test-client")
            .hostname("")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn empty_client_id_requires_clean_session() {
        let result = AgentConnectionSettingsBuilder::default()
            .client_id("")
            .hostname("test-host")
            .clean_session(false)
            .build();
        assert!(result.is_err());

        let result = AgentConnectionSettingsBuilder::default()
            .client_id("")
            .hostname("test-host")
            .clean_session(true)
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn from_environment_minimal() {
        temp_env::with_vars(
            [
                ("MQTT_AGENT_CLIENT_ID", Some("test-client")),
                ("MQTT_AGENT_BROKER_HOSTNAME", Some("test.hostname.com")),
            ],
            || {
                let builder = AgentConnectionSettingsBuilder::from_environment().unwrap();
                assert_eq!(builder.client_id, Some("test-client".to_string()));
                assert_eq!(builder.hostname, Some("test.hostname.com".to_string()));
                assert!(builder.build().is_ok());
            },
        );
    }
}

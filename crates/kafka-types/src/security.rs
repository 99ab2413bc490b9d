//! Transport and registry security settings.
//!
//! The pipeline never reads key material itself. A [`CredentialProvider`]
//! supplied by the host turns whatever secret source it uses into
//! [`SecuritySettings`], which the Kafka clients translate into client
//! properties.

use std::fmt;

use crate::error::{Error, Result};

/// SASL authentication settings.
#[derive(Clone, Default, PartialEq)]
pub struct SaslSettings {
    /// e.g. `GSSAPI`, `PLAIN`, `SCRAM-SHA-512`
    pub mechanism: String,
    pub kerberos_service_name: Option<String>,
    pub kerberos_keytab: Option<String>,
    pub kerberos_principal: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl SaslSettings {
    /// Take credentials from a Java JAAS login line such as
    /// `PlainLoginModule required username="app" password="secret";`.
    ///
    /// librdkafka has no `sasl.jaas.config`, so the recognised options
    /// (`username`, `password`, `serviceName`, `keyTab`, `principal`) are
    /// moved onto the native properties. Fields that are already set win;
    /// other options are ignored.
    pub fn merge_jaas_config(&mut self, jaas: &str) -> Result<()> {
        for (key, value) in jaas_options(jaas)? {
            let slot = match key.as_str() {
                "username" => &mut self.username,
                "password" => &mut self.password,
                "serviceName" => &mut self.kerberos_service_name,
                "keyTab" => &mut self.kerberos_keytab,
                "principal" => &mut self.kerberos_principal,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        Ok(())
    }
}

/// `key=value` options of a JAAS login line, after the login module and
/// its control flag.
fn jaas_options(jaas: &str) -> Result<Vec<(String, String)>> {
    let mut tokens = Vec::new();
    let mut token = String::new();
    let mut quoted = false;
    for c in jaas.chars() {
        match c {
            '"' => quoted = !quoted,
            c if !quoted && (c.is_whitespace() || c == ';') => {
                if !token.is_empty() {
                    tokens.push(std::mem::take(&mut token));
                }
            }
            c => token.push(c),
        }
    }
    if quoted {
        return Err(Error::InvalidConfig(
            "unterminated quote in JAAS config".to_string(),
        ));
    }
    if !token.is_empty() {
        tokens.push(token);
    }
    if tokens.len() < 2 {
        return Err(Error::InvalidConfig(
            "JAAS config needs a login module and a control flag".to_string(),
        ));
    }

    tokens
        .into_iter()
        .skip(2)
        .map(|option| match option.split_once('=') {
            Some((key, value)) => Ok((key.to_string(), value.to_string())),
            None => Err(Error::InvalidConfig(format!(
                "JAAS option '{option}' is not key=value"
            ))),
        })
        .collect()
}

/// TLS material locations and passwords.
#[derive(Clone, Default, PartialEq)]
pub struct TlsSettings {
    pub keystore_location: Option<String>,
    pub keystore_password: Option<String>,
    pub key_password: Option<String>,
    /// CA bundle (PEM) used to verify the brokers.
    pub truststore_location: Option<String>,
    /// Empty string disables hostname verification.
    pub endpoint_identification_algorithm: Option<String>,
}

/// Everything needed to authenticate against the brokers and the registry.
#[derive(Clone, Default, PartialEq)]
pub struct SecuritySettings {
    /// e.g. `PLAINTEXT`, `SSL`, `SASL_PLAINTEXT`, `SASL_SSL`
    pub protocol: Option<String>,
    pub sasl: Option<SaslSettings>,
    pub tls: Option<TlsSettings>,
    /// `user:password` for registry basic auth.
    pub registry_basic_auth: Option<String>,
}

impl SecuritySettings {
    /// Kafka client properties for these settings.
    ///
    /// Unset values are left out so the client's own defaults apply.
    pub fn client_properties(&self) -> Vec<(&'static str, String)> {
        let mut props = Vec::new();
        let mut set = |key: &'static str, value: &Option<String>| {
            if let Some(value) = value {
                props.push((key, value.clone()));
            }
        };

        set("security.protocol", &self.protocol);

        if let Some(sasl) = &self.sasl {
            set("sasl.mechanism", &Some(sasl.mechanism.clone()));
            set("sasl.kerberos.service.name", &sasl.kerberos_service_name);
            set("sasl.kerberos.keytab", &sasl.kerberos_keytab);
            set("sasl.kerberos.principal", &sasl.kerberos_principal);
            set("sasl.username", &sasl.username);
            set("sasl.password", &sasl.password);
        }

        if let Some(tls) = &self.tls {
            set("ssl.keystore.location", &tls.keystore_location);
            set("ssl.keystore.password", &tls.keystore_password);
            set("ssl.key.password", &tls.key_password);
            set("ssl.ca.location", &tls.truststore_location);
            set(
                "ssl.endpoint.identification.algorithm",
                &tls.endpoint_identification_algorithm
                    .as_ref()
                    .map(|a| if a.is_empty() { "none".to_string() } else { a.clone() }),
            );
        }

        props
    }
}

// Passwords never end up in logs.
impl fmt::Debug for SecuritySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecuritySettings")
            .field("protocol", &self.protocol)
            .field("sasl", &self.sasl.as_ref().map(|s| &s.mechanism))
            .field("tls", &self.tls.is_some())
            .field("registry_basic_auth", &self.registry_basic_auth.is_some())
            .finish()
    }
}

impl fmt::Debug for SaslSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslSettings")
            .field("mechanism", &self.mechanism)
            .field("kerberos_principal", &self.kerberos_principal)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSettings")
            .field("keystore_location", &self.keystore_location)
            .field("truststore_location", &self.truststore_location)
            .finish_non_exhaustive()
    }
}

/// Supplies security settings at connection time.
pub trait CredentialProvider: Send + Sync {
    fn security_settings(&self) -> Result<SecuritySettings>;
}

/// Settings known up front.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(pub SecuritySettings);

impl CredentialProvider for StaticCredentials {
    fn security_settings(&self) -> Result<SecuritySettings> {
        Ok(self.0.clone())
    }
}

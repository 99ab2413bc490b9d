//! Secrets from the environment.

use kafka_types::{
    CredentialProvider, Error, Result, SaslSettings, SecuritySettings, TlsSettings,
};

pub const SASL_PASSWORD_ENV: &str = "KAFKA_SASL_PASSWORD";
pub const SASL_JAAS_CONFIG_ENV: &str = "KAFKA_SASL_JAAS_CONFIG";
pub const SSL_KEYSTORE_PASSWORD_ENV: &str = "KAFKA_SSL_KEYSTORE_PASSWORD";
pub const SSL_KEY_PASSWORD_ENV: &str = "KAFKA_SSL_KEY_PASSWORD";
/// `user:password` for the schema registry.
pub const REGISTRY_BASIC_AUTH_ENV: &str = "SCHEMA_REGISTRY_BASIC_AUTH";

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Completes non-secret settings with passwords read from environment variables.
///
/// A secret is only filled in where it applies: the SASL password and JAAS
/// config need a SASL mechanism, the keystore passwords need a keystore.
/// A JAAS config is unpacked into the SASL username and password, since
/// librdkafka cannot take it as is. Empty variables count as unset.
pub struct EnvCredentialProvider {
    base: SecuritySettings,
    lookup: Lookup,
}

impl EnvCredentialProvider {
    pub fn new(base: SecuritySettings) -> Self {
        Self::with_lookup(base, |name| std::env::var(name).ok())
    }

    /// Read variables through `lookup` instead of the process environment.
    pub fn with_lookup<F>(base: SecuritySettings, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            base,
            lookup: Box::new(lookup),
        }
    }

    fn var(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|value| !value.is_empty())
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn security_settings(&self) -> Result<SecuritySettings> {
        let mut settings = self.base.clone();

        if let Some(sasl) = settings.sasl.as_mut() {
            fill_sasl(sasl, self)?;
        } else if self.var(SASL_PASSWORD_ENV).is_some() {
            return Err(Error::InvalidConfig(format!(
                "{SASL_PASSWORD_ENV} is set but no SASL mechanism is configured"
            )));
        }

        if let Some(tls) = settings.tls.as_mut() {
            fill_tls(tls, self);
        }

        if let Some(user_info) = self.var(REGISTRY_BASIC_AUTH_ENV) {
            if !user_info.contains(':') {
                return Err(Error::InvalidConfig(format!(
                    "{REGISTRY_BASIC_AUTH_ENV} must have the form user:password"
                )));
            }
            settings.registry_basic_auth = Some(user_info);
        }

        Ok(settings)
    }
}

fn fill_sasl(sasl: &mut SaslSettings, env: &EnvCredentialProvider) -> Result<()> {
    sasl.password = env.var(SASL_PASSWORD_ENV).or(sasl.password.take());
    if let Some(jaas) = env.var(SASL_JAAS_CONFIG_ENV) {
        sasl.merge_jaas_config(&jaas)?;
    }

    let needs_password = matches!(
        sasl.mechanism.to_ascii_uppercase().as_str(),
        "PLAIN" | "SCRAM-SHA-256" | "SCRAM-SHA-512"
    );
    if needs_password && sasl.password.is_none() {
        return Err(Error::InvalidConfig(format!(
            "SASL mechanism {} needs {SASL_PASSWORD_ENV} or {SASL_JAAS_CONFIG_ENV}",
            sasl.mechanism
        )));
    }
    Ok(())
}

fn fill_tls(tls: &mut TlsSettings, env: &EnvCredentialProvider) {
    if tls.keystore_location.is_some() {
        tls.keystore_password = env
            .var(SSL_KEYSTORE_PASSWORD_ENV)
            .or(tls.keystore_password.take());
        tls.key_password = env.var(SSL_KEY_PASSWORD_ENV).or(tls.key_password.take());
    }
}

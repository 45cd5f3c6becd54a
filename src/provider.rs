// src/provider.rs

use crate::error::NilaSsoError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The identity providers this gateway accepts tokens from.
///
/// The set is closed: adding a provider means adding a variant here, a row in
/// [`ProviderSettings::into_provider_config`](crate::config::ProviderSettings::into_provider_config)
/// and an issuer rule in [`Provider::from_issuer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    Azure,
    Okta,
    Auth0,
}

impl Provider {
    /// Every supported provider, in the order they are reported to clients.
    pub const ALL: [Provider; 3] = [Provider::Azure, Provider::Okta, Provider::Auth0];

    /// Display name, also used as the authentication scheme name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Azure => "Azure",
            Provider::Okta => "Okta",
            Provider::Auth0 => "Auth0",
        }
    }

    /// Classifies an (unverified) issuer string by the provider's domain.
    ///
    /// Returns `None` when the issuer belongs to none of the known providers;
    /// callers decide on the fallback.
    pub fn from_issuer(issuer: &str) -> Option<Provider> {
        if issuer.contains("microsoftonline.com") || issuer.contains("windows.net") {
            Some(Provider::Azure)
        } else if issuer.contains("okta.com") {
            Some(Provider::Okta)
        } else if issuer.contains("auth0.com") {
            Some(Provider::Auth0)
        } else {
            None
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = NilaSsoError;

    /// Case-insensitive; unknown names are a fault, never defaulted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "azure" => Ok(Provider::Azure),
            "okta" => Ok(Provider::Okta),
            "auth0" => Ok(Provider::Auth0),
            _ => Err(NilaSsoError::UnsupportedProvider(s.to_string())),
        }
    }
}

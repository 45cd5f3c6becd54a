// tests/config_test.rs

mod common;

use common::*;
use nila_sso::prelude::*;
use std::fs::File;
use std::io::Write;
use std::time::Duration;
use tempfile::tempdir;
use wiremock::MockServer;

#[tokio::test]
async fn test_gateway_runs_from_a_config_file() {
    // --- 1. SETUP ---
    let server = MockServer::start().await;
    let signer = TestSigner::primary();
    mount_all_jwks(&server, &[&signer]).await;

    let dir = tempdir().unwrap();
    let config_path = dir.path().join("nila-sso.yaml");
    let mut file = File::create(&config_path).unwrap();
    write!(
        file,
        r#"
listen_addr: "127.0.0.1:0"
providers:
  azure:
    tenant_or_issuer: "{tenant}"
    client_id_or_audience: "{client}"
    discovery_base_url: "{uri}"
  auth0:
    tenant_or_issuer: "{auth0}"
    client_id_or_audience: "{audience}"
    jwks_uri: "{uri}{auth0_path}"
key_cache:
  ttl_seconds: 600
  unknown_kid_refresh_seconds: 0
validation:
  leeway_seconds: 30
"#,
        tenant = AZURE_TENANT,
        client = AZURE_CLIENT_ID,
        uri = server.uri(),
        auth0 = AUTH0_DOMAIN,
        audience = AUTH0_AUDIENCE,
        auth0_path = AUTH0_KEYS_PATH,
    )
    .unwrap();

    // --- 2. LOAD ---
    let file_config = GatewayFileConfig::from_file(&config_path).unwrap();
    assert_eq!(file_config.logging.level, "info");

    let config = file_config.to_gateway_config().unwrap();
    assert_eq!(config.key_cache.default_ttl, Duration::from_secs(600));
    assert_eq!(config.validation.leeway, Duration::from_secs(30));
    assert_eq!(
        config.provider(Provider::Azure).unwrap().jwks_uri.as_str(),
        format!("{}{}", server.uri(), AZURE_KEYS_PATH)
    );

    // --- 3. VALIDATE ---
    let validator = TokenValidator::new(config).unwrap();
    let azure = signer.sign(&azure_claims());
    assert!(validator.validate_inferred(&azure).await.unwrap().is_valid());
    let auth0 = signer.sign(&auth0_claims());
    assert!(validator.validate_inferred(&auth0).await.unwrap().is_valid());

    // Okta is not in the file.
    let okta = signer.sign(&okta_claims());
    assert!(matches!(
        validator.validate_inferred(&okta).await,
        Err(NilaSsoError::UnsupportedProvider(_))
    ));
    println!("✅ Gateway configured from YAML validates tokens");
}

#[test]
fn test_missing_config_file_is_reported() {
    let dir = tempdir().unwrap();
    let err = GatewayFileConfig::from_file(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, NilaSsoError::ConfigRead { .. }));
}

#[test]
fn test_broken_yaml_is_reported() {
    let err = GatewayFileConfig::from_yaml_str("providers: [not, a, map").unwrap_err();
    assert!(matches!(err, NilaSsoError::ConfigParse(_)));
}

#[test]
fn test_zero_minimum_ttl_is_rejected() {
    let config = ProviderConfig::new(OKTA_ISSUER, OKTA_AUDIENCE, "https://dev-1.okta.com/oauth2/default/v1/keys").unwrap();
    let result = GatewayConfigBuilder::new()
        .provider(Provider::Okta, config)
        .ttl_bounds(Duration::ZERO, Duration::from_secs(60))
        .build();
    assert!(matches!(result, Err(NilaSsoError::InvalidConfiguration(_))));
}

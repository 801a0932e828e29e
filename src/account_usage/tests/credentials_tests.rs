use super::*;
use chrono::TimeZone;
use serial_test::serial;
use tempfile::TempDir;

fn jwt_with_payload(payload: &str) -> String {
    use base64::Engine;
    let header = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(payload);
    format!("{}.{}.sig", header, payload)
}

#[test]
fn test_extract_email_from_jwt_invalid() {
    assert_eq!(extract_email_from_jwt("not.a.jwt"), None);
    assert_eq!(extract_email_from_jwt("invalid"), None);
}

#[test]
fn test_extract_email_from_jwt_valid() {
    let token = jwt_with_payload(r#"{"email":"test@example.com"}"#);
    assert_eq!(
        extract_email_from_jwt(&token),
        Some("test@example.com".to_string())
    );
}

#[test]
fn test_extract_email_from_openai_profile_claim() {
    let token =
        jwt_with_payload(r#"{"https://api.openai.com/profile":{"email":"dev@example.com"}}"#);
    assert_eq!(
        extract_email_from_jwt(&token),
        Some("dev@example.com".to_string())
    );
}

#[test]
fn test_claude_expiry_is_milliseconds() {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let creds = |expires_at| ProviderCredentials::Claude {
        access_token: "t".to_string(),
        expires_at,
    };

    assert!(creds(Some(now.timestamp_millis() - 1)).is_expired(now));
    assert!(!creds(Some(now.timestamp_millis() + 60_000)).is_expired(now));
    assert!(!creds(None).is_expired(now));
}

#[test]
#[serial]
fn test_read_claude_credentials_from_config_dir() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join(".credentials.json"),
        r#"{"claudeAiOauth":{"accessToken":"sk-test","expiresAt":1704067200000}}"#,
    )
    .unwrap();
    std::env::set_var("CLAUDE_CONFIG_DIR", temp_dir.path());

    let creds = read_claude_credentials();
    std::env::remove_var("CLAUDE_CONFIG_DIR");

    assert_eq!(
        creds.unwrap(),
        Some(ProviderCredentials::Claude {
            access_token: "sk-test".to_string(),
            expires_at: Some(1_704_067_200_000),
        })
    );
}

#[test]
#[serial]
fn test_read_claude_credentials_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    std::env::set_var("CLAUDE_CONFIG_DIR", temp_dir.path());

    let creds = read_claude_credentials();
    std::env::remove_var("CLAUDE_CONFIG_DIR");

    assert_eq!(creds.unwrap(), None);
}

#[test]
#[serial]
fn test_read_codex_credentials_without_account_id() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("auth.json"),
        r#"{"tokens":{"access_token":"a.b.c"}}"#,
    )
    .unwrap();
    std::env::set_var("CODEX_HOME", temp_dir.path());

    let creds = read_codex_credentials();
    std::env::remove_var("CODEX_HOME");

    let creds = creds.unwrap().unwrap();
    assert_eq!(creds.access_token(), "a.b.c");
    assert!(matches!(
        creds,
        ProviderCredentials::Codex {
            account_id: None,
            ..
        }
    ));
}

#[test]
#[serial]
fn test_read_codex_credentials_malformed_json() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("auth.json"), "{not json").unwrap();
    std::env::set_var("CODEX_HOME", temp_dir.path());

    let creds = read_codex_credentials();
    std::env::remove_var("CODEX_HOME");

    assert!(creds.is_err());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
#[serial_test::serial]
fn env_oauth_token_wins() {
    let saved = Saved::capture();
    std::env::set_var("CLAUDE_CODE_OAUTH_TOKEN", "oauth-1");
    std::env::set_var("ANTHROPIC_API_KEY", "key-1");

    match resolve_credential() {
        Some(Credential::OAuthToken(t)) => assert_eq!(t, "oauth-1"),
        other => panic!("expected oauth token, got {other:?}"),
    }
    saved.restore();
}

#[test]
#[serial_test::serial]
fn api_key_is_the_fallback() {
    let saved = Saved::capture();
    std::env::remove_var("CLAUDE_CODE_OAUTH_TOKEN");
    std::env::set_var("ANTHROPIC_API_KEY", "key-2");
    std::env::set_var("HOME", "/nonexistent-zs-home");

    match resolve_credential() {
        Some(Credential::ApiKey(k)) => assert_eq!(k, "key-2"),
        other => panic!("expected api key, got {other:?}"),
    }
    saved.restore();
}

#[test]
#[serial_test::serial]
fn credentials_file_is_read_from_home() {
    let saved = Saved::capture();
    let home = tempfile::TempDir::new().unwrap();
    std::fs::create_dir_all(home.path().join(".claude")).unwrap();
    std::fs::write(
        home.path().join(".claude/.credentials.json"),
        r#"{"claudeAiOauth": {"accessToken": "file-token"}}"#,
    )
    .unwrap();
    std::env::remove_var("CLAUDE_CODE_OAUTH_TOKEN");
    std::env::remove_var("ANTHROPIC_API_KEY");
    std::env::set_var("HOME", home.path());

    match resolve_credential() {
        Some(Credential::OAuthToken(t)) => assert_eq!(t, "file-token"),
        other => panic!("expected file token, got {other:?}"),
    }
    saved.restore();
}

#[tokio::test]
async fn config_dir_contains_credential_and_hook() {
    let cluster = ClusterId::new(format!("cluster-cred-{}", nanoid::nanoid!(6)));
    let dir = prepare_config_dir(&cluster, Some(Credential::ApiKey("sk-test".into())))
        .await
        .unwrap();

    let creds = std::fs::read_to_string(dir.join("credentials.env")).unwrap();
    assert_eq!(creds, "ANTHROPIC_API_KEY=sk-test\n");

    let hook = dir.join("block-prompts.sh");
    assert!(hook.exists());
    use std::os::unix::fs::PermissionsExt;
    assert_ne!(std::fs::metadata(&hook).unwrap().permissions().mode() & 0o111, 0);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn config_dir_without_credential_still_carries_the_hook() {
    let cluster = ClusterId::new(format!("cluster-cred-{}", nanoid::nanoid!(6)));
    let dir = prepare_config_dir(&cluster, None).await.unwrap();
    assert!(!dir.join("credentials.env").exists());
    assert!(dir.join("block-prompts.sh").exists());
    std::fs::remove_dir_all(&dir).unwrap();
}

struct Saved {
    oauth: Option<String>,
    key: Option<String>,
    home: Option<String>,
}

impl Saved {
    fn capture() -> Self {
        Self {
            oauth: std::env::var("CLAUDE_CODE_OAUTH_TOKEN").ok(),
            key: std::env::var("ANTHROPIC_API_KEY").ok(),
            home: std::env::var("HOME").ok(),
        }
    }

    fn restore(self) {
        restore_var("CLAUDE_CODE_OAUTH_TOKEN", self.oauth);
        restore_var("ANTHROPIC_API_KEY", self.key);
        restore_var("HOME", self.home);
    }
}

fn restore_var(key: &str, value: Option<String>) {
    match value {
        Some(v) => std::env::set_var(key, v),
        None => std::env::remove_var(key),
    }
}

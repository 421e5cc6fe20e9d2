use super::*;
use std::fs;

use russh::keys::{
    Algorithm,
    PrivateKey,
    ssh_key::{LineEnding, rand_core::OsRng},
};
use tempfile::TempDir;

const TEST_KNOWN_HOSTS: &str =
    "bastion.com ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl";

fn generated_key() -> String {
    PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
        .expect("generate key")
        .to_openssh(LineEnding::LF)
        .expect("encode key")
        .to_string()
}

fn write_file(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("write fixture");
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn password_auth_uses_password_and_keyboard_interactive() {
    let cfg = SshConfig::new("paulo", "secret", "", "bastion.com", "", 22).await.unwrap();
    assert_eq!(cfg.user(), "paulo");
    assert_eq!(cfg.host(), "bastion.com");
    assert_eq!(cfg.addr(), "bastion.com:22");
    let labels: Vec<_> = cfg.auth_methods().iter().map(AuthMethod::label).collect();
    assert_eq!(labels, ["password", "keyboard-interactive"]);
    assert!(cfg.is_insecure());
    assert_eq!(cfg.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
}

#[tokio::test]
async fn zero_port_defaults_to_22() {
    let cfg = SshConfig::new("paulo", "secret", "", "bastion.com", "", 0).await.unwrap();
    assert_eq!(cfg.port(), 22);
    let cfg = SshConfig::new("paulo", "secret", "", "bastion.com", "", 2222).await.unwrap();
    assert_eq!(cfg.addr(), "bastion.com:2222");
}

#[tokio::test]
async fn key_file_takes_precedence_over_password() {
    let dir = TempDir::new().unwrap();
    let key_path = write_file(&dir, "id_test", &generated_key());

    let cfg = SshConfig::new("paulo", "secret", &key_path, "bastion.com", "", 22).await.unwrap();
    assert_eq!(cfg.key_file(), Some(Path::new(&key_path)));
    let labels: Vec<_> = cfg.auth_methods().iter().map(AuthMethod::label).collect();
    assert_eq!(labels, ["publickey"]);
}

#[tokio::test]
async fn required_fields() {
    let err = SshConfig::new("paulo", "secret", "", "", "", 22).await.unwrap_err();
    assert_eq!(err.to_string(), "host is required");

    let err = SshConfig::new("", "secret", "", "bastion.com", "", 22).await.unwrap_err();
    assert_eq!(err.to_string(), "user is required");

    let err = SshConfig::new("paulo", "", "", "bastion.com", "", 22).await.unwrap_err();
    assert!(matches!(err, ConfigError::MissingCredentials));
    assert_eq!(err.to_string(), "password or keyFile is required");
}

#[tokio::test]
async fn unreadable_key_file() {
    let err = SshConfig::new("paulo", "", "/nonexistent/id_test", "bastion.com", "", 22)
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::ReadKeyFile { .. }));
    assert!(err.to_string().starts_with("failed to read keyFile: "), "{err}");
}

#[tokio::test]
async fn invalid_key_file() {
    let dir = TempDir::new().unwrap();
    let key_path = write_file(&dir, "id_bad", "invalid key content");

    let err = SshConfig::new("paulo", "", &key_path, "bastion.com", "", 22).await.unwrap_err();
    assert!(matches!(err, ConfigError::ParseKeyFile(_)));
    assert!(err.to_string().starts_with("failed to parse keyFile: "), "{err}");
}

#[tokio::test]
async fn binary_key_file_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let key_path = dir.path().join("id_der");
    fs::write(&key_path, [0x30, 0x82, 0xff, 0xfe, 0x00, 0x01]).unwrap();
    let key_path = key_path.to_string_lossy().into_owned();

    let err = SshConfig::new("paulo", "", &key_path, "bastion.com", "", 22).await.unwrap_err();
    assert!(matches!(err, ConfigError::ParseKeyFile(_)), "{err:?}");
    assert!(err.to_string().starts_with("failed to parse keyFile: "), "{err}");
}

#[tokio::test]
async fn known_hosts_enables_verification() {
    let dir = TempDir::new().unwrap();
    let known_hosts = write_file(&dir, "known_hosts", TEST_KNOWN_HOSTS);

    let cfg = SshConfig::new("paulo", "secret", "", "bastion.com", &known_hosts, 22).await.unwrap();
    assert!(!cfg.is_insecure());
    assert_eq!(cfg.known_hosts_file(), Some(Path::new(&known_hosts)));
    assert!(matches!(cfg.host_key_policy(), HostKeyPolicy::KnownHosts(db) if db.len() == 1));
}

#[tokio::test]
async fn invalid_known_hosts() {
    let dir = TempDir::new().unwrap();
    let known_hosts = write_file(&dir, "known_hosts", "invalid content %%%");

    let err = SshConfig::new("paulo", "secret", "", "bastion.com", &known_hosts, 22)
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::KnownHosts(_)));
    assert!(err.to_string().starts_with("failed to load known_hosts: "), "{err}");

    let err = SshConfig::new("paulo", "secret", "", "bastion.com", "/nonexistent/known_hosts", 22)
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::KnownHosts(_)));
}

#[tokio::test]
async fn resolve_from_settings() {
    let settings = SshSettings {
        user: "deploy".into(),
        password: Some("pw".into()),
        host: "10.0.0.5".into(),
        port: 2200,
        ..SshSettings::default()
    };
    let cfg = SshConfig::resolve(settings)
        .await
        .unwrap()
        .with_connect_timeout(Duration::from_secs(5));
    assert_eq!(cfg.addr(), "10.0.0.5:2200");
    assert_eq!(cfg.connect_timeout(), Duration::from_secs(5));
}

#[tokio::test]
async fn debug_hides_password() {
    let cfg = SshConfig::new("paulo", "supersecret", "", "bastion.com", "", 22).await.unwrap();
    let rendered = format!("{cfg:?}");
    assert!(rendered.contains("keyboard-interactive"));
    assert!(!rendered.contains("supersecret"));
}

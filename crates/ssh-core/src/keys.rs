use crate::error::{SshCoreError, SshResult};
use russh::keys;

/// Load a private key from string data, supporting:
/// - OpenSSH keys (`BEGIN OPENSSH PRIVATE KEY`), encrypted or not
/// - PKCS#8 (encrypted/unencrypted)
/// - PKCS#1 PEM (`BEGIN RSA PRIVATE KEY`)
///
/// If the key is encrypted, provide `passphrase` or an error is returned.
pub fn load_private_key_from_str(data: &str, passphrase: Option<&str>) -> SshResult<keys::PrivateKey> {
    if passphrase.is_none()
        && let Ok(key) = keys::PrivateKey::from_openssh(data)
        && !key.is_encrypted()
    {
        return Ok(key);
    }

    match keys::decode_secret_key(data, passphrase) {
        Ok(key) => Ok(key),
        Err(keys::Error::KeyIsEncrypted) if passphrase.is_none() => {
            Err(SshCoreError::invalid_key("encrypted private key requires a passphrase"))
        }
        Err(err) => Err(SshCoreError::invalid_key(err.to_string())),
    }
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;

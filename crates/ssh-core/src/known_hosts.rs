//! OpenSSH `known_hosts` trust database.
//!
//! Each non-comment line has the form
//!
//! ```text
//! [@marker] patterns keytype base64-key [comment]
//! ```
//!
//! where `patterns` is a comma-separated list of host names, `*`/`?`
//! wildcards, `!`-negated patterns, `[host]:port` forms for non-standard
//! ports, or hashed `|1|salt|hash` entries. The `@revoked` marker flags a
//! key that must never be accepted. `@cert-authority` lines are skipped.

use std::{path::Path, str::FromStr};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use russh::keys::{self, PublicKey};
use sha1::Sha1;
use tracing::debug;

use crate::error::{SshCoreError, SshResult};

type HmacSha1 = Hmac<Sha1>;

const DEFAULT_PORT: u16 = 22;

/// Outcome of checking a presented host key against the database.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostKeyStatus {
    /// A matching entry records exactly this key.
    Trusted,
    /// No entry matches the host.
    Unknown,
    /// The host is known but with a different key.
    Mismatch,
    /// The key is listed under `@revoked` for the host.
    Revoked,
}

impl HostKeyStatus {
    pub fn is_trusted(self) -> bool {
        matches!(self, HostKeyStatus::Trusted)
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Glob(String),
    Hashed { salt: Vec<u8>, hash: Vec<u8> },
}

#[derive(Debug, Clone)]
struct HostPattern {
    negated: bool,
    matcher: Matcher,
}

impl HostPattern {
    fn parse(raw: &str, line: usize) -> SshResult<Self> {
        let (negated, body) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        if body.is_empty() {
            return Err(SshCoreError::known_hosts(line, "empty host pattern"));
        }

        let matcher = if let Some(hashed) = body.strip_prefix("|1|") {
            let (salt, hash) = hashed
                .split_once('|')
                .ok_or_else(|| SshCoreError::known_hosts(line, "malformed hashed host"))?;
            let salt = BASE64
                .decode(salt)
                .map_err(|e| SshCoreError::known_hosts(line, format!("invalid hashed host salt: {e}")))?;
            let hash = BASE64
                .decode(hash)
                .map_err(|e| SshCoreError::known_hosts(line, format!("invalid hashed host digest: {e}")))?;
            Matcher::Hashed { salt, hash }
        } else {
            Matcher::Glob(body.to_ascii_lowercase())
        };

        Ok(Self { negated, matcher })
    }

    fn matches(&self, candidate: &str) -> bool {
        match &self.matcher {
            Matcher::Glob(pattern) => glob_match(pattern.as_bytes(), candidate.as_bytes()),
            Matcher::Hashed { salt, hash } => {
                let Ok(mut mac) = HmacSha1::new_from_slice(salt) else {
                    return false;
                };
                mac.update(candidate.as_bytes());
                mac.verify_slice(hash).is_ok()
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    revoked: bool,
    patterns: Vec<HostPattern>,
    key: PublicKey,
}

impl Entry {
    /// Negated patterns win over positive ones, as in OpenSSH.
    fn applies_to(&self, candidate: &str) -> bool {
        let mut matched = false;
        for pattern in &self.patterns {
            if pattern.matches(candidate) {
                if pattern.negated {
                    return false;
                }
                matched = true;
            }
        }
        matched
    }
}

/// Parsed `known_hosts` content.
#[derive(Debug, Clone, Default)]
pub struct KnownHosts {
    entries: Vec<Entry>,
}

impl KnownHosts {
    /// Read and parse a known_hosts file.
    pub async fn from_file(path: impl AsRef<Path>) -> SshResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let hosts: Self = content.parse()?;
        debug!(path = %path.as_ref().display(), entries = hosts.len(), "loaded known_hosts");
        Ok(hosts)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check `key` presented by `host:port`.
    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> HostKeyStatus {
        let candidate = host_lookup_name(host, port);
        let mut known = false;
        let mut trusted = false;

        for entry in self.entries.iter().filter(|e| e.applies_to(&candidate)) {
            let same_key = entry.key.key_data() == key.key_data();
            if entry.revoked {
                if same_key {
                    return HostKeyStatus::Revoked;
                }
                continue;
            }
            known = true;
            trusted |= same_key;
        }

        match (known, trusted) {
            (_, true) => HostKeyStatus::Trusted,
            (true, false) => HostKeyStatus::Mismatch,
            (false, false) => HostKeyStatus::Unknown,
        }
    }
}

impl FromStr for KnownHosts {
    type Err = SshCoreError;

    fn from_str(content: &str) -> SshResult<Self> {
        let mut entries = Vec::new();
        for (idx, raw) in content.lines().enumerate() {
            if let Some(entry) = parse_line(raw, idx + 1)? {
                entries.push(entry);
            }
        }
        Ok(Self { entries })
    }
}

fn parse_line(raw: &str, line: usize) -> SshResult<Option<Entry>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let mut fields = trimmed.split_whitespace();
    let mut hosts = fields.next().unwrap_or_default();
    let mut revoked = false;
    if let Some(marker) = hosts.strip_prefix('@') {
        match marker {
            "revoked" => revoked = true,
            "cert-authority" => return Ok(None),
            other => return Err(SshCoreError::known_hosts(line, format!("unknown marker @{other}"))),
        }
        hosts = fields
            .next()
            .ok_or_else(|| SshCoreError::known_hosts(line, "missing host patterns"))?;
    }

    let key_type = fields
        .next()
        .ok_or_else(|| SshCoreError::known_hosts(line, "missing key type"))?;
    let encoded = fields
        .next()
        .ok_or_else(|| SshCoreError::known_hosts(line, "missing key data"))?;

    let key = keys::parse_public_key_base64(encoded)
        .map_err(|e| SshCoreError::known_hosts(line, format!("invalid key data: {e}")))?;
    if key.algorithm().as_str() != key_type {
        return Err(SshCoreError::known_hosts(
            line,
            format!("key type {key_type} does not match encoded {} key", key.algorithm()),
        ));
    }

    let patterns = hosts
        .split(',')
        .map(|p| HostPattern::parse(p, line))
        .collect::<SshResult<Vec<_>>>()?;

    Ok(Some(Entry { revoked, patterns, key }))
}

/// Name under which OpenSSH records `host:port`.
pub fn host_lookup_name(host: &str, port: u16) -> String {
    let host = host.to_ascii_lowercase();
    if port == DEFAULT_PORT { host } else { format!("[{host}]:{port}") }
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

#[cfg(test)]
#[path = "known_hosts_tests.rs"]
mod tests;

use std::{fmt, sync::Arc};

use russh::{
    MethodSet,
    client::{self, AuthResult, KeyboardInteractiveAuthResponse},
    keys::{HashAlg, PrivateKey, PrivateKeyWithHashAlg},
};
use secrecy::{ExposeSecret, SecretString};
use ssh_core::{SshCoreError, SshResult, session::SessionHandle};
use tracing::{debug, info, warn};

/// Servers that keep asking questions are cut off after this many rounds.
const MAX_KEYBOARD_INTERACTIVE_ROUNDS: usize = 8;

/// One way of proving the user's identity to the bastion.
#[derive(Clone)]
pub enum AuthMethod {
    PublicKey(Arc<PrivateKey>),
    Password(SecretString),
    /// Answers every keyboard-interactive prompt with the same secret.
    KeyboardInteractive(SecretString),
}

impl AuthMethod {
    pub fn label(&self) -> &'static str {
        match self {
            AuthMethod::PublicKey(_) => "publickey",
            AuthMethod::Password(_) => "password",
            AuthMethod::KeyboardInteractive(_) => "keyboard-interactive",
        }
    }

    async fn authenticate<H>(&self, session: &mut SessionHandle<H>, username: &str, rsa_hint: Option<HashAlg>) -> SshResult<AuthResult>
    where
        H: client::Handler + Send,
    {
        match self {
            AuthMethod::PublicKey(key) => {
                let hash_alg = if key.algorithm().is_rsa() { rsa_hint } else { None };
                debug!(key = ?key.algorithm(), "attempting public-key auth");
                let key = PrivateKeyWithHashAlg::new(Arc::clone(key), hash_alg);
                Ok(session.authenticate_publickey(username.to_string(), key).await?)
            }
            AuthMethod::Password(password) => Ok(session
                .authenticate_password(username.to_string(), password.expose_secret().to_string())
                .await?),
            AuthMethod::KeyboardInteractive(answer) => authenticate_keyboard_interactive(session, username, answer).await,
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::PublicKey(key) => f.debug_tuple("PublicKey").field(&key.algorithm()).finish(),
            AuthMethod::Password(_) => f.write_str("Password(<redacted>)"),
            AuthMethod::KeyboardInteractive(_) => f.write_str("KeyboardInteractive(<redacted>)"),
        }
    }
}

/// Try each method in order until the server accepts one.
pub async fn authenticate<H>(session: &mut SessionHandle<H>, username: &str, methods: &[AuthMethod]) -> SshResult<()>
where
    H: client::Handler + Send,
{
    if methods.is_empty() {
        return Err(SshCoreError::AuthFailed("no authentication methods configured".to_string()));
    }

    let rsa_hash_hint = session.best_supported_rsa_hash().await.unwrap_or(None).flatten();

    for method in methods {
        let label = method.label();
        match method.authenticate(session, username, rsa_hash_hint).await {
            Ok(AuthResult::Success) => {
                info!(method = label, "authentication succeeded");
                return Ok(());
            }
            Ok(AuthResult::Failure { .. }) => {
                warn!(method = label, "authentication rejected by server");
            }
            Err(err) => {
                warn!(method = label, error = ?err, "authentication attempt failed");
            }
        }
    }

    Err(SshCoreError::AuthFailed(format!(
        "all authentication methods were rejected for user {username}"
    )))
}

async fn authenticate_keyboard_interactive<H>(
    session: &mut SessionHandle<H>,
    username: &str,
    answer: &SecretString,
) -> SshResult<AuthResult>
where
    H: client::Handler + Send,
{
    let mut response = session
        .authenticate_keyboard_interactive_start(username.to_string(), Option::<String>::None)
        .await?;

    for _ in 0..MAX_KEYBOARD_INTERACTIVE_ROUNDS {
        match response {
            KeyboardInteractiveAuthResponse::Success => return Ok(AuthResult::Success),
            KeyboardInteractiveAuthResponse::Failure {
                remaining_methods,
                partial_success,
            } => {
                return Ok(AuthResult::Failure {
                    remaining_methods,
                    partial_success,
                });
            }
            KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => {
                let answers = vec![answer.expose_secret().to_string(); prompts.len()];
                response = session.authenticate_keyboard_interactive_respond(answers).await?;
            }
        }
    }

    warn!(rounds = MAX_KEYBOARD_INTERACTIVE_ROUNDS, "keyboard-interactive exchange did not finish");
    Ok(AuthResult::Failure {
        remaining_methods: MethodSet::empty(),
        partial_success: false,
    })
}

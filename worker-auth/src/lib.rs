#![warn(rust_2018_idioms)]
//! Replay-resistant signature verification for inbound inference requests.
//!
//! The control plane signs every request with an RSA key whose public half
//! it publishes at a well-known URL (see [`pubkey::fetch_public_key`]). This
//! crate owns the verification protocol: a monotonic request-number floor, a
//! bounded recent-message window, and RSA-PKCS#1 v1.5/SHA-256 signature
//! verification over a byte-exact canonical JSON serialization of the
//! request's auth envelope.
#[macro_use]
extern crate slog_scope;

mod error;
pub mod pubkey;

use std::collections::VecDeque;
use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD, Engine};
use rsa::{Hash, PaddingScheme, PublicKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use error::AuthError;

/// How many of the most recently accepted canonical messages are retained
/// for replay detection, and how far behind the current floor a `reqnum` may
/// fall before being rejected outright as stale.
pub const MSG_HISTORY_LEN: usize = 100;

/// The control plane's authorization of one inference call, as received on
/// the wire inside `{"auth_data": ..., "payload": ...}`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AuthEnvelope {
    pub signature: String,
    pub cost: String,
    pub endpoint: String,
    pub reqnum: i64,
    pub url: String,
}

/// The fields of [`AuthEnvelope`] that the signature covers, in the exact
/// order the control plane signed them. This is a distinct type (rather than
/// `#[serde(skip)]` on `signature`) so that the canonical serialization is
/// pinned independently of whatever `AuthEnvelope`'s own field order happens
/// to be.
#[derive(Serialize)]
struct CanonicalFields<'a> {
    cost: &'a str,
    endpoint: &'a str,
    reqnum: i64,
    url: &'a str,
}

impl AuthEnvelope {
    /// The exact byte sequence the signature was computed over: the envelope
    /// minus `signature`, serialized as 4-space-indented JSON with keys in
    /// declaration order `cost, endpoint, reqnum, url`.
    ///
    /// This must not delegate to a default pretty-printer -- the indent
    /// width and separator whitespace are part of the wire contract.
    fn canonical_message(&self) -> String {
        let fields = CanonicalFields {
            cost: &self.cost,
            endpoint: &self.endpoint,
            reqnum: self.reqnum,
            url: &self.url,
        };
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        fields
            .serialize(&mut ser)
            .expect("CanonicalFields serialization cannot fail");
        String::from_utf8(buf).expect("JSON output is always valid UTF-8")
    }
}

/// Process-wide replay-detection state, owned by the [`Authenticator`].
#[derive(Debug, Default)]
struct ReplayWindow {
    highest_reqnum: i64,
    recent_messages: VecDeque<String>,
}

impl ReplayWindow {
    fn new() -> Self {
        Self {
            highest_reqnum: -1,
            recent_messages: VecDeque::with_capacity(MSG_HISTORY_LEN),
        }
    }

    fn accept(&mut self, reqnum: i64, canonical: String) {
        self.highest_reqnum = self.highest_reqnum.max(reqnum);
        self.recent_messages.push_back(canonical);
        while self.recent_messages.len() > MSG_HISTORY_LEN {
            self.recent_messages.pop_front();
        }
    }
}

/// Verifies inbound [`AuthEnvelope`]s against the control plane's published
/// RSA key, with anti-replay bookkeeping. Cheap to clone: the replay window
/// is internally mutex-protected and the key is immutable once fetched.
pub struct Authenticator {
    public_key: Option<RsaPublicKey>,
    replay_window: Mutex<ReplayWindow>,
}

impl Authenticator {
    /// Build an authenticator around an already-fetched key (or `None`, in
    /// which case every `verify` call fails closed).
    pub fn new(public_key: Option<RsaPublicKey>) -> Self {
        Self {
            public_key,
            replay_window: Mutex::new(ReplayWindow::new()),
        }
    }

    pub fn has_public_key(&self) -> bool {
        self.public_key.is_some()
    }

    /// Verify one auth envelope. CPU-bound and synchronous by design: this
    /// must run to completion on the calling task without suspending.
    pub fn verify(&self, env: &AuthEnvelope) -> Result<(), AuthError> {
        let public_key = self.public_key.as_ref().ok_or(AuthError::PublicKeyUnavailable)?;

        let mut window = self.replay_window.lock().expect("replay window mutex poisoned");

        let floor = window.highest_reqnum - MSG_HISTORY_LEN as i64;
        if env.reqnum < floor {
            return Err(AuthError::StaleRequest {
                reqnum: env.reqnum,
                floor,
            });
        }

        let canonical = env.canonical_message();
        if window.recent_messages.iter().any(|seen| seen == &canonical) {
            return Err(AuthError::Replay(env.reqnum));
        }

        let signature = STANDARD
            .decode(&env.signature)
            .map_err(|_| AuthError::BadSignature)?;
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let digest = hasher.finalize();

        public_key
            .verify(
                PaddingScheme::new_pkcs1v15_sign(Some(Hash::SHA2_256)),
                &digest,
                &signature,
            )
            .map_err(|_| AuthError::BadSignature)?;

        window.accept(env.reqnum, canonical);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rsa::RsaPrivateKey;

    fn make_keypair() -> (RsaPrivateKey, RsaPublicKey) {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 2048).expect("key generation");
        let public = private.to_public_key();
        (private, public)
    }

    fn sign(private: &RsaPrivateKey, message: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(message.as_bytes());
        let digest = hasher.finalize();
        let signature = private
            .sign(PaddingScheme::new_pkcs1v15_sign(Some(Hash::SHA2_256)), &digest)
            .expect("signing should succeed");
        STANDARD.encode(signature)
    }

    fn envelope(private: &RsaPrivateKey, reqnum: i64) -> AuthEnvelope {
        let mut env = AuthEnvelope {
            signature: String::new(),
            cost: "1".to_owned(),
            endpoint: "/generate".to_owned(),
            reqnum,
            url: "http://example/worker".to_owned(),
        };
        env.signature = sign(private, &env.canonical_message());
        env
    }

    #[test]
    fn accepts_a_validly_signed_envelope() {
        let (private, public) = make_keypair();
        let auth = Authenticator::new(Some(public));
        let env = envelope(&private, 1);
        assert!(auth.verify(&env).is_ok());
    }

    #[test]
    fn rejects_replayed_envelope() {
        let (private, public) = make_keypair();
        let auth = Authenticator::new(Some(public));
        let env = envelope(&private, 5);
        assert!(auth.verify(&env).is_ok());
        let err = auth.verify(&env).expect_err("replay must be rejected");
        assert!(matches!(err, AuthError::Replay(5)));
    }

    #[test]
    fn rejects_stale_reqnum_without_checking_signature() {
        let (private, public) = make_keypair();
        let auth = Authenticator::new(Some(public));
        assert!(auth.verify(&envelope(&private, 200)).is_ok());

        let mut stale = envelope(&private, 50);
        stale.signature = "not-even-base64-valid!!".to_owned();
        let err = auth.verify(&stale).expect_err("stale reqnum must be rejected");
        assert!(matches!(err, AuthError::StaleRequest { reqnum: 50, .. }));
    }

    #[test]
    fn rejects_bad_signature() {
        let (private, public) = make_keypair();
        let auth = Authenticator::new(Some(public));
        let mut env = envelope(&private, 1);
        env.cost = "999".to_owned();
        let err = auth.verify(&env).expect_err("tampered payload must fail");
        assert!(matches!(err, AuthError::BadSignature));
    }

    #[test]
    fn fails_closed_without_a_public_key() {
        let (private, _public) = make_keypair();
        let auth = Authenticator::new(None);
        let err = auth.verify(&envelope(&private, 1)).expect_err("must fail closed");
        assert!(matches!(err, AuthError::PublicKeyUnavailable));
    }
}

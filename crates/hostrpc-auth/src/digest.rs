//! Digest challenge/response over a close-and-reconnect WebSocket handshake.
//!
//! A client first connects to `/auth`; the server upgrades, then closes with
//! [`CHALLENGE_CLOSE_CODE`] and a JSON [`ChallengeBody`] as the reason. The
//! client reconnects to `/auth?<digest response>` and is admitted only if the
//! response checks out against the stored challenge.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use md5::{Digest, Md5};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{trace, warn};

use crate::storage::PasswordSource;

/// WebSocket close code carrying a challenge.
pub const CHALLENGE_CLOSE_CODE: u16 = 4401;
/// Path that issues and validates challenges.
pub const AUTH_PATH: &str = "/auth";
/// Default user name.
pub const DEFAULT_USERNAME: &str = "bitwig";
/// Default realm.
pub const DEFAULT_REALM: &str = "biwig-websocket-rpc";
/// Default challenge validity window.
pub const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(30);
/// Default bound of the challenge store.
pub const DEFAULT_MAX_CHALLENGES: usize = 200;

const ALGORITHM: &str = "md5";
const QOP: &str = "auth";
const NONCE_LEN: usize = 21;

/// Digest parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigestConfig {
    /// Only accepted user name.
    pub username: String,
    /// Realm sent in challenges.
    pub realm: String,
    /// How long a challenge may be answered.
    pub challenge_ttl: Duration,
    /// Store capacity; the oldest challenges are evicted beyond it.
    pub max_challenges: usize,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            username: DEFAULT_USERNAME.to_owned(),
            realm: DEFAULT_REALM.to_owned(),
            challenge_ttl: DEFAULT_CHALLENGE_TTL,
            max_challenges: DEFAULT_MAX_CHALLENGES,
        }
    }
}

/// Challenge payload sent as the close reason.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeBody {
    /// Realm.
    pub realm: String,
    /// Single-use nonce.
    pub nonce: String,
    /// Always `md5`.
    pub algorithm: String,
    /// Always `auth`.
    pub qop: String,
}

#[derive(Debug)]
struct Challenge {
    remote: IpAddr,
    uri: String,
    realm: String,
    issued_at: Instant,
    nc: u32,
}

/// What the upgrade handler should do with a handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Upgrade and serve.
    Accept,
    /// Upgrade, then close with a fresh challenge.
    Challenge,
    /// Refuse the upgrade.
    Reject,
}

/// The parts of an upgrade request auth looks at.
#[derive(Clone, Copy, Debug)]
pub struct Handshake<'a> {
    /// Request path.
    pub path: &'a str,
    /// Raw query string, without `?`.
    pub query: Option<&'a str>,
    /// `Host` header.
    pub host: Option<&'a str>,
    /// Peer address.
    pub remote: IpAddr,
}

impl Handshake<'_> {
    /// The `ws://host/auth` URI a challenge is bound to.
    pub fn challenge_uri(&self) -> Option<String> {
        let host = self.host.filter(|h| !h.is_empty())?;
        Some(format!("ws://{host}{}", self.path))
    }
}

/// A client's answer to a challenge, as carried in the query string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DigestResponse {
    /// User name.
    pub username: String,
    /// Realm from the challenge.
    pub realm: String,
    /// Nonce from the challenge.
    pub nonce: String,
    /// URI the challenge was issued for.
    pub uri: String,
    /// Algorithm from the challenge.
    pub algorithm: String,
    /// Hex MD5 digest.
    pub response: String,
    /// Quality of protection from the challenge.
    pub qop: String,
    /// Nonce count, 8 lowercase hex digits.
    pub nc: String,
    /// Client nonce.
    pub cnonce: String,
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

impl DigestResponse {
    /// Parse `key=value&...`. Every field must be present and non-empty.
    pub fn parse(query: &str) -> Option<Self> {
        let mut params = HashMap::new();
        for pair in query.split('&') {
            let (key, value) = pair.trim().split_once('=')?;
            if params.insert(key.trim(), value.trim()).is_some() {
                return None;
            }
        }
        let mut field = |name: &str| -> Option<String> {
            params
                .remove(name)
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };
        Some(Self {
            username: field("username")?,
            realm: field("realm")?,
            nonce: field("nonce")?,
            uri: field("uri")?,
            algorithm: field("algorithm")?,
            response: field("response")?,
            qop: field("qop")?,
            nc: field("nc")?,
            cnonce: field("cnonce")?,
        })
    }

    /// Build the answer a client would send for `challenge`.
    pub fn answer(
        challenge: &ChallengeBody,
        username: &str,
        password: &str,
        uri: &str,
        nc: u32,
        cnonce: &str,
    ) -> Self {
        let mut answer = Self {
            username: username.to_owned(),
            realm: challenge.realm.clone(),
            nonce: challenge.nonce.clone(),
            uri: uri.to_owned(),
            algorithm: challenge.algorithm.clone(),
            response: String::new(),
            qop: challenge.qop.clone(),
            nc: format!("{nc:08x}"),
            cnonce: cnonce.to_owned(),
        };
        answer.response = answer.compute(password);
        answer
    }

    /// `MD5(HA1:nonce:nc:cnonce:qop:HA2)` over this response's fields.
    pub fn compute(&self, password: &str) -> String {
        let ha1 = md5_hex(&format!("{}:{}:{password}", self.username, self.realm));
        let ha2 = md5_hex(&format!(":{}", self.uri));
        md5_hex(&format!(
            "{ha1}:{}:{}:{}:{}:{ha2}",
            self.nonce, self.nc, self.cnonce, self.qop
        ))
    }

    /// Encode as the reconnect query string.
    pub fn to_query(&self) -> String {
        format!(
            "username={}&realm={}&nonce={}&uri={}&algorithm={}&response={}&qop={}&nc={}&cnonce={}",
            self.username,
            self.realm,
            self.nonce,
            self.uri,
            self.algorithm,
            self.response,
            self.qop,
            self.nc,
            self.cnonce
        )
    }
}

/// Issues and validates challenges.
pub struct DigestAuthenticator {
    config: DigestConfig,
    password: Arc<dyn PasswordSource>,
    store: DashMap<String, Challenge>,
}

impl DigestAuthenticator {
    /// Create an authenticator checking against `password`.
    pub fn new(config: DigestConfig, password: Arc<dyn PasswordSource>) -> Self {
        Self {
            config,
            password,
            store: DashMap::new(),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &DigestConfig {
        &self.config
    }

    /// Number of outstanding challenges.
    pub fn pending(&self) -> usize {
        self.store.len()
    }

    /// Gate an upgrade request.
    pub fn authenticate(&self, handshake: &Handshake<'_>) -> Decision {
        if handshake.challenge_uri().is_none() {
            trace!(remote = %handshake.remote, "rejected: Host header is missing");
            return Decision::Reject;
        }
        if handshake.path != AUTH_PATH {
            trace!(remote = %handshake.remote, path = handshake.path, "rejected: path is not accepted");
            return Decision::Reject;
        }
        match handshake.query {
            None => {
                trace!(remote = %handshake.remote, "accepted to deliver a challenge");
                Decision::Challenge
            }
            Some(query) if self.validate(handshake.remote, query) => {
                trace!(remote = %handshake.remote, "accepted");
                Decision::Accept
            }
            Some(_) => Decision::Reject,
        }
    }

    /// Create and store a challenge for `handshake`.
    pub fn challenge(&self, handshake: &Handshake<'_>) -> Option<ChallengeBody> {
        let uri = handshake.challenge_uri()?;
        self.make_room();
        let nonce: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect();
        let _ = self.store.insert(
            nonce.clone(),
            Challenge {
                remote: handshake.remote,
                uri,
                realm: self.config.realm.clone(),
                issued_at: Instant::now(),
                nc: 0,
            },
        );
        Some(ChallengeBody {
            realm: self.config.realm.clone(),
            nonce,
            algorithm: ALGORITHM.to_owned(),
            qop: QOP.to_owned(),
        })
    }

    fn make_room(&self) {
        let ttl = self.config.challenge_ttl;
        self.store.retain(|_, c| c.issued_at.elapsed() < ttl);
        if self.store.len() >= self.config.max_challenges {
            warn!(
                capacity = self.config.max_challenges,
                "challenge store reached full capacity"
            );
        }
        while self.store.len() >= self.config.max_challenges.max(1) {
            let oldest = self
                .store
                .iter()
                .min_by_key(|entry| entry.issued_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(nonce) => {
                    let _ = self.store.remove(&nonce);
                }
                None => break,
            }
        }
    }

    /// Check a digest response. Once the query parses, its nonce is consumed
    /// whatever the outcome; a query that does not parse names no nonce.
    pub fn validate(&self, remote: IpAddr, query: &str) -> bool {
        let Some(answer) = DigestResponse::parse(query) else {
            trace!(%remote, "rejected: malformed or incomplete response");
            return false;
        };
        let Some((_, mut challenge)) = self.store.remove(&answer.nonce) else {
            trace!(%remote, "rejected: unknown nonce");
            return false;
        };
        if answer.username != self.config.username {
            trace!(%remote, "rejected: unknown user");
            return false;
        }
        if challenge.remote != remote {
            trace!(%remote, "rejected: response from a different host");
            return false;
        }
        if challenge.issued_at.elapsed() >= self.config.challenge_ttl {
            trace!(%remote, "rejected: challenge expired");
            return false;
        }
        if answer.realm != challenge.realm
            || answer.uri != challenge.uri
            || answer.algorithm != ALGORITHM
            || answer.qop != QOP
        {
            trace!(%remote, "rejected: response does not match challenge");
            return false;
        }
        challenge.nc += 1;
        if answer.nc != format!("{:08x}", challenge.nc) {
            trace!(%remote, "rejected: wrong nonce count");
            return false;
        }
        let Some(password) = self.password.password() else {
            warn!("digest auth is enabled but no password is configured");
            return false;
        };
        let ok = answer.response == answer.compute(&password);
        if !ok {
            trace!(%remote, "rejected: digest mismatch");
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StaticPassword;
    use std::net::Ipv4Addr;
    use tracing::Level;

    const LOCAL: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
    const OTHER: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

    fn auth() -> DigestAuthenticator {
        DigestAuthenticator::new(DigestConfig::default(), Arc::new(StaticPassword::new("pw")))
    }

    fn first_contact() -> Handshake<'static> {
        Handshake {
            path: "/auth",
            query: None,
            host: Some("localhost:8887"),
            remote: LOCAL,
        }
    }

    fn answer_for(auth: &DigestAuthenticator, password: &str) -> DigestResponse {
        let body = auth.challenge(&first_contact()).unwrap();
        DigestResponse::answer(&body, "bitwig", password, "ws://localhost:8887/auth", 1, "abc")
    }

    #[test]
    fn md5_known_vector() {
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn gate_decisions() {
        let auth = auth();
        assert_eq!(auth.authenticate(&first_contact()), Decision::Challenge);

        let no_host = Handshake {
            host: None,
            ..first_contact()
        };
        assert_eq!(auth.authenticate(&no_host), Decision::Reject);

        let other_path = Handshake {
            path: "/",
            ..first_contact()
        };
        assert_eq!(auth.authenticate(&other_path), Decision::Reject);
    }

    #[tokio::test]
    async fn challenge_body_shape() {
        let auth = auth();
        let body = auth.challenge(&first_contact()).unwrap();
        assert_eq!(body.realm, DEFAULT_REALM);
        assert_eq!(body.algorithm, "md5");
        assert_eq!(body.qop, "auth");
        assert_eq!(body.nonce.len(), 21);
        assert!(body.nonce.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(auth.pending(), 1);
    }

    #[tokio::test]
    async fn valid_response_is_accepted_once() {
        let auth = auth();
        let query = answer_for(&auth, "pw").to_query();
        let handshake = Handshake {
            query: Some(&query),
            ..first_contact()
        };
        assert_eq!(auth.authenticate(&handshake), Decision::Accept);
        assert_eq!(auth.pending(), 0);
        assert_eq!(auth.authenticate(&handshake), Decision::Reject);
    }

    #[tokio::test]
    async fn wrong_password_consumes_nonce() {
        let auth = auth();
        let query = answer_for(&auth, "nope").to_query();
        assert!(!auth.validate(LOCAL, &query));
        assert_eq!(auth.pending(), 0);
    }

    #[tokio::test]
    async fn wrong_user_consumes_nonce() {
        let auth = auth();
        let body = auth.challenge(&first_contact()).unwrap();
        let intruder =
            DigestResponse::answer(&body, "mallory", "pw", "ws://localhost:8887/auth", 1, "abc");
        assert!(!auth.validate(LOCAL, &intruder.to_query()));
        assert_eq!(auth.pending(), 0);

        let genuine =
            DigestResponse::answer(&body, "bitwig", "pw", "ws://localhost:8887/auth", 1, "abc");
        assert!(!auth.validate(LOCAL, &genuine.to_query()));
    }

    #[tokio::test]
    async fn malformed_query_leaves_challenge_pending() {
        let auth = auth();
        let _ = auth.challenge(&first_contact()).unwrap();
        assert!(!auth.validate(LOCAL, "username=bitwig"));
        assert_eq!(auth.pending(), 1);
    }

    #[tokio::test]
    async fn decisions_are_traced() {
        let auth = auth();
        let (logs, _guard) = hostrpc_logging::capture_logs();

        assert_eq!(auth.authenticate(&first_contact()), Decision::Challenge);
        assert!(logs.has_event(Level::TRACE, "accepted to deliver a challenge"));

        let other_path = Handshake {
            path: "/",
            ..first_contact()
        };
        assert_eq!(auth.authenticate(&other_path), Decision::Reject);
        assert!(logs.has_event(Level::TRACE, "rejected: path is not accepted"));

        let query = answer_for(&auth, "nope").to_query();
        assert!(!auth.validate(LOCAL, &query));
        assert!(logs.has_event(Level::TRACE, "rejected: digest mismatch"));
        assert_eq!(logs.count_at_level(Level::WARN), 0);
    }

    #[tokio::test]
    async fn other_host_is_rejected() {
        let auth = auth();
        let query = answer_for(&auth, "pw").to_query();
        assert!(!auth.validate(OTHER, &query));
        assert!(!auth.validate(LOCAL, &query));
    }

    #[tokio::test]
    async fn nonce_count_must_be_first_increment() {
        let auth = auth();
        let body = auth.challenge(&first_contact()).unwrap();
        let answer =
            DigestResponse::answer(&body, "bitwig", "pw", "ws://localhost:8887/auth", 2, "abc");
        assert!(!auth.validate(LOCAL, &answer.to_query()));
    }

    #[tokio::test]
    async fn mismatched_uri_is_rejected() {
        let auth = auth();
        let body = auth.challenge(&first_contact()).unwrap();
        let answer = DigestResponse::answer(&body, "bitwig", "pw", "ws://evil/auth", 1, "abc");
        assert!(!auth.validate(LOCAL, &answer.to_query()));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_challenge_is_rejected() {
        let auth = auth();
        let query = answer_for(&auth, "pw").to_query();
        tokio::time::advance(DEFAULT_CHALLENGE_TTL + Duration::from_millis(1)).await;
        assert!(!auth.validate(LOCAL, &query));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_challenges_are_purged_on_issue() {
        let auth = auth();
        let _ = auth.challenge(&first_contact()).unwrap();
        tokio::time::advance(DEFAULT_CHALLENGE_TTL).await;
        let _ = auth.challenge(&first_contact()).unwrap();
        assert_eq!(auth.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn store_evicts_oldest_at_capacity() {
        let config = DigestConfig {
            max_challenges: 2,
            ..DigestConfig::default()
        };
        let auth = DigestAuthenticator::new(config, Arc::new(StaticPassword::new("pw")));
        let (logs, _guard) = hostrpc_logging::capture_logs();
        let first = auth.challenge(&first_contact()).unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        let _ = auth.challenge(&first_contact()).unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(!logs.has_event(Level::WARN, "challenge store reached full capacity"));
        let _ = auth.challenge(&first_contact()).unwrap();
        assert_eq!(auth.pending(), 2);
        assert!(logs.has_event(Level::WARN, "challenge store reached full capacity"));
        assert_eq!(logs.count_at_level(Level::WARN), 1);

        let stale = DigestResponse::answer(&first, "bitwig", "pw", "ws://localhost:8887/auth", 1, "x");
        assert!(!auth.validate(LOCAL, &stale.to_query()));
    }

    #[test]
    fn parse_rejects_incomplete_queries() {
        assert!(DigestResponse::parse("username=bitwig").is_none());
        assert!(DigestResponse::parse("garbage").is_none());
        let full = DigestResponse {
            username: "u".into(),
            realm: "r".into(),
            nonce: "n".into(),
            uri: "ws://h/auth".into(),
            algorithm: "md5".into(),
            response: "x".into(),
            qop: "auth".into(),
            nc: "00000001".into(),
            cnonce: "c".into(),
        };
        assert_eq!(DigestResponse::parse(&full.to_query()), Some(full.clone()));
        let empty_cnonce = full.to_query().replace("cnonce=c", "cnonce=");
        assert!(DigestResponse::parse(&empty_cnonce).is_none());
    }

    #[tokio::test]
    async fn unconfigured_password_rejects() {
        struct NoPassword;
        impl PasswordSource for NoPassword {
            fn password(&self) -> Option<String> {
                None
            }
        }
        let auth = DigestAuthenticator::new(DigestConfig::default(), Arc::new(NoPassword));
        let query = answer_for(&auth, "pw").to_query();
        assert!(!auth.validate(LOCAL, &query));
    }
}

//! State client.
//!
//! The `StateClient` holds the caller's credentials and the joined
//! application, issues commands through a [`Channel`], and turns replies
//! into typed values. It owns the `apply_op` convergence loop: read, apply a
//! pure function, compare-and-swap, and on a lost race re-read and reapply.
//!
//! # Session
//!
//! ```text
//! Unjoined ──join / register_app──▶ Joined ──leave / delete_app──▶ Unjoined
//! ```
//!
//! Data and membership operations fail with [`ClientError::NotJoined`] while
//! unjoined, without a round trip.
//!
//! # Hashing
//!
//! The expected hash sent with an update is computed over the exact bytes
//! the server returned, never over a re-encoding of the decoded value, so a
//! codec that does not round-trip byte-for-byte cannot cause spurious
//! mismatches.

use appstate_core::{CborCodec, Codec, Environment};
use appstate_proto::{
    AccessMode, AppKey, AuthToken, CacheStats, Command, ContentHash, Reply, Request,
};
use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

use crate::{channel::Channel, config::ClientConfig, error::ClientError};

/// Client-side session state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    /// No application joined.
    #[default]
    Unjoined,
    /// Joined to an application.
    Joined {
        /// Name the application was joined by.
        app_id: String,
        /// Resolved handle.
        app: AppKey,
    },
}

/// Outcome of [`StateClient::get_if_changed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<T> {
    /// The caller's copy is current.
    Unchanged,
    /// The stored value differs from the caller's copy.
    Changed {
        /// Current value.
        value: T,
        /// Content hash of the current value.
        hash: ContentHash,
    },
}

/// Client for one caller.
///
/// # Type Parameters
///
/// - `C`: Channel to the server
/// - `E`: Environment for backoff sleeps and jitter
/// - `K`: Value codec
pub struct StateClient<C: Channel, E: Environment, K: Codec = CborCodec> {
    channel: C,
    env: E,
    codec: K,
    config: ClientConfig,
    auth: Option<AuthToken>,
    session: Session,
}

impl<C: Channel, E: Environment> StateClient<C, E> {
    /// Create an anonymous, unjoined client using the CBOR codec.
    pub fn new(channel: C, env: E) -> Self {
        Self::with_codec(channel, env, CborCodec)
    }
}

impl<C: Channel, E: Environment, K: Codec> StateClient<C, E, K> {
    /// Create an anonymous, unjoined client with a custom codec.
    pub fn with_codec(channel: C, env: E, codec: K) -> Self {
        Self {
            channel,
            env,
            codec,
            config: ClientConfig::default(),
            auth: None,
            session: Session::Unjoined,
        }
    }

    /// Replace the client configuration.
    #[must_use]
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach credentials to every subsequent request.
    pub fn login(&mut self, token: AuthToken) {
        self.auth = Some(token);
    }

    /// Drop credentials; subsequent requests are anonymous.
    pub fn logout(&mut self) {
        self.auth = None;
    }

    /// Whether requests carry credentials.
    pub fn is_logged_in(&self) -> bool {
        self.auth.is_some()
    }

    /// Current session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Whether an application is joined.
    pub fn is_joined(&self) -> bool {
        matches!(self.session, Session::Joined { .. })
    }

    /// Handle of the joined application.
    pub fn app_key(&self) -> Option<AppKey> {
        match &self.session {
            Session::Joined { app, .. } => Some(*app),
            Session::Unjoined => None,
        }
    }

    /// Name of the joined application.
    pub fn app_id(&self) -> Option<&str> {
        match &self.session {
            Session::Joined { app_id, .. } => Some(app_id),
            Session::Unjoined => None,
        }
    }

    /// Codec used for values.
    pub fn codec(&self) -> &K {
        &self.codec
    }

    /// Content hash of `value` as this client would store it.
    pub fn hash_value<T: Serialize>(&self, value: &T) -> Result<ContentHash, ClientError> {
        Ok(self.codec.hash_value(value)?)
    }

    /// Server protocol version.
    pub async fn version(&self) -> Result<String, ClientError> {
        match self.call(Command::Version).await? {
            Reply::Version(version) => Ok(version),
            other => Err(unexpected("version", &other)),
        }
    }

    /// Permission cache statistics.
    pub async fn stats(&self) -> Result<CacheStats, ClientError> {
        match self.call(Command::Stats).await? {
            Reply::Stats(stats) => Ok(stats),
            other => Err(unexpected("stats", &other)),
        }
    }

    /// Register `app_id` with this caller as admin, then join it.
    pub async fn register_app(
        &mut self,
        app_id: &str,
        read_mode: AccessMode,
        write_mode: AccessMode,
    ) -> Result<AppKey, ClientError> {
        let command = Command::RegisterApp { app_id: app_id.to_string(), read_mode, write_mode };
        let app = self.expect_app_key("registerApp", command).await?;

        tracing::info!(app_id, %app, "registered and joined");
        self.session = Session::Joined { app_id: app_id.to_string(), app };
        Ok(app)
    }

    /// Resolve `app_id` and join it.
    ///
    /// On failure the previous session is kept.
    pub async fn join(&mut self, app_id: &str) -> Result<AppKey, ClientError> {
        let command = Command::LookupApp { app_id: app_id.to_string() };
        let app = self.expect_app_key("lookupApp", command).await?;

        tracing::debug!(app_id, %app, "joined");
        self.session = Session::Joined { app_id: app_id.to_string(), app };
        Ok(app)
    }

    /// Leave the joined application. No round trip.
    pub fn leave(&mut self) {
        self.session = Session::Unjoined;
    }

    /// Delete the joined application and leave it.
    pub async fn delete_app(&mut self) -> Result<(), ClientError> {
        let app = self.joined()?;
        self.expect_ok("deleteApp", Command::DeleteApp { app }).await?;

        tracing::info!(%app, "deleted application");
        self.session = Session::Unjoined;
        Ok(())
    }

    /// Add `user` to the joined application's authorized list.
    pub async fn authorize(&self, user: &str) -> Result<(), ClientError> {
        let app = self.joined()?;
        self.expect_ok("authorize", Command::Authorize { app, user: user.to_string() }).await
    }

    /// Remove `user` from the joined application's authorized list.
    pub async fn unauthorize(&self, user: &str) -> Result<(), ClientError> {
        let app = self.joined()?;
        self.expect_ok("unauthorize", Command::Unauthorize { app, user: user.to_string() }).await
    }

    /// Add `user` to the joined application's banned list.
    pub async fn ban(&self, user: &str) -> Result<(), ClientError> {
        let app = self.joined()?;
        self.expect_ok("ban", Command::Ban { app, user: user.to_string() }).await
    }

    /// Remove `user` from the joined application's banned list.
    pub async fn unban(&self, user: &str) -> Result<(), ClientError> {
        let app = self.joined()?;
        self.expect_ok("unban", Command::Unban { app, user: user.to_string() }).await
    }

    /// Read and decode the value under `key`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, ClientError> {
        let raw = self.get_raw(key).await?;
        Ok(self.codec.decode(&raw)?)
    }

    /// Read the stored bytes under `key`.
    pub async fn get_raw(&self, key: &str) -> Result<Bytes, ClientError> {
        let app = self.joined()?;
        match self.call(Command::Get { app, key: key.to_string() }).await? {
            Reply::Value(value) => Ok(value),
            other => Err(unexpected("get", &other)),
        }
    }

    /// Read the value under `key` unless it still hashes to `known`.
    pub async fn get_if_changed<T: DeserializeOwned>(
        &self,
        key: &str,
        known: &ContentHash,
    ) -> Result<Fetched<T>, ClientError> {
        let app = self.joined()?;
        let command = Command::GetIfChanged { app, key: key.to_string(), known: *known };

        match self.call(command).await? {
            Reply::Unchanged => Ok(Fetched::Unchanged),
            Reply::Value(raw) => {
                let hash = ContentHash::of(&raw);
                Ok(Fetched::Changed { value: self.codec.decode(&raw)?, hash })
            },
            other => Err(unexpected("getIfChanged", &other)),
        }
    }

    /// Create or overwrite the value under `key`. Last write wins.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ClientError> {
        let value = self.codec.encode(value)?;
        self.set_raw(key, value).await
    }

    /// Store raw bytes under `key`.
    ///
    /// A value over the server's value limit fails with
    /// `SizeLimitExceeded`. A value so large that the request exceeds the
    /// channel's frame limit fails locally with a transport `Frame` error and
    /// is never sent.
    pub async fn set_raw(&self, key: &str, value: Bytes) -> Result<(), ClientError> {
        let app = self.joined()?;
        self.expect_ok("set", Command::Set { app, key: key.to_string(), value }).await
    }

    /// Remove the value under `key`.
    pub async fn delete(&self, key: &str) -> Result<(), ClientError> {
        let app = self.joined()?;
        self.expect_ok("delete", Command::Delete { app, key: key.to_string() }).await
    }

    /// Replace the value under `key` iff it still hashes to `expected`.
    pub async fn update<T: Serialize>(
        &self,
        key: &str,
        expected: &ContentHash,
        value: &T,
    ) -> Result<(), ClientError> {
        let value = self.codec.encode(value)?;
        self.update_raw(key, expected, value).await
    }

    /// Compare-and-swap raw bytes under `key`.
    pub async fn update_raw(
        &self,
        key: &str,
        expected: &ContentHash,
        value: Bytes,
    ) -> Result<(), ClientError> {
        let app = self.joined()?;
        let command = Command::Update { app, key: key.to_string(), expected: *expected, value };
        self.expect_ok("update", command).await
    }

    /// Apply `f` to the value under `key` atomically with respect to every
    /// other `apply_op` and `update` on that key, and return the value
    /// written.
    ///
    /// Reads the current value, computes `f(current)`, and swaps it in iff
    /// the stored value is still the one read. A lost race re-reads and
    /// reapplies `f`, so `f` must be pure: it can run more than once per
    /// call.
    ///
    /// If the key does not exist and `default` is given, `f(default)` is
    /// written with a plain `set`. This also applies when the key is deleted
    /// between the read and the compare-and-swap. That first write is not
    /// protected: concurrent creators race and the last one wins.
    ///
    /// # Errors
    ///
    /// - `KeyNotFound` if the key does not exist and no default is given.
    /// - `VersionMismatch` only if the retry policy is bounded and exhausted.
    /// - Any other failure is returned unchanged on first occurrence.
    pub async fn apply_op<T, F>(
        &self,
        key: &str,
        mut f: F,
        mut default: Option<T>,
    ) -> Result<T, ClientError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(T) -> T,
    {
        let started = self.env.now();
        let mut attempts = 0u32;

        loop {
            let raw = match self.get_raw(key).await {
                Ok(raw) => raw,
                Err(err) if err.is_key_not_found() => match default.take() {
                    Some(initial) => {
                        let value = f(initial);
                        self.set(key, &value).await?;
                        tracing::debug!(key, "apply_op created key");
                        return Ok(value);
                    },
                    None => return Err(err),
                },
                Err(err) => return Err(err),
            };

            let expected = ContentHash::of(&raw);
            let next = f(self.codec.decode(&raw)?);
            let encoded = self.codec.encode(&next)?;

            match self.update_raw(key, &expected, encoded).await {
                Ok(()) => {
                    if attempts > 0 {
                        let elapsed = self.env.now().saturating_duration_since(started);
                        tracing::debug!(key, retries = attempts, ?elapsed, "apply_op converged");
                    }
                    return Ok(next);
                },
                // Deleted since the read; the next read takes the create path
                Err(err) if err.is_key_not_found() && default.is_some() => {
                    tracing::debug!(key, "apply_op key deleted mid-round");
                },
                Err(err) if err.is_version_mismatch() => {
                    attempts = attempts.saturating_add(1);
                    let Some(delay) = self.config.retry.next_delay(attempts, self.env.random_u64())
                    else {
                        let elapsed = self.env.now().saturating_duration_since(started);
                        tracing::warn!(key, attempts, ?elapsed, "apply_op gave up under contention");
                        return Err(err);
                    };

                    tracing::trace!(key, attempts, ?delay, "apply_op lost race, retrying");
                    if !delay.is_zero() {
                        self.env.sleep(delay).await;
                    }
                },
                Err(err) => return Err(err),
            }
        }
    }

    fn joined(&self) -> Result<AppKey, ClientError> {
        self.app_key().ok_or(ClientError::NotJoined)
    }

    async fn call(&self, command: Command) -> Result<Reply, ClientError> {
        let request = Request { auth: self.auth.clone(), command };
        Ok(self.channel.call(request).await??)
    }

    async fn expect_ok(&self, name: &'static str, command: Command) -> Result<(), ClientError> {
        match self.call(command).await? {
            Reply::Ok => Ok(()),
            other => Err(unexpected(name, &other)),
        }
    }

    async fn expect_app_key(
        &self,
        name: &'static str,
        command: Command,
    ) -> Result<AppKey, ClientError> {
        match self.call(command).await? {
            Reply::AppKey(app) => Ok(app),
            other => Err(unexpected(name, &other)),
        }
    }
}

impl<C: Channel, E: Environment, K: Codec> std::fmt::Debug for StateClient<C, E, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateClient")
            .field("session", &self.session)
            .field("logged_in", &self.auth.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn unexpected(command: &'static str, reply: &Reply) -> ClientError {
    ClientError::UnexpectedReply { command, reply: format!("{reply:?}") }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::Mutex,
        time::{Duration, Instant},
    };

    use appstate_proto::{Access, ProtocolError, Response};
    use async_trait::async_trait;

    use super::*;
    use crate::{channel::ChannelError, retry::RetryPolicy};

    /// Replays scripted responses and records requests.
    #[derive(Default)]
    struct ScriptedChannel {
        responses: Mutex<VecDeque<Response>>,
        requests: Mutex<Vec<Request>>,
    }

    impl ScriptedChannel {
        fn new(responses: impl IntoIterator<Item = Response>) -> Self {
            Self { responses: Mutex::new(responses.into_iter().collect()), ..Self::default() }
        }

        fn commands(&self) -> Vec<&'static str> {
            self.requests.lock().unwrap().iter().map(|r| r.command.name()).collect()
        }
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        async fn call(&self, request: Request) -> Result<Response, ChannelError> {
            self.requests.lock().unwrap().push(request);
            self.responses.lock().unwrap().pop_front().ok_or(ChannelError::Closed)
        }
    }

    #[derive(Clone, Default)]
    struct TestEnv {
        slept: std::sync::Arc<Mutex<Vec<Duration>>>,
    }

    impl Environment for TestEnv {
        fn now(&self) -> Instant {
            Instant::now()
        }

        fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            self.slept.lock().unwrap().push(duration);
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(0);
        }
    }

    fn encoded(value: u64) -> Bytes {
        CborCodec.encode(&value).unwrap()
    }

    fn joined(responses: Vec<Response>) -> StateClient<std::sync::Arc<ScriptedChannel>, TestEnv> {
        let channel = std::sync::Arc::new(ScriptedChannel::new(responses));
        let mut client = StateClient::new(channel, TestEnv::default());
        client.session = Session::Joined { app_id: "demo".into(), app: AppKey::new(1) };
        client
    }

    #[tokio::test]
    async fn data_ops_require_join() {
        let channel = ScriptedChannel::new([]);
        let client = StateClient::new(channel, TestEnv::default());

        assert!(matches!(client.get::<u64>("k").await, Err(ClientError::NotJoined)));
        assert!(matches!(client.set("k", &1u64).await, Err(ClientError::NotJoined)));
        assert!(matches!(client.delete("k").await, Err(ClientError::NotJoined)));
        assert!(matches!(
            client.update("k", &ContentHash::of(b""), &1u64).await,
            Err(ClientError::NotJoined)
        ));
        assert!(matches!(
            client.get_if_changed::<u64>("k", &ContentHash::of(b"")).await,
            Err(ClientError::NotJoined)
        ));
        assert!(matches!(client.ban("U2").await, Err(ClientError::NotJoined)));
        assert!(client.channel.commands().is_empty());
    }

    #[tokio::test]
    async fn join_failure_keeps_session() {
        let channel = ScriptedChannel::new([
            Ok(Reply::AppKey(AppKey::new(5))),
            Err(ProtocolError::UnknownApplication { app: "other".into() }),
        ]);
        let mut client = StateClient::new(channel, TestEnv::default());

        client.join("demo").await.unwrap();
        let err = client.join("other").await.unwrap_err();

        assert!(matches!(err, ClientError::Protocol(ProtocolError::UnknownApplication { .. })));
        assert_eq!(client.app_key(), Some(AppKey::new(5)));
        assert_eq!(client.app_id(), Some("demo"));
    }

    #[tokio::test]
    async fn register_joins_and_delete_leaves() {
        let channel = ScriptedChannel::new([Ok(Reply::AppKey(AppKey::new(9))), Ok(Reply::Ok)]);
        let mut client = StateClient::new(channel, TestEnv::default());
        client.login(AuthToken::new("tok"));

        client.register_app("demo", AccessMode::Any, AccessMode::AdminOnly).await.unwrap();
        assert_eq!(client.app_key(), Some(AppKey::new(9)));

        client.delete_app().await.unwrap();
        assert_eq!(client.session(), &Session::Unjoined);

        let requests = client.channel.requests.lock().unwrap();
        assert!(requests.iter().all(|r| r.auth.is_some()));
    }

    #[tokio::test]
    async fn logout_sends_anonymous_requests() {
        let channel = ScriptedChannel::new([Ok(Reply::Version("v".into()))]);
        let mut client = StateClient::new(channel, TestEnv::default());
        client.login(AuthToken::new("tok"));
        client.logout();

        client.version().await.unwrap();
        assert_eq!(client.channel.requests.lock().unwrap()[0].auth, None);
    }

    #[tokio::test]
    async fn apply_op_retries_on_mismatch() {
        let client = joined(vec![
            Ok(Reply::Value(encoded(1))),
            Err(ProtocolError::VersionMismatch { key: "n".into() }),
            Ok(Reply::Value(encoded(5))),
            Ok(Reply::Ok),
        ]);

        let mut calls = 0;
        let result = client
            .apply_op(
                "n",
                |n: u64| {
                    calls += 1;
                    n + 1
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(result, 6);
        assert_eq!(calls, 2);
        assert_eq!(client.channel.commands(), ["get", "update", "get", "update"]);
    }

    #[tokio::test]
    async fn apply_op_hashes_received_bytes() {
        let raw = encoded(41);
        let client = joined(vec![Ok(Reply::Value(raw.clone())), Ok(Reply::Ok)]);

        client.apply_op("n", |n: u64| n + 1, None).await.unwrap();

        let requests = client.channel.requests.lock().unwrap();
        let Command::Update { expected, value, .. } = &requests[1].command else {
            panic!("expected update");
        };
        assert_eq!(*expected, ContentHash::of(&raw));
        assert_eq!(*value, encoded(42));
    }

    #[tokio::test]
    async fn apply_op_creates_with_default() {
        let client = joined(vec![Err(ProtocolError::KeyNotFound { key: "n".into() }), Ok(Reply::Ok)]);

        let value = client.apply_op("n", |n: u64| n + 1, Some(0)).await.unwrap();

        assert_eq!(value, 1);
        assert_eq!(client.channel.commands(), ["get", "set"]);
    }

    #[tokio::test]
    async fn apply_op_without_default_propagates_missing() {
        let client = joined(vec![Err(ProtocolError::KeyNotFound { key: "n".into() })]);

        let err = client.apply_op("n", |n: u64| n + 1, None).await.unwrap_err();
        assert!(err.is_key_not_found());
    }

    #[tokio::test]
    async fn apply_op_recreates_key_deleted_before_swap() {
        let missing = || -> Response { Err(ProtocolError::KeyNotFound { key: "n".into() }) };
        let client = joined(vec![Ok(Reply::Value(encoded(4))), missing(), missing(), Ok(Reply::Ok)]);

        let value = client.apply_op("n", |n: u64| n + 1, Some(0)).await.unwrap();

        assert_eq!(value, 1);
        assert_eq!(client.channel.commands(), ["get", "update", "get", "set"]);
    }

    #[tokio::test]
    async fn apply_op_without_default_reports_key_deleted_before_swap() {
        let client = joined(vec![
            Ok(Reply::Value(encoded(4))),
            Err(ProtocolError::KeyNotFound { key: "n".into() }),
        ]);

        let err = client.apply_op("n", |n: u64| n + 1, None).await.unwrap_err();
        assert!(err.is_key_not_found());
        assert_eq!(client.channel.commands(), ["get", "update"]);
    }

    #[tokio::test]
    async fn apply_op_propagates_permission_denied() {
        let client = joined(vec![
            Ok(Reply::Value(encoded(1))),
            Err(ProtocolError::PermissionDenied { access: Access::Write }),
        ]);

        let err = client.apply_op("n", |n: u64| n + 1, None).await.unwrap_err();
        assert_eq!(err.protocol(), Some(&ProtocolError::PermissionDenied { access: Access::Write }));
        assert_eq!(client.channel.commands(), ["get", "update"]);
    }

    #[tokio::test]
    async fn bounded_policy_gives_up_and_backs_off() {
        let mismatch = || Err(ProtocolError::VersionMismatch { key: "n".into() });
        let client = joined(vec![
            Ok(Reply::Value(encoded(1))),
            mismatch(),
            Ok(Reply::Value(encoded(2))),
            mismatch(),
            Ok(Reply::Value(encoded(3))),
            mismatch(),
        ])
        .with_config(ClientConfig {
            retry: RetryPolicy::Bounded { max_attempts: 3, initial_backoff_ms: 10, max_backoff_ms: 1000 },
        });

        let err = client.apply_op("n", |n: u64| n + 1, None).await.unwrap_err();

        assert!(err.is_version_mismatch());
        assert_eq!(client.channel.commands().len(), 6);
        // Zero jitter: half of 10ms, then half of 20ms
        assert_eq!(
            *client.env.slept.lock().unwrap(),
            [Duration::from_millis(5), Duration::from_millis(10)]
        );
    }

    #[tokio::test]
    async fn get_if_changed_decodes_and_hashes() {
        let raw = encoded(7);
        let client = joined(vec![Ok(Reply::Unchanged), Ok(Reply::Value(raw.clone()))]);

        let known = ContentHash::of(&raw);
        assert_eq!(client.get_if_changed::<u64>("n", &known).await.unwrap(), Fetched::Unchanged);
        assert_eq!(
            client.get_if_changed::<u64>("n", &ContentHash::of(b"old")).await.unwrap(),
            Fetched::Changed { value: 7, hash: known }
        );
    }

    #[tokio::test]
    async fn mismatched_reply_is_fatal() {
        let client = joined(vec![Ok(Reply::Unchanged)]);

        let err = client.get::<u64>("n").await.unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedReply { command: "get", .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn hash_value_matches_server_hash_of_encoding() {
        let client = StateClient::new(ScriptedChannel::new([]), TestEnv::default());
        assert_eq!(client.hash_value(&10u64).unwrap(), ContentHash::of(&encoded(10)));
    }
}

//! In-process deployment: one dispatcher, many logged-in clients.

use std::sync::Arc;

use appstate_client::StateClient;
use appstate_core::{CoreConfig, Dispatcher, MemoryStore, StaticIdentityProvider};
use appstate_proto::AuthToken;

use crate::{local_channel::LocalChannel, sim_env::SimEnv};

/// Client type used throughout the harness.
pub type SimClient = StateClient<LocalChannel<MemoryStore, SimEnv>, SimEnv>;

/// A server and a fixed population of users `U0..Un`.
pub struct SimWorld {
    dispatcher: Arc<Dispatcher<MemoryStore, SimEnv>>,
    store: Arc<MemoryStore>,
    env: SimEnv,
    users: usize,
}

impl SimWorld {
    /// Build a world with `users` known users and default limits.
    pub fn new(users: usize, seed: u64) -> Self {
        Self::with_config(users, seed, CoreConfig::default())
    }

    /// Build a world with explicit limits.
    pub fn with_config(users: usize, seed: u64, config: CoreConfig) -> Self {
        let env = SimEnv::with_seed(seed);
        let identity: StaticIdentityProvider =
            (0..users).map(|i| (Self::token(i), Self::user_name(i))).collect();
        let store = Arc::new(MemoryStore::new());
        let dispatcher =
            Dispatcher::new(Arc::clone(&store), config, Arc::new(identity), env.clone());

        Self { dispatcher: Arc::new(dispatcher), store, env, users }
    }

    /// Name of user `i`.
    pub fn user_name(i: usize) -> String {
        format!("U{i}")
    }

    /// Bearer token of user `i`.
    pub fn token(i: usize) -> String {
        format!("token-{i}")
    }

    /// Number of known users.
    pub fn users(&self) -> usize {
        self.users
    }

    /// Shared dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher<MemoryStore, SimEnv>> {
        &self.dispatcher
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// New client logged in as user `i`.
    pub fn client(&self, i: usize) -> SimClient {
        let mut client = self.anonymous_client();
        client.login(AuthToken::new(Self::token(i)));
        client
    }

    /// New client without credentials.
    pub fn anonymous_client(&self) -> SimClient {
        StateClient::new(LocalChannel::new(Arc::clone(&self.dispatcher)), self.env.clone())
    }
}

impl std::fmt::Debug for SimWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimWorld").field("users", &self.users).finish_non_exhaustive()
    }
}

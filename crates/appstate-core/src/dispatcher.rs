//! Command dispatcher.
//!
//! Resolves the caller from the request credentials, routes the command to
//! the registry or state handlers, and turns the outcome into a
//! [`Response`]. The dispatcher holds no per-connection state, so one
//! instance is shared by every connection task.

use std::sync::Arc;

use appstate_proto::{
    AccessMode, AppKey, Command, Identity, PROTOCOL_VERSION, ProtocolError, Reply, Request,
    Response,
};

use crate::{
    access::AccessControl,
    config::CoreConfig,
    env::Environment,
    identity::IdentityProvider,
    registry::ApplicationRegistry,
    state::StateStore,
    storage::Store,
};

/// Routes protocol requests to their handlers.
pub struct Dispatcher<S: Store, E: Environment> {
    registry: Arc<ApplicationRegistry<S>>,
    state: StateStore<S>,
    access: Arc<AccessControl>,
    identity: Arc<dyn IdentityProvider>,
    env: E,
}

impl<S: Store, E: Environment> Dispatcher<S, E> {
    /// Wire registry, state handlers, and permission cache over `store`.
    pub fn new(
        store: Arc<S>,
        config: CoreConfig,
        identity: Arc<dyn IdentityProvider>,
        env: E,
    ) -> Self {
        let access = Arc::new(AccessControl::new(config.permission_cache_capacity));
        let registry = Arc::new(ApplicationRegistry::new(Arc::clone(&store), Arc::clone(&access)));
        let state =
            StateStore::new(Arc::clone(&registry), store, Arc::clone(&access), config.max_value_size);

        Self { registry, state, access, identity, env }
    }

    /// Application registry.
    pub fn registry(&self) -> &ApplicationRegistry<S> {
        &self.registry
    }

    /// State handlers.
    pub fn state(&self) -> &StateStore<S> {
        &self.state
    }

    /// Handle one request.
    pub fn handle(&self, request: Request) -> Response {
        let name = request.command.name();

        let result = self
            .identity
            .resolve(request.auth.as_ref())
            .and_then(|caller| self.execute(&caller, request.command));

        match &result {
            Ok(_) => tracing::debug!(command = name, "handled"),
            Err(ProtocolError::Internal { reason }) => {
                tracing::error!(command = name, %reason, "internal error");
            },
            Err(e) => tracing::debug!(command = name, error = %e, "rejected"),
        }

        result
    }

    /// Execute `command` on behalf of an already resolved caller.
    pub fn execute(&self, caller: &Identity, command: Command) -> Response {
        match command {
            Command::Version => Ok(Reply::Version(PROTOCOL_VERSION.to_string())),
            Command::RegisterApp { app_id, read_mode, write_mode } => {
                self.register(&app_id, caller, read_mode, write_mode).map(Reply::AppKey)
            },
            Command::DeleteApp { app } => self.registry.delete(app, caller).map(|()| Reply::Ok),
            Command::LookupApp { app_id } => {
                self.registry.lookup(&app_id).map(|app| Reply::AppKey(app.key))
            },
            Command::Authorize { app, user } => {
                self.registry.authorize(app, caller, &user).map(|()| Reply::Ok)
            },
            Command::Unauthorize { app, user } => {
                self.registry.unauthorize(app, caller, &user).map(|()| Reply::Ok)
            },
            Command::Ban { app, user } => self.registry.ban(app, caller, &user).map(|()| Reply::Ok),
            Command::Unban { app, user } => {
                self.registry.unban(app, caller, &user).map(|()| Reply::Ok)
            },
            Command::Get { app, key } => self.state.get(app, &key, caller).map(Reply::Value),
            Command::GetIfChanged { app, key, known } => {
                match self.state.get_if_changed(app, &key, caller, &known)? {
                    Some(value) => Ok(Reply::Value(value)),
                    None => Ok(Reply::Unchanged),
                }
            },
            Command::Set { app, key, value } => {
                self.state.set(app, &key, caller, value).map(|()| Reply::Ok)
            },
            Command::Delete { app, key } => self.state.delete(app, &key, caller).map(|()| Reply::Ok),
            Command::Update { app, key, expected, value } => {
                self.state.update(app, &key, caller, &expected, value).map(|()| Reply::Ok)
            },
            Command::Stats => Ok(Reply::Stats(self.access.stats()?)),
        }
    }

    fn register(
        &self,
        app_id: &str,
        caller: &Identity,
        read_mode: AccessMode,
        write_mode: AccessMode,
    ) -> Result<AppKey, ProtocolError> {
        self.registry.register(app_id, caller, read_mode, write_mode, &self.env)
    }
}

impl<S: Store, E: Environment> std::fmt::Debug for Dispatcher<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("state", &self.state).finish_non_exhaustive()
    }
}

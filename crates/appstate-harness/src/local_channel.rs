//! In-process channel.
//!
//! Hands requests straight to a shared [`Dispatcher`], optionally yielding to
//! the runtime first so that concurrent clients interleave between the read
//! and the compare-and-swap of an `apply_op` round.

use std::sync::Arc;

use appstate_client::{Channel, ChannelError};
use appstate_core::{Dispatcher, Environment, Store};
use appstate_proto::{Request, Response};
use async_trait::async_trait;

/// Channel that calls a dispatcher in the same process.
pub struct LocalChannel<S: Store, E: Environment> {
    dispatcher: Arc<Dispatcher<S, E>>,
    yield_each_call: bool,
}

impl<S: Store, E: Environment> LocalChannel<S, E> {
    /// Channel to `dispatcher` that yields before every call.
    pub fn new(dispatcher: Arc<Dispatcher<S, E>>) -> Self {
        Self { dispatcher, yield_each_call: true }
    }

    /// Channel that never yields; calls complete synchronously.
    pub fn direct(dispatcher: Arc<Dispatcher<S, E>>) -> Self {
        Self { dispatcher, yield_each_call: false }
    }

    /// Dispatcher behind the channel.
    pub fn dispatcher(&self) -> &Arc<Dispatcher<S, E>> {
        &self.dispatcher
    }
}

impl<S: Store, E: Environment> Clone for LocalChannel<S, E> {
    fn clone(&self) -> Self {
        Self { dispatcher: Arc::clone(&self.dispatcher), yield_each_call: self.yield_each_call }
    }
}

#[async_trait]
impl<S: Store + 'static, E: Environment> Channel for LocalChannel<S, E> {
    async fn call(&self, request: Request) -> Result<Response, ChannelError> {
        if self.yield_each_call {
            tokio::task::yield_now().await;
        }
        Ok(self.dispatcher.handle(request))
    }
}

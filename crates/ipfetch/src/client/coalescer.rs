use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ipfetch_core::{FetchError, Fingerprint};
use ipfetch_http::Response;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Notify, broadcast};

type Shared = Result<Response, FetchError>;

/// At most one outbound transaction per fingerprint
///
/// The first caller for a fingerprint spawns the transaction; everyone who
/// arrives while it runs subscribes to its result. The transaction runs on
/// its own task, so a caller that gives up waiting does not cancel it.
#[derive(Clone, Default)]
pub(crate) struct Coalescer {
    inflight: Arc<DashMap<Fingerprint, broadcast::Sender<Shared>>>,
    idle: Arc<Notify>,
}

/// Removes the ticket when the transaction finishes or panics
struct Ticket {
    inflight: Arc<DashMap<Fingerprint, broadcast::Sender<Shared>>>,
    idle: Arc<Notify>,
    key: Fingerprint,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.inflight.remove(&self.key);
        self.idle.notify_waiters();
    }
}

impl Coalescer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Join the transaction for `key`, starting it with `task` if none is running
    pub(crate) async fn run<F, Fut>(&self, key: &Fingerprint, task: F) -> Shared
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Shared> + Send + 'static,
    {
        // The shard lock is held only while choosing a role
        let (mut rx, leader) = match self.inflight.entry(key.clone()) {
            Entry::Occupied(o) => (o.get().subscribe(), None),
            Entry::Vacant(v) => {
                let (tx, rx) = broadcast::channel(1);
                v.insert(tx.clone());
                (rx, Some(tx))
            }
        };

        match leader {
            Some(tx) => {
                let ticket = Ticket {
                    inflight: self.inflight.clone(),
                    idle: self.idle.clone(),
                    key: key.clone(),
                };
                let fut = task();
                tokio::spawn(async move {
                    let result = fut.await;
                    // Late arrivals start a new ticket rather than miss this send
                    drop(ticket);
                    let _ = tx.send(result);
                });
            }
            None => tracing::debug!(
                target: "ipfetch",
                fingerprint = key.short(),
                "joined in-flight request"
            ),
        }

        match rx.recv().await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Internal(format!(
                "in-flight request {} ended without a result",
                key.short()
            ))),
        }
    }

    /// Number of transactions currently running
    pub(crate) fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Wait until no transaction is running
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inflight.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

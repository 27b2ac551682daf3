//! Live subscriptions that keep client-side state in step with the store.
//!
//! Every subscription is a task guarded by a [`CancellationToken`] and owned
//! by a [`Registry`] slot. Replacing, cancelling or dropping the owner stops
//! the task, and synchronizers re-check the token under the state lock so no
//! update lands after teardown.

use std::collections::HashMap;
use std::env;
use std::fmt::Debug;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use log::{debug, error, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod conversations;
pub mod messages;

const MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Slot {
    ConversationList,
    MessageStream,
}

/// Retry policy of a live feed after it fails or ends.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    attempts: u32,
    base: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            attempts: 5,
            base: Duration::from_millis(200),
        }
    }
}

impl Config {
    pub fn new(attempts: u32, base: Duration) -> Self {
        Self { attempts, base }
    }

    pub fn env() -> Option<Self> {
        let attempts = env::var("FEED_RETRY_ATTEMPTS").ok()?.parse().ok()?;
        let base = env::var("FEED_RETRY_BASE_MS")
            .unwrap_or_else(|_| "200".to_string())
            .parse()
            .map(Duration::from_millis)
            .ok()?;

        Some(Self { attempts, base })
    }

    /// Delay before retry number `attempt` (1-based): doubles each time, capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(factor).min(MAX_DELAY)
    }
}

pub struct Subscription {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn spawn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::spawn(f(token.clone()));
        Self { token, handle }
    }

    pub fn cancel(&self) {
        self.token.cancel();
        self.handle.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Arena of live subscriptions, at most one per [`Slot`].
#[derive(Default)]
pub struct Registry {
    subscriptions: HashMap<Slot, Subscription>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `sub` in `slot`, cancelling whatever was there.
    pub fn insert(&mut self, slot: Slot, sub: Subscription) {
        if let Some(previous) = self.subscriptions.insert(slot, sub) {
            debug!("Replacing {slot:?} subscription");
            previous.cancel();
        }
    }

    pub fn cancel(&mut self, slot: Slot) -> bool {
        match self.subscriptions.remove(&slot) {
            Some(sub) => {
                debug!("Cancelling {slot:?} subscription");
                sub.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, slot: Slot) -> bool {
        self.subscriptions.get(&slot).is_some_and(Subscription::is_active)
    }

    pub fn active(&self) -> usize {
        self.subscriptions
            .values()
            .filter(|s| s.is_active())
            .count()
    }

    pub fn dispose(&mut self) {
        for (slot, sub) in self.subscriptions.drain() {
            debug!("Disposing {slot:?} subscription");
            sub.cancel();
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Drives a live feed until `token` is cancelled, handing every result set
/// to `apply`.
///
/// A failed or ended feed keeps the last applied state and is reopened with
/// exponential backoff. The retry budget resets whenever a result set arrives.
pub async fn follow<T, E, Open, Fut, Apply>(
    label: &str,
    retry: Config,
    token: CancellationToken,
    open: Open,
    mut apply: Apply,
) where
    E: Debug,
    Open: Fn() -> Fut,
    Fut: Future<Output = Result<BoxStream<'static, Result<T, E>>, E>>,
    Apply: FnMut(T),
{
    let mut failures = 0;

    loop {
        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            opened = open() => opened,
        };

        match opened {
            Ok(mut feed) => loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    next = feed.next() => next,
                };

                match next {
                    Some(Ok(items)) => {
                        failures = 0;
                        apply(items);
                    }
                    Some(Err(e)) => {
                        error!("{label} feed failed: {e:?}");
                        break;
                    }
                    None => {
                        warn!("{label} feed ended");
                        break;
                    }
                }
            },
            Err(e) => error!("Could not open {label} feed: {e:?}"),
        }

        failures += 1;
        if failures > retry.attempts {
            error!("Giving up on {label} feed after {} attempts", retry.attempts);
            return;
        }

        let delay = retry.delay(failures);
        debug!("Reopening {label} feed in {delay:?}");
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

//! In-memory stand-ins for the store, the bus and the cache.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::{broadcast, watch};

use crate::conversation::{
    self,
    model::{Conversation, NewConversation, Summary},
    repository::ConversationRepository,
    service::ConversationServiceImpl,
};
use crate::event::{Notification, NotificationStream, Subject, service::EventService};
use crate::integration::cache::{Cache, Key};
use crate::message::{
    self,
    model::{Message, NewMessage},
    repository::MessageRepository,
    service::MessageServiceImpl,
};
use crate::{auth, sync, user};

static CLOCK: AtomicI64 = AtomicI64::new(0);

/// Store clock: strictly increasing, like `clock_timestamp()` across statements.
pub fn now() -> DateTime<Utc> {
    let wall = Utc::now().timestamp_micros();
    let prev = CLOCK
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(wall.max(last + 1))
        })
        .unwrap();
    DateTime::from_timestamp_micros(wall.max(prev + 1)).unwrap()
}

pub async fn timeout<F: Future>(f: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(2), f)
        .await
        .expect("timed out")
}

pub async fn wait_for<T: Clone>(rx: &mut watch::Receiver<T>, pred: impl FnMut(&T) -> bool) -> T {
    let state = timeout(rx.wait_for(pred)).await.expect("sender dropped");
    T::clone(&state)
}

const SECRET: &str = "s3cret";

pub fn verifier() -> auth::Verifier {
    auth::Verifier::new(&auth::Config::new(SECRET, None, "/login"))
}

/// A token `verifier()` accepts for `sub`.
pub fn token(sub: &str) -> String {
    #[derive(serde::Serialize)]
    struct Claims<'a> {
        sub: &'a str,
        exp: i64,
    }

    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &Claims {
            sub,
            exp: Utc::now().timestamp() + 600,
        },
        &jsonwebtoken::EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn broken() -> diesel::result::Error {
    diesel::result::Error::BrokenTransactionManager
}

#[derive(Default)]
pub struct MemConversationRepository {
    conversations: Mutex<Vec<Conversation>>,
    fail_summaries: AtomicBool,
}

impl MemConversationRepository {
    pub fn count(&self) -> usize {
        self.conversations.lock().unwrap().len()
    }

    pub fn fail_summaries(&self, fail: bool) {
        self.fail_summaries.store(fail, Ordering::SeqCst);
    }
}

impl ConversationRepository for MemConversationRepository {
    fn find_by_id(&self, id: &conversation::Id) -> conversation::Result<Conversation> {
        self.conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id() == id)
            .cloned()
            .ok_or(conversation::Error::NotFound(id.clone()))
    }

    fn find_by_participant(&self, user: &user::Id) -> conversation::Result<Vec<Conversation>> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.involves(user))
            .cloned()
            .collect())
    }

    fn create(&self, c: &NewConversation) -> conversation::Result<Conversation> {
        let created = Conversation::new(
            c.id().clone(),
            c.participants().clone(),
            c.participant_names().clone(),
            Some(c.last_message().to_owned()),
            Some(now()),
        );
        self.conversations.lock().unwrap().push(created.clone());
        Ok(created)
    }

    fn update_summary(
        &self,
        id: &conversation::Id,
        s: &Summary,
    ) -> conversation::Result<Conversation> {
        if self.fail_summaries.load(Ordering::SeqCst) {
            return Err(broken().into());
        }

        let mut conversations = self.conversations.lock().unwrap();
        let c = conversations
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or(conversation::Error::NotFound(id.clone()))?;

        *c = Conversation::new(
            c.id().clone(),
            c.participants().clone(),
            c.participant_names().clone(),
            Some(s.text().to_owned()),
            Some(*s.time()),
        );
        Ok(c.clone())
    }
}

#[derive(Default)]
pub struct MemMessageRepository {
    messages: Mutex<Vec<Message>>,
    fail_appends: AtomicBool,
}

impl MemMessageRepository {
    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

impl MessageRepository for MemMessageRepository {
    fn find_by_conversation(&self, id: &conversation::Id) -> message::Result<Vec<Message>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.conversation_id() == id)
            .cloned()
            .collect())
    }

    fn append(&self, m: &NewMessage) -> message::Result<Message> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(broken().into());
        }

        let stored = Message::new(
            m.id().clone(),
            m.conversation_id().clone(),
            m.sender_id().clone(),
            m.text(),
            now(),
        );
        self.messages.lock().unwrap().push(stored.clone());
        Ok(stored)
    }
}

/// Process-local bus. [`LocalEventService::disconnect`] ends every open
/// subscription, as a dropped NATS connection would.
pub struct LocalEventService {
    tx: Mutex<broadcast::Sender<(String, Notification)>>,
    subscriptions: AtomicUsize,
}

impl LocalEventService {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            tx: Mutex::new(tx),
            subscriptions: AtomicUsize::new(0),
        }
    }

    pub fn disconnect(&self) {
        let (tx, _) = broadcast::channel(64);
        *self.tx.lock().unwrap() = tx;
    }

    /// Subscriptions opened so far.
    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventService for LocalEventService {
    async fn publish(&self, s: &Subject<'_>, n: &Notification) {
        let _ = self.tx.lock().unwrap().send((s.to_string(), n.clone()));
    }

    async fn subscribe(&self, s: &Subject<'_>) -> crate::event::Result<NotificationStream> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.tx.lock().unwrap().subscribe();
        let subject = s.to_string();

        let stream = async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok((s, n)) if s == subject => yield n,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        Ok(stream.boxed())
    }
}

#[derive(Default)]
pub struct MemCache {
    sets: Mutex<HashMap<String, HashSet<String>>>,
}

impl MemCache {
    pub fn contains(&self, key: &str) -> bool {
        self.sets.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl Cache for MemCache {
    async fn smembers(&self, key: &Key<'_>) -> Option<HashSet<String>> {
        self.sets.lock().unwrap().get(&key.to_string()).cloned()
    }

    async fn sadd_ex(&self, key: &Key<'_>, members: &[String], _ttl: i64) {
        self.sets
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .extend(members.iter().cloned());
    }
}

/// Services wired over the in-memory fakes.
pub struct Fixture {
    pub conversation_repo: Arc<MemConversationRepository>,
    pub message_repo: Arc<MemMessageRepository>,
    pub events: Arc<LocalEventService>,
    pub cache: Arc<MemCache>,
    pub conversations: conversation::Service,
    pub messages: message::Service,
    pub retry: sync::Config,
}

impl Fixture {
    pub fn new() -> Self {
        let conversation_repo = Arc::new(MemConversationRepository::default());
        let message_repo = Arc::new(MemMessageRepository::default());
        let events = Arc::new(LocalEventService::new());
        let cache = Arc::new(MemCache::default());

        let conversations: conversation::Service = Arc::new(ConversationServiceImpl::new(
            conversation_repo.clone(),
            events.clone(),
            cache.clone(),
        ));
        let messages: message::Service = Arc::new(MessageServiceImpl::new(
            message_repo.clone(),
            conversations.clone(),
            events.clone(),
        ));

        Self {
            conversation_repo,
            message_repo,
            events,
            cache,
            conversations,
            messages,
            retry: sync::Config::new(3, Duration::from_millis(5)),
        }
    }

    pub fn conversation_service(&self) -> ConversationServiceImpl {
        ConversationServiceImpl::new(
            self.conversation_repo.clone(),
            self.events.clone(),
            self.cache.clone(),
        )
    }
}

use std::sync::Arc;

use log::debug;
use tokio::sync::watch;

use crate::conversation::{
    self,
    model::{ConversationDto, project},
    service::ConversationService,
};
use crate::user;

use super::{Config, Registry, Slot, Subscription, follow};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationListState {
    loading: bool,
    items: Vec<ConversationDto>,
    query: String,
}

impl ConversationListState {
    pub const fn loading(&self) -> bool {
        self.loading
    }

    /// All conversations, most recent first.
    pub fn items(&self) -> &[ConversationDto] {
        &self.items
    }

    /// Conversations matching the current search query.
    pub fn visible(&self) -> Vec<ConversationDto> {
        self.items
            .iter()
            .filter(|c| c.matches(&self.query))
            .cloned()
            .collect()
    }

    pub fn name_of(&self, id: &conversation::Id) -> Option<&str> {
        self.items.iter().find(|c| c.id() == id).map(|c| c.name())
    }
}

/// Keeps the signed-in user's conversation list live and sorted.
pub struct ConversationList {
    tx: Arc<watch::Sender<ConversationListState>>,
    owner: Option<user::Id>,
    service: conversation::Service,
    retry: Config,
}

impl ConversationList {
    pub fn new(service: conversation::Service, retry: Config) -> Self {
        let (tx, _) = watch::channel(ConversationListState::default());
        Self {
            tx: Arc::new(tx),
            owner: None,
            service,
            retry,
        }
    }

    /// Starts following `user`'s conversations. Returns `false` when that
    /// subscription is already live.
    pub fn start(&mut self, registry: &mut Registry, user: &user::Id) -> bool {
        if self.owner.as_ref() == Some(user) && registry.is_active(Slot::ConversationList) {
            return false;
        }

        registry.cancel(Slot::ConversationList);
        self.tx.send_modify(|s| {
            s.loading = true;
            s.items.clear();
        });

        let tx = self.tx.clone();
        let service = self.service.clone();
        let retry = self.retry;
        let me = user.clone();

        let sub = Subscription::spawn(move |token| async move {
            follow(
                "conversation list",
                retry,
                token.clone(),
                || service.watch(&me),
                |conversations| {
                    let items = project(&conversations, &me);
                    tx.send_if_modified(|s| {
                        if token.is_cancelled() {
                            return false;
                        }
                        s.loading = false;
                        s.items = items;
                        true
                    });
                },
            )
            .await;
        });

        debug!("Following conversations of {user}");
        registry.insert(Slot::ConversationList, sub);
        self.owner = Some(user.clone());
        true
    }

    /// Stops following and forgets the list.
    pub fn stop(&mut self, registry: &mut Registry) {
        registry.cancel(Slot::ConversationList);
        self.owner = None;
        self.tx.send_replace(ConversationListState::default());
    }

    pub fn set_query(&self, query: &str) {
        self.tx.send_if_modified(|s| {
            if s.query == query {
                return false;
            }
            s.query = query.to_owned();
            true
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationListState> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> ConversationListState {
        self.tx.borrow().clone()
    }

    pub const fn owner(&self) -> Option<&user::Id> {
        self.owner.as_ref()
    }
}

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use log::{debug, info};

use crate::event::{self, Notification, Subject, service::EventService};
use crate::integration::{
    cache::{self, Cache, Key, PARTICIPANTS_TTL},
    db,
};
use crate::{auth, user};

use super::model::{Conversation, Inquiry, NewConversation, Summary};
use super::repository::ConversationRepository;
use super::{Error, Id, Repository};

/// Live result set of a conversation query, re-read on every change.
pub type Feed = BoxStream<'static, super::Result<Vec<Conversation>>>;

#[async_trait]
pub trait ConversationService {
    /// Returns the conversation between `me` and the inquiry's seller,
    /// creating it on first contact.
    async fn open_or_create(&self, me: &auth::User, inquiry: &Inquiry) -> super::Result<Id>;

    async fn find_by_id(&self, id: &Id) -> super::Result<Conversation>;

    async fn find_by_participant(&self, user: &user::Id) -> super::Result<Vec<Conversation>>;

    async fn update_summary(&self, id: &Id, summary: &Summary) -> super::Result<()>;

    async fn check_member(&self, id: &Id, user: &user::Id) -> super::Result<()>;

    async fn watch(&self, user: &user::Id) -> super::Result<Feed>;
}

#[derive(Clone)]
pub struct ConversationServiceImpl {
    repo: Repository,
    event_service: event::Service,
    cache: cache::Service,
}

impl ConversationServiceImpl {
    pub fn new(repo: Repository, event_service: event::Service, cache: cache::Service) -> Self {
        Self {
            repo,
            event_service,
            cache,
        }
    }

    async fn announce(&self, c: &Conversation) {
        let n = Notification::ConversationChanged { id: c.id().clone() };
        for p in c.participants() {
            self.event_service
                .publish(&Subject::Conversations(p), &n)
                .await;
        }
    }
}

#[async_trait]
impl ConversationService for ConversationServiceImpl {
    async fn open_or_create(&self, me: &auth::User, inquiry: &Inquiry) -> super::Result<Id> {
        if inquiry.is_demo() {
            return Err(Error::DemoItem);
        }

        let seller = inquiry.seller_id().ok_or(Error::MissingCounterpart)?;
        if seller == me.id() {
            return Err(Error::SelfContact);
        }

        let existing = self.find_by_participant(me.id()).await?;
        if let Some(c) = existing.iter().find(|c| c.involves(seller)) {
            debug!("Reusing conversation {} with {seller}", c.id());
            return Ok(c.id().clone());
        }

        let new = NewConversation::new(me, seller, inquiry);
        let repo = self.repo.clone();
        let created = db::blocking(move || repo.create(&new)).await?;
        info!(
            "Created conversation {} between {} and {seller}",
            created.id(),
            me.id()
        );

        self.announce(&created).await;
        Ok(created.id().clone())
    }

    async fn find_by_id(&self, id: &Id) -> super::Result<Conversation> {
        let repo = self.repo.clone();
        let id = id.clone();
        db::blocking(move || repo.find_by_id(&id)).await
    }

    async fn find_by_participant(&self, user: &user::Id) -> super::Result<Vec<Conversation>> {
        let repo = self.repo.clone();
        let user = user.clone();
        db::blocking(move || repo.find_by_participant(&user)).await
    }

    async fn update_summary(&self, id: &Id, summary: &Summary) -> super::Result<()> {
        let repo = self.repo.clone();
        let (id, summary) = (id.clone(), summary.clone());
        let updated = db::blocking(move || repo.update_summary(&id, &summary)).await?;

        self.announce(&updated).await;
        Ok(())
    }

    async fn check_member(&self, id: &Id, user: &user::Id) -> super::Result<()> {
        let key = Key::Participants(id);

        let is_member = match self.cache.smembers(&key).await {
            Some(members) => members.contains(user.as_str()),
            None => {
                let c = self.find_by_id(id).await?;
                let members = c
                    .participants()
                    .iter()
                    .map(|p| p.as_str().to_owned())
                    .collect::<Vec<_>>();
                self.cache.sadd_ex(&key, &members, PARTICIPANTS_TTL).await;
                c.involves(user)
            }
        };

        if !is_member {
            return Err(Error::NotMember);
        }

        Ok(())
    }

    async fn watch(&self, user: &user::Id) -> super::Result<Feed> {
        // Subscribe before the first read so no change slips in between.
        let mut changes = self
            .event_service
            .subscribe(&Subject::Conversations(user))
            .await?;

        let repo = self.repo.clone();
        let user = user.clone();

        let feed = async_stream::stream! {
            loop {
                let (repo, user) = (repo.clone(), user.clone());
                yield db::blocking(move || repo.find_by_participant(&user)).await;

                if changes.next().await.is_none() {
                    debug!("Conversation changes ended");
                    break;
                }
            }
        };

        Ok(feed.boxed())
    }
}

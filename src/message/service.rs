use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use log::{debug, warn};

use crate::conversation::{self, model::Summary, service::ConversationService};
use crate::event::{self, Notification, Subject, service::EventService};
use crate::integration::db;
use crate::{auth, user};

use super::Repository;
use super::model::{Draft, Message, NewMessage};
use super::repository::MessageRepository;

/// Live, ascending message list of one conversation.
pub type Feed = BoxStream<'static, super::Result<Vec<Message>>>;

#[async_trait]
pub trait MessageService {
    /// Appends the draft as a message and refreshes the conversation summary.
    ///
    /// Nothing is written when there is no sender, no conversation or only
    /// whitespace to send; `Ok(None)` is returned then. The draft is cleared
    /// only after the message is stored.
    async fn send(
        &self,
        sender: Option<&auth::User>,
        conversation_id: Option<&conversation::Id>,
        draft: &mut Draft,
    ) -> super::Result<Option<Message>>;

    async fn find_by_conversation(
        &self,
        user: &user::Id,
        id: &conversation::Id,
    ) -> super::Result<Vec<Message>>;

    async fn watch(&self, id: &conversation::Id) -> super::Result<Feed>;
}

#[derive(Clone)]
pub struct MessageServiceImpl {
    repo: Repository,
    conversation_service: conversation::Service,
    event_service: event::Service,
}

impl MessageServiceImpl {
    pub fn new(
        repo: Repository,
        conversation_service: conversation::Service,
        event_service: event::Service,
    ) -> Self {
        Self {
            repo,
            conversation_service,
            event_service,
        }
    }
}

#[async_trait]
impl MessageService for MessageServiceImpl {
    async fn send(
        &self,
        sender: Option<&auth::User>,
        conversation_id: Option<&conversation::Id>,
        draft: &mut Draft,
    ) -> super::Result<Option<Message>> {
        let (Some(sender), Some(conversation_id)) = (sender, conversation_id) else {
            return Ok(None);
        };
        if draft.is_blank() {
            return Ok(None);
        }

        self.conversation_service
            .check_member(conversation_id, sender.id())
            .await?;

        let new = NewMessage::new(conversation_id, sender.id(), draft.as_str());
        let repo = self.repo.clone();
        let msg = db::blocking(move || repo.append(&new)).await?;
        draft.clear();
        debug!("Stored message {} in {conversation_id}", msg.id());

        self.event_service
            .publish(
                &Subject::Messages(conversation_id),
                &Notification::MessageAppended {
                    conversation_id: conversation_id.clone(),
                    id: msg.id().clone(),
                },
            )
            .await;

        // The message is already stored; a stale preview heals on the next send.
        let summary = Summary::new(msg.text(), *msg.created_at());
        if let Err(e) = self
            .conversation_service
            .update_summary(conversation_id, &summary)
            .await
        {
            warn!("Summary of {conversation_id} not updated: {e:?}");
        }

        Ok(Some(msg))
    }

    async fn find_by_conversation(
        &self,
        user: &user::Id,
        id: &conversation::Id,
    ) -> super::Result<Vec<Message>> {
        self.conversation_service.check_member(id, user).await?;

        let repo = self.repo.clone();
        let id = id.clone();
        db::blocking(move || repo.find_by_conversation(&id)).await
    }

    async fn watch(&self, id: &conversation::Id) -> super::Result<Feed> {
        let mut changes = self.event_service.subscribe(&Subject::Messages(id)).await?;

        let repo = self.repo.clone();
        let id = id.clone();

        let feed = async_stream::stream! {
            loop {
                let (repo, id) = (repo.clone(), id.clone());
                yield db::blocking(move || repo.find_by_conversation(&id)).await;

                if changes.next().await.is_none() {
                    debug!("Message changes ended");
                    break;
                }
            }
        };

        Ok(feed.boxed())
    }
}

#[cfg(test)]
mod test {
    use crate::conversation::model::Inquiry;
    use crate::message::Error;
    use crate::testing::{self, Fixture};

    use super::*;

    async fn open(f: &Fixture, buyer: &auth::User, seller: &str) -> conversation::Id {
        let inquiry = Inquiry::new("L1", "Blue Jeans", Some(user::Id::new(seller)), None);
        f.conversations.open_or_create(buyer, &inquiry).await.unwrap()
    }

    #[tokio::test]
    async fn should_store_message_and_update_summary() {
        let f = Fixture::new();
        let u1 = auth::User::new("u1", None);
        let id = open(&f, &u1, "s1").await;

        let mut draft = Draft::new("Is this still available?");
        let msg = f
            .messages
            .send(Some(&u1), Some(&id), &mut draft)
            .await
            .unwrap()
            .unwrap();

        assert!(draft.as_str().is_empty());
        assert_eq!(msg.sender_id(), u1.id());
        assert_eq!(msg.text(), "Is this still available?");

        let c = f.conversations.find_by_id(&id).await.unwrap();
        assert_eq!(c.last_message(), Some("Is this still available?"));
        assert_eq!(c.last_message_time(), Some(msg.created_at()));
    }

    #[tokio::test]
    async fn should_ignore_blank_or_incomplete_sends() {
        let f = Fixture::new();
        let u1 = auth::User::new("u1", None);
        let id = open(&f, &u1, "s1").await;

        let mut blank = Draft::new("   ");
        let res = f.messages.send(Some(&u1), Some(&id), &mut blank).await;
        assert!(matches!(res, Ok(None)));
        assert_eq!(blank.as_str(), "   ");

        let mut draft = Draft::new("hi");
        assert!(matches!(
            f.messages.send(None, Some(&id), &mut draft).await,
            Ok(None)
        ));
        assert!(matches!(
            f.messages.send(Some(&u1), None, &mut draft).await,
            Ok(None)
        ));

        assert_eq!(draft.as_str(), "hi");
        assert_eq!(f.message_repo.count(), 0);
        let c = f.conversations.find_by_id(&id).await.unwrap();
        assert_eq!(c.last_message(), Some("Inquired about: Blue Jeans"));
    }

    #[tokio::test]
    async fn should_keep_draft_when_append_fails() {
        let f = Fixture::new();
        let u1 = auth::User::new("u1", None);
        let id = open(&f, &u1, "s1").await;
        f.message_repo.fail_appends(true);

        let mut draft = Draft::new("hello");
        let res = f.messages.send(Some(&u1), Some(&id), &mut draft).await;

        assert!(res.is_err());
        assert_eq!(draft.as_str(), "hello");
        let c = f.conversations.find_by_id(&id).await.unwrap();
        assert_eq!(c.last_message(), Some("Inquired about: Blue Jeans"));
    }

    #[tokio::test]
    async fn should_swallow_summary_failure() {
        let f = Fixture::new();
        let u1 = auth::User::new("u1", None);
        let id = open(&f, &u1, "s1").await;
        f.conversation_repo.fail_summaries(true);

        let mut draft = Draft::new("hello");
        let msg = f.messages.send(Some(&u1), Some(&id), &mut draft).await.unwrap();

        assert!(msg.is_some());
        assert!(draft.as_str().is_empty());
        assert_eq!(f.message_repo.count(), 1);
    }

    #[tokio::test]
    async fn should_reject_non_participant() {
        let f = Fixture::new();
        let u1 = auth::User::new("u1", None);
        let id = open(&f, &u1, "s1").await;
        let stranger = auth::User::new("x", None);

        let mut draft = Draft::new("hi");
        let res = f.messages.send(Some(&stranger), Some(&id), &mut draft).await;

        assert!(matches!(
            res,
            Err(Error::_Conversation(conversation::Error::NotMember))
        ));
        assert_eq!(f.message_repo.count(), 0);
    }

    #[tokio::test]
    async fn should_list_messages_in_send_order() {
        let f = Fixture::new();
        let u1 = auth::User::new("u1", None);
        let s1 = auth::User::new("s1", None);
        let id = open(&f, &u1, "s1").await;

        for (sender, text) in [(&u1, "a"), (&s1, "b"), (&u1, "c")] {
            let mut draft = Draft::new(text);
            f.messages.send(Some(sender), Some(&id), &mut draft).await.unwrap();
        }

        let texts = f
            .messages
            .find_by_conversation(s1.id(), &id)
            .await
            .unwrap()
            .iter()
            .map(|m| m.text().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn should_emit_messages_on_append() {
        let f = Fixture::new();
        let u1 = auth::User::new("u1", None);
        let id = open(&f, &u1, "s1").await;

        let mut feed = f.messages.watch(&id).await.unwrap();
        assert!(feed.next().await.unwrap().unwrap().is_empty());

        let mut draft = Draft::new("hi");
        f.messages.send(Some(&u1), Some(&id), &mut draft).await.unwrap();

        let items = testing::timeout(feed.next()).await.unwrap().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text(), "hi");
    }
}

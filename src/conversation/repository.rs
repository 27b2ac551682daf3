use std::collections::HashMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::integration::db;
use crate::schema::conversations;
use crate::user;

use super::model::{Conversation, NewConversation, Summary};
use super::{Error, Id};

pub trait ConversationRepository {
    fn find_by_id(&self, id: &Id) -> super::Result<Conversation>;

    /// Every conversation whose participants contain `user`, in no particular order.
    fn find_by_participant(&self, user: &user::Id) -> super::Result<Vec<Conversation>>;

    fn create(&self, c: &NewConversation) -> super::Result<Conversation>;

    fn update_summary(&self, id: &Id, s: &Summary) -> super::Result<Conversation>;
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = conversations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct ConversationRow {
    id: Uuid,
    participants: Vec<String>,
    participant_names: serde_json::Value,
    last_message: Option<String>,
    last_message_time: Option<DateTime<Utc>>,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = Error;

    fn try_from(row: ConversationRow) -> super::Result<Self> {
        let id = Id::from(row.id);

        let participants: [user::Id; 2] = match row.participants.as_slice() {
            [a, b] => [user::Id::new(a.as_str()), user::Id::new(b.as_str())],
            other => {
                return Err(Error::Malformed(
                    id,
                    format!("expected 2 participants, got {}", other.len()),
                ));
            }
        };

        let participant_names =
            serde_json::from_value::<HashMap<user::Id, String>>(row.participant_names)
                .map_err(|e| Error::Malformed(id.clone(), e.to_string()))?;

        Ok(Conversation::new(
            id,
            participants,
            participant_names,
            row.last_message,
            row.last_message_time,
        ))
    }
}

#[derive(Insertable)]
#[diesel(table_name = conversations)]
struct NewConversationRow<'a> {
    id: &'a Uuid,
    participants: Vec<String>,
    participant_names: serde_json::Value,
    last_message: &'a str,
}

impl<'a> TryFrom<&'a NewConversation> for NewConversationRow<'a> {
    type Error = Error;

    fn try_from(c: &'a NewConversation) -> super::Result<Self> {
        let participant_names = serde_json::to_value(c.participant_names())
            .map_err(|e| Error::Malformed(c.id().clone(), e.to_string()))?;

        Ok(Self {
            id: c.id().get(),
            participants: c
                .participants()
                .iter()
                .map(|p| p.as_str().to_owned())
                .collect(),
            participant_names,
            last_message: c.last_message(),
        })
    }
}

pub struct PgConversationRepository {
    pool: db::Pool,
}

impl PgConversationRepository {
    pub fn new(pool: db::Pool) -> Self {
        Self { pool }
    }
}

impl ConversationRepository for PgConversationRepository {
    fn find_by_id(&self, id: &Id) -> super::Result<Conversation> {
        let mut conn = self.pool.get()?;

        let row = conversations::table
            .find(id.get())
            .select(ConversationRow::as_select())
            .first(&mut conn)
            .optional()?;

        row.ok_or(Error::NotFound(id.clone()))?.try_into()
    }

    fn find_by_participant(&self, user: &user::Id) -> super::Result<Vec<Conversation>> {
        let mut conn = self.pool.get()?;

        let rows = conversations::table
            .filter(conversations::participants.contains(vec![user.as_str().to_owned()]))
            .select(ConversationRow::as_select())
            .load(&mut conn)?;

        rows.into_iter().map(Conversation::try_from).collect()
    }

    fn create(&self, c: &NewConversation) -> super::Result<Conversation> {
        let mut conn = self.pool.get()?;

        let row = diesel::insert_into(conversations::table)
            .values(NewConversationRow::try_from(c)?)
            .returning(ConversationRow::as_returning())
            .get_result(&mut conn)?;

        row.try_into()
    }

    fn update_summary(&self, id: &Id, s: &Summary) -> super::Result<Conversation> {
        let mut conn = self.pool.get()?;

        let row = diesel::update(conversations::table.find(id.get()))
            .set((
                conversations::last_message.eq(s.text()),
                conversations::last_message_time.eq(s.time()),
            ))
            .returning(ConversationRow::as_returning())
            .get_result(&mut conn)
            .optional()?;

        row.ok_or(Error::NotFound(id.clone()))?.try_into()
    }
}

#[cfg(test)]
mod test {
    use testcontainers_modules::{postgres::Postgres, testcontainers::runners::AsyncRunner};

    use crate::{auth, conversation::model::Inquiry};

    use super::*;

    fn new_conversation(me: &str, seller: &str) -> NewConversation {
        let inquiry = Inquiry::new("L1", "Blue Jeans", Some(user::Id::new(seller)), Some("Ana"));
        NewConversation::new(
            &auth::User::new(me, Some("Jora")),
            &user::Id::new(seller),
            &inquiry,
        )
    }

    #[tokio::test]
    async fn should_create_and_find_by_id() {
        let node = Postgres::default().start().await.unwrap();
        let repo = PgConversationRepository::new(db::Config::test(&node).await);

        let new = new_conversation("jora", "valera");
        let created = repo.create(&new).unwrap();

        assert_eq!(created.id(), new.id());
        assert_eq!(created.last_message(), Some("Inquired about: Blue Jeans"));
        assert!(created.last_message_time().is_some());
        assert_eq!(created.display_name(&user::Id::new("jora")), "Ana");

        let found = repo.find_by_id(new.id()).unwrap();
        assert_eq!(found, created);
    }

    #[tokio::test]
    async fn should_not_find_unknown_conversation() {
        let node = Postgres::default().start().await.unwrap();
        let repo = PgConversationRepository::new(db::Config::test(&node).await);

        let id = Id::random();
        let res = repo.find_by_id(&id);

        assert!(matches!(res, Err(Error::NotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn should_find_by_participant_in_either_position() {
        let node = Postgres::default().start().await.unwrap();
        let repo = PgConversationRepository::new(db::Config::test(&node).await);

        let c1 = repo.create(&new_conversation("jora", "valera")).unwrap();
        let c2 = repo.create(&new_conversation("radu", "jora")).unwrap();
        repo.create(&new_conversation("radu", "valera")).unwrap();

        let mut found = repo
            .find_by_participant(&user::Id::new("jora"))
            .unwrap()
            .into_iter()
            .map(|c| c.id().clone())
            .collect::<Vec<_>>();
        found.sort_by_key(|id| *id.get());

        let mut expected = vec![c1.id().clone(), c2.id().clone()];
        expected.sort_by_key(|id| *id.get());

        assert_eq!(found, expected);
    }

    #[tokio::test]
    async fn should_update_summary() {
        let node = Postgres::default().start().await.unwrap();
        let repo = PgConversationRepository::new(db::Config::test(&node).await);

        let created = repo.create(&new_conversation("jora", "valera")).unwrap();
        let time = Utc::now();

        let updated = repo
            .update_summary(created.id(), &Summary::new("Is this still available?", time))
            .unwrap();

        assert_eq!(updated.last_message(), Some("Is this still available?"));
        assert_eq!(
            updated.last_message_time().map(|t| t.timestamp_micros()),
            Some(time.timestamp_micros())
        );
    }

    #[tokio::test]
    async fn should_fail_to_update_missing_conversation() {
        let node = Postgres::default().start().await.unwrap();
        let repo = PgConversationRepository::new(db::Config::test(&node).await);

        let res = repo.update_summary(&Id::random(), &Summary::new("hi", Utc::now()));

        assert!(matches!(res, Err(Error::NotFound(_))));
    }
}

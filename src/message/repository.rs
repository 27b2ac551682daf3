use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use uuid::Uuid;

use crate::integration::db;
use crate::schema::messages;
use crate::{conversation, user};

use super::Error;
use super::model::{Message, NewMessage};

pub trait MessageRepository {
    /// Oldest first; messages stored in the same instant keep insertion order.
    fn find_by_conversation(&self, id: &conversation::Id) -> super::Result<Vec<Message>>;

    fn append(&self, m: &NewMessage) -> super::Result<Message>;
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: String,
    text: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message::new(
            row.id.into(),
            row.conversation_id.into(),
            user::Id::new(row.sender_id),
            row.text,
            row.created_at,
        )
    }
}

#[derive(Insertable)]
#[diesel(table_name = messages)]
struct NewMessageRow<'a> {
    id: &'a Uuid,
    conversation_id: &'a Uuid,
    sender_id: &'a str,
    text: &'a str,
}

impl<'a> From<&'a NewMessage> for NewMessageRow<'a> {
    fn from(m: &'a NewMessage) -> Self {
        Self {
            id: m.id().get(),
            conversation_id: m.conversation_id().get(),
            sender_id: m.sender_id().as_str(),
            text: m.text(),
        }
    }
}

pub struct PgMessageRepository {
    pool: db::Pool,
}

impl PgMessageRepository {
    pub fn new(pool: db::Pool) -> Self {
        Self { pool }
    }
}

impl MessageRepository for PgMessageRepository {
    fn find_by_conversation(&self, id: &conversation::Id) -> super::Result<Vec<Message>> {
        let mut conn = self.pool.get()?;

        let rows = messages::table
            .filter(messages::conversation_id.eq(id.get()))
            .order((messages::created_at.asc(), messages::seq.asc()))
            .select(MessageRow::as_select())
            .load(&mut conn)?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    fn append(&self, m: &NewMessage) -> super::Result<Message> {
        let mut conn = self.pool.get()?;

        let res = diesel::insert_into(messages::table)
            .values(NewMessageRow::from(m))
            .returning(MessageRow::as_returning())
            .get_result(&mut conn);

        match res {
            Ok(row) => Ok(row.into()),
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _)) => {
                Err(Error::UnknownConversation(m.conversation_id().clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

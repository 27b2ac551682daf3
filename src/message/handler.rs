use axum::http::StatusCode;

impl From<&super::Error> for StatusCode {
    fn from(e: &super::Error) -> Self {
        match e {
            super::Error::UnknownConversation(_) => Self::NOT_FOUND,
            super::Error::_Conversation(e) => e.into(),
            super::Error::_Event(_)
            | super::Error::_R2d2(_)
            | super::Error::_Diesel(_)
            | super::Error::_Join(_) => Self::INTERNAL_SERVER_ERROR,
        }
    }
}

pub(super) mod api {
    use axum::{
        Extension, Json,
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Response},
    };
    use serde::Deserialize;

    use crate::{
        auth, conversation,
        message::{
            self,
            model::{Draft, MessageDto},
            service::MessageService,
        },
    };

    pub async fn find_all(
        Extension(auth_user): Extension<auth::User>,
        message_service: State<message::Service>,
        Path(id): Path<conversation::Id>,
    ) -> crate::Result<Json<Vec<MessageDto>>> {
        let messages = message_service
            .find_by_conversation(auth_user.id(), &id)
            .await?;

        let items = messages
            .iter()
            .map(|m| MessageDto::new(m, auth_user.id()))
            .collect();

        Ok(Json(items))
    }

    #[derive(Deserialize)]
    pub struct SendParams {
        text: String,
    }

    pub async fn send(
        Extension(auth_user): Extension<auth::User>,
        message_service: State<message::Service>,
        Path(id): Path<conversation::Id>,
        Json(params): Json<SendParams>,
    ) -> crate::Result<Response> {
        let mut draft = Draft::new(params.text);
        let sent = message_service
            .send(Some(&auth_user), Some(&id), &mut draft)
            .await?;

        match sent {
            Some(m) => Ok((
                StatusCode::CREATED,
                Json(MessageDto::new(&m, auth_user.id())),
            )
                .into_response()),
            None => Ok(StatusCode::NO_CONTENT.into_response()),
        }
    }
}

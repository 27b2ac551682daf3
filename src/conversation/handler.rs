use axum::http::StatusCode;

impl From<&super::Error> for StatusCode {
    fn from(e: &super::Error) -> Self {
        match e {
            super::Error::DemoItem
            | super::Error::MissingCounterpart
            | super::Error::SelfContact => Self::BAD_REQUEST,
            super::Error::NotMember => Self::FORBIDDEN,
            super::Error::NotFound(_) => Self::NOT_FOUND,
            super::Error::Malformed(..)
            | super::Error::_Event(_)
            | super::Error::_R2d2(_)
            | super::Error::_Diesel(_)
            | super::Error::_Join(_) => Self::INTERNAL_SERVER_ERROR,
        }
    }
}

pub(super) mod api {
    use axum::{
        Extension, Json,
        extract::{Query, State},
    };
    use serde::{Deserialize, Serialize};

    use crate::{
        auth,
        conversation::{
            self,
            model::{ConversationDto, Inquiry, project},
            service::ConversationService,
        },
    };

    #[derive(Serialize)]
    pub struct Created {
        id: conversation::Id,
    }

    pub async fn contact_seller(
        Extension(auth_user): Extension<auth::User>,
        conversation_service: State<conversation::Service>,
        Json(inquiry): Json<Inquiry>,
    ) -> crate::Result<Json<Created>> {
        let id = conversation_service
            .open_or_create(&auth_user, &inquiry)
            .await?;

        Ok(Json(Created { id }))
    }

    #[derive(Deserialize)]
    pub struct Params {
        #[serde(default)]
        q: Option<String>,
    }

    pub async fn find_all(
        Extension(auth_user): Extension<auth::User>,
        conversation_service: State<conversation::Service>,
        Query(params): Query<Params>,
    ) -> crate::Result<Json<Vec<ConversationDto>>> {
        let conversations = conversation_service
            .find_by_participant(auth_user.id())
            .await?;

        let mut items = project(&conversations, auth_user.id());
        if let Some(q) = params.q.as_deref() {
            items.retain(|c| c.matches(q));
        }

        Ok(Json(items))
    }
}

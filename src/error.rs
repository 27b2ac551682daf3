use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::{debug, error};
use serde::Serialize;

use crate::{auth, conversation, integration, message};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    _Auth(#[from] auth::Error),
    #[error(transparent)]
    _Conversation(#[from] conversation::Error),
    #[error(transparent)]
    _Message(#[from] message::Error),
    #[error(transparent)]
    _Integration(#[from] integration::Error),
}

impl From<&Error> for StatusCode {
    fn from(e: &Error) -> Self {
        match e {
            Error::_Auth(e) => e.into(),
            Error::_Conversation(e) => e.into(),
            Error::_Message(e) => e.into(),
            Error::_Integration(_) => Self::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let status = StatusCode::from(&self);
        let message = if status.is_server_error() {
            error!("Request failed: {self:?}");
            String::from("Something went wrong")
        } else {
            debug!("Request rejected: {self}");
            self.to_string()
        };

        (status, Json(ErrorResponse { message })).into_response()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_expose_client_errors() {
        let res = Error::from(conversation::Error::DemoItem).into_response();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn should_mask_server_errors() {
        let e = Error::from(message::Error::_Diesel(
            diesel::result::Error::BrokenTransactionManager,
        ));

        assert_eq!(StatusCode::from(&e), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            StatusCode::from(&Error::from(auth::Error::Unauthorized)),
            StatusCode::UNAUTHORIZED
        );
    }
}

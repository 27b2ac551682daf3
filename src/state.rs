use std::sync::Arc;

use axum::extract::FromRef;

use crate::conversation::{
    repository::PgConversationRepository, service::ConversationServiceImpl,
};
use crate::event::service::NatsEventService;
use crate::integration::{self, cache, db};
use crate::message::{repository::PgMessageRepository, service::MessageServiceImpl};
use crate::{auth, conversation, event, message, sync};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub verifier: auth::Verifier,

    pub conversation_service: conversation::Service,
    pub message_service: message::Service,

    pub feeds: sync::Config,
}

impl AppState {
    pub async fn init(cfg: &integration::Config) -> crate::Result<Self> {
        let pool = cfg.pg.connect();
        db::migrate(&pool)?;

        let cache: cache::Service = Arc::new(cache::Redis::new(cfg.redis.init().await));
        let event_service: event::Service =
            Arc::new(NatsEventService::new(cfg.pubsub.connect().await));

        let conversation_repo: conversation::Repository =
            Arc::new(PgConversationRepository::new(pool.clone()));
        let message_repo: message::Repository = Arc::new(PgMessageRepository::new(pool));

        let conversation_service: conversation::Service = Arc::new(
            ConversationServiceImpl::new(conversation_repo, event_service.clone(), cache),
        );
        let message_service: message::Service = Arc::new(MessageServiceImpl::new(
            message_repo,
            conversation_service.clone(),
            event_service,
        ));

        Ok(Self {
            verifier: auth::Verifier::new(&cfg.auth),
            conversation_service,
            message_service,
            feeds: cfg.feeds,
        })
    }
}

use std::sync::Arc;

use axum::Extension;
use axum::extract::ws::Message::{Binary, Close, Text};
use axum::extract::ws::{self, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, error, warn};
use serde::Deserialize;
use tokio::sync::{Notify, mpsc};

use crate::session::Session;
use crate::{auth, conversation, message, sync};

use super::Scope;
use super::model::{Command, Event, View};

#[derive(Deserialize)]
pub struct Params {
    /// Conversation to open right away.
    id: Option<conversation::Id>,
}

pub async fn ws(
    Extension(auth_user): Extension<auth::User>,
    ws: WebSocketUpgrade,
    Query(params): Query<Params>,
    State(verifier): State<auth::Verifier>,
    State(conversation_service): State<conversation::Service>,
    State(message_service): State<message::Service>,
    State(feeds): State<sync::Config>,
) -> Response {
    let scope = Scope::new(
        Session::signed_in(auth_user),
        verifier,
        conversation_service,
        message_service,
        feeds,
    );

    ws.on_upgrade(move |socket| handle_socket(socket, scope, params.id))
}

async fn handle_socket(ws: WebSocket, scope: Scope, deep_link: Option<conversation::Id>) {
    let close = Arc::new(Notify::new());
    let (tx, rx) = mpsc::channel::<Event>(32);

    let mut initial = vec![Command::OpenChatList];
    if let Some(id) = deep_link {
        initial.push(Command::SelectConversation { id });
    }
    for command in initial {
        if let Some(event) = scope.handle(command).await {
            let _ = tx.send(event).await;
        }
    }

    let (sender, receiver) = ws.split();

    let read_task = tokio::spawn(read(scope.clone(), receiver, tx, close.clone()));
    let write_task = tokio::spawn(write(scope.clone(), sender, rx, close.clone()));

    match tokio::try_join!(read_task, write_task) {
        Ok(_) => debug!("WS disconnected gracefully"),
        Err(e) => error!("WS disconnected with error: {e}"),
    }

    scope.teardown().await;
}

async fn read(
    scope: Scope,
    mut receiver: SplitStream<WebSocket>,
    replies: mpsc::Sender<Event>,
    close: Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = close.notified() => break,

            frame = receiver.next() => {
                match frame {
                    None => {
                        close.notify_one();
                        break;
                    }
                    Some(Err(e)) => {
                        error!("Failed to read WS frame: {e}");
                        close.notify_one();
                        break;
                    }
                    Some(Ok(Close(frame))) => {
                        debug!("WS connection closed by client: {frame:?}");
                        close.notify_one();
                        break;
                    }
                    Some(Ok(Text(content))) => {
                        let Ok(command) = serde_json::from_str::<Command>(content.as_str()) else {
                            warn!("Skipping text frame, content is malformed: {content}");
                            continue;
                        };

                        let Some(event) = scope.handle(command).await else { continue };
                        if replies.send(event).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Binary(content))) => warn!("Received binary WS frame: {content:?}"),
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

async fn write(
    scope: Scope,
    mut sender: SplitSink<WebSocket, ws::Message>,
    mut replies: mpsc::Receiver<Event>,
    close: Arc<Notify>,
) {
    // Both start out unseen, so whatever the initial commands loaded goes out first.
    let mut conversations = scope.watch_conversations().await;
    let mut messages = scope.watch_messages().await;
    let mut view = View::default();

    'outer: loop {
        let events = tokio::select! {
            _ = close.notified() => break,

            changed = conversations.changed() => {
                if changed.is_err() {
                    break;
                }
                let list = conversations.borrow_and_update().clone();
                let me = scope.current_user();
                view.on_conversations(&list, &messages.borrow(), me.as_ref().map(auth::User::id))
            },
            changed = messages.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = messages.borrow_and_update().clone();
                let me = scope.current_user();
                view.on_messages(&state, &conversations.borrow(), me.as_ref().map(auth::User::id))
                    .into_iter()
                    .collect::<Vec<_>>()
            },
            reply = replies.recv() => match reply {
                Some(event) => vec![event],
                None => break,
            },
        };

        for event in events {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    error!("Could not serialize event: {e:?}");
                    continue;
                }
            };

            if let Err(e) = sender.send(Text(json.into())).await {
                error!("Failed to send event to client: {e}");
                close.notify_one();
                break 'outer;
            }
        }
    }
}

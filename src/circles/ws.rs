use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, Path, State, WebSocketUpgrade},
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Serialize;
use tower_sessions::Session;
use tracing::{debug, warn};

use crate::{
    model::GroupId,
    session,
    social::{feed::GroupSnapshot, Social},
    store::RemoteInsert,
    AppResult,
};

use super::msg::SendMessageQuery;

/// What the socket pushes: one snapshot, then every insert that changed the view.
#[derive(Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
enum Push {
    Snapshot(GroupSnapshot),
    Insert(RemoteInsert),
}

/// Returns false once the peer is gone.
async fn push(sender: &mut SplitSink<WebSocket, Message>, push: &Push) -> bool {
    let json = match serde_json::to_string(push) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "unserializable push");
            return true;
        }
    };
    sender.send(Message::Text(json.into())).await.is_ok()
}

#[debug_handler(state = crate::AppState)]
pub async fn circle_ws(
    Path(group_id): Path<GroupId>,
    State(social): State<Social>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let identity = session::identity(&session).await?;
    let me = social.resume(identity, Some(group_id)).await?;
    let (mut view, mut subscription) = me.open_group(group_id).await?;

    Ok(ws.on_upgrade(async move |stream| {
        let (mut sender, mut receiver) = stream.split();

        let mut push_task = tokio::spawn(async move {
            if !push(&mut sender, &Push::Snapshot(view.snapshot())).await {
                return;
            }
            while let Some(insert) = subscription.recv().await {
                if view.apply(&insert) && !push(&mut sender, &Push::Insert(insert)).await {
                    break;
                }
            }
        });

        let mut recv_task = tokio::spawn(async move {
            while let Some(Ok(msg)) = receiver.next().await {
                let Ok(SendMessageQuery { text }) = serde_json::from_slice(&msg.into_data()) else {
                    continue;
                };
                if let Err(e) = me.send_chat(&text).await {
                    debug!(error = %e, %group_id, "chat refused");
                }
            }
        });

        tokio::select! {
            _ = &mut push_task => recv_task.abort(),
            _ = &mut recv_task => push_task.abort(),
        };
        debug!(%group_id, "circle socket closed");
    }))
}

use std::collections::HashMap;

use application::{
    room_topic, user_topic, Actor, ApplicationError, SendMessageRequest, ROOM_TOPIC_PREFIX,
};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{MessageId, RoomId, UserId};
use futures_util::{
    stream::{SplitStream, StreamExt},
    SinkExt,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::{error::ApiError, state::AppState};

/// 客户端指令帧
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    EnterRoom { room_id: RoomId },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: RoomId },
    #[serde(rename_all = "camelCase")]
    SendMessage { room_id: RoomId, content: String },
    Ping,
}

impl ClientFrame {
    fn name(&self) -> &'static str {
        match self {
            ClientFrame::EnterRoom { .. } => "ENTER_ROOM",
            ClientFrame::LeaveRoom { .. } => "LEAVE_ROOM",
            ClientFrame::SendMessage { .. } => "SEND_MESSAGE",
            ClientFrame::Ping => "PING",
        }
    }
}

/// 服务端应答帧，推送负载直接转发不经过此类型
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum ServerFrame {
    #[serde(rename_all = "camelCase")]
    Ack {
        action: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<MessageId>,
    },
    Error {
        code: &'static str,
        message: String,
    },
    Pong,
}

impl ServerFrame {
    fn ack(action: &'static str, room_id: RoomId) -> Self {
        ServerFrame::Ack {
            action,
            room_id: Some(room_id),
            message_id: None,
        }
    }

    fn error(code: &'static str, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            code,
            message: message.into(),
        }
    }
}

impl From<ApplicationError> for ServerFrame {
    fn from(err: ApplicationError) -> Self {
        let api = ApiError::from(err);
        ServerFrame::error(api.code(), api.message())
    }
}

/// WebSocket 写操作命令
///
/// 所有对 sender 的写操作都经过发送任务，推送转发任务与指令处理共用同一个通道。
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Vec<u8>),
}

/// 单个流式连接
///
/// 身份属性保存在会话存储中，每条房间指令分发前按连接 ID 重新读取。
pub struct WebSocketConnection {
    connection_id: String,
    user_id: UserId,
    state: AppState,
    /// 主题 → 转发任务
    subscriptions: HashMap<String, JoinHandle<()>>,
}

impl WebSocketConnection {
    pub fn new(connection_id: String, user_id: UserId, state: AppState) -> Self {
        Self {
            connection_id,
            user_id,
            state,
            subscriptions: HashMap::new(),
        }
    }

    /// 运行连接主循环，连接断开后清理订阅与会话属性
    pub async fn run(mut self, socket: WebSocket) {
        let (mut sender, mut incoming) = socket.split();
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(64);

        let mut send_task = tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                let frame = match cmd {
                    WsCommand::SendText(text) => WsMessage::Text(text.into()),
                    WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                };
                if sender.send(frame).await.is_err() {
                    tracing::debug!("WebSocket 写入失败，发送任务结束");
                    break;
                }
            }
        });

        self.subscribe(user_topic(self.user_id), &cmd_tx).await;

        tokio::select! {
            _ = &mut send_task => {
                tracing::debug!(connection_id = %self.connection_id, "WebSocket 发送任务完成");
            }
            _ = self.receive_loop(&mut incoming, &cmd_tx) => {
                tracing::debug!(connection_id = %self.connection_id, "WebSocket 接收循环结束");
            }
        }

        self.teardown().await;
        send_task.abort();
    }

    async fn receive_loop(
        &mut self,
        incoming: &mut SplitStream<WebSocket>,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) {
        while let Some(Ok(message)) = incoming.next().await {
            let keep_going = match message {
                WsMessage::Text(text) => self.handle_text(text.as_str(), cmd_tx).await,
                WsMessage::Ping(data) => cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_ok(),
                WsMessage::Pong(_) | WsMessage::Binary(_) => true,
                WsMessage::Close(_) => {
                    tracing::debug!(connection_id = %self.connection_id, "收到关闭帧");
                    false
                }
            };
            if !keep_going {
                break;
            }
        }
    }

    /// 处理一条文本指令，返回 false 表示连接应当结束
    async fn handle_text(&mut self, text: &str, cmd_tx: &mpsc::Sender<WsCommand>) -> bool {
        let reply = match serde_json::from_str::<ClientFrame>(text) {
            Err(err) => ServerFrame::error("BAD_FRAME", err.to_string()),
            Ok(ClientFrame::Ping) => ServerFrame::Pong,
            Ok(frame) => match self.bound_actor().await {
                Some(actor) => self.dispatch(actor, frame, cmd_tx).await,
                None => {
                    tracing::warn!(
                        connection_id = %self.connection_id,
                        frame = frame.name(),
                        "会话属性缺失，拒绝指令"
                    );
                    ServerFrame::error("UNAUTHENTICATED", "session is not authenticated")
                }
            },
        };

        match serde_json::to_string(&reply) {
            Ok(json) => cmd_tx.send(WsCommand::SendText(json)).await.is_ok(),
            Err(err) => {
                tracing::warn!(error = %err, "应答帧序列化失败");
                true
            }
        }
    }

    /// 分发时从会话存储读取绑定的身份
    async fn bound_actor(&self) -> Option<Actor> {
        match self.state.session_store.get(&self.connection_id).await {
            Ok(attributes) => attributes.map(|attrs| Actor::new(attrs.user_id, attrs.username)),
            Err(err) => {
                tracing::error!(connection_id = %self.connection_id, error = %err, "读取会话属性失败");
                None
            }
        }
    }

    async fn dispatch(
        &mut self,
        actor: Actor,
        frame: ClientFrame,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> ServerFrame {
        match frame {
            ClientFrame::EnterRoom { room_id } => {
                // 先订阅再校验成员身份，校验之后的移出事件一定能被转发任务看到
                let topic = room_topic(room_id);
                self.subscribe(topic.clone(), cmd_tx).await;
                if let Err(err) = self
                    .state
                    .chat_service
                    .ensure_participant(room_id, actor.user_id)
                    .await
                {
                    self.unsubscribe(&topic).await;
                    return err.into();
                }
                ServerFrame::ack("ENTER_ROOM", room_id)
            }
            ClientFrame::LeaveRoom { room_id } => {
                self.unsubscribe(&room_topic(room_id)).await;
                ServerFrame::ack("LEAVE_ROOM", room_id)
            }
            ClientFrame::SendMessage { room_id, content } => {
                match self
                    .state
                    .chat_service
                    .send_message(&actor, SendMessageRequest { room_id, content })
                    .await
                {
                    Ok(message) => ServerFrame::Ack {
                        action: "SEND_MESSAGE",
                        room_id: Some(room_id),
                        message_id: Some(MessageId::from(message.id)),
                    },
                    Err(err) => err.into(),
                }
            }
            ClientFrame::Ping => ServerFrame::Pong,
        }
    }

    /// 订阅主题并启动转发任务。
    ///
    /// 仍在运行的订阅保持不变；因成员身份失效而结束的订阅会被替换。
    async fn subscribe(&mut self, topic: String, cmd_tx: &mpsc::Sender<WsCommand>) {
        if self
            .subscriptions
            .get(&topic)
            .is_some_and(|task| !task.is_finished())
        {
            return;
        }
        let receiver = self.state.broadcaster.subscribe(&topic).await;
        let member = topic.starts_with(ROOM_TOPIC_PREFIX).then_some(self.user_id);
        let task = tokio::spawn(forward(receiver, cmd_tx.clone(), topic.clone(), member));
        self.subscriptions.insert(topic, task);
    }

    async fn unsubscribe(&mut self, topic: &str) {
        if let Some(task) = self.subscriptions.remove(topic) {
            task.abort();
            // 等待任务真正退出，接收端释放后才能回收主题
            let _ = task.await;
            self.state.broadcaster.prune().await;
        }
    }

    async fn teardown(&mut self) {
        for (_, task) in self.subscriptions.drain() {
            task.abort();
            let _ = task.await;
        }
        let pruned = self.state.broadcaster.prune().await;
        if pruned > 0 {
            tracing::debug!(connection_id = %self.connection_id, pruned, "已回收空闲广播主题");
        }
        if let Err(err) = self.state.session_store.remove(&self.connection_id).await {
            tracing::warn!(connection_id = %self.connection_id, error = %err, "会话属性清理失败");
        }
        tracing::info!(
            connection_id = %self.connection_id,
            user_id = %self.user_id,
            "WebSocket 连接已断开，订阅与会话已清理"
        );
    }
}

/// 把主题推送转发到连接。
///
/// 房间主题传入 `member`：收到该用户离开房间或房间被删除的推送后，
/// 转发这条推送并结束订阅。
async fn forward(
    mut receiver: broadcast::Receiver<String>,
    cmd_tx: mpsc::Sender<WsCommand>,
    topic: String,
    member: Option<UserId>,
) {
    loop {
        match receiver.recv().await {
            Ok(payload) => {
                let revoked = member.is_some_and(|user_id| ends_membership(&payload, user_id));
                if cmd_tx.send(WsCommand::SendText(payload)).await.is_err() {
                    break;
                }
                if revoked {
                    tracing::info!(topic = %topic, "成员身份已失效，结束房间订阅");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(topic = %topic, skipped, "推送积压，已跳过部分消息");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// 推送（单条或批量）中是否包含该用户离开房间或房间删除的事件
fn ends_membership(payload: &str, user_id: UserId) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(payload) else {
        return false;
    };
    let user_id = user_id.to_string();
    let revokes = |entry: &Value| match entry.get("type").and_then(Value::as_str) {
        Some("ROOM_DELETED") => true,
        Some("USER_LEFT") => entry.get("userId").and_then(Value::as_str) == Some(user_id.as_str()),
        _ => false,
    };

    match value.get("messages").and_then(Value::as_array) {
        Some(batch) => batch.iter().any(revokes),
        None => revokes(&value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_frames_use_camel_case_fields() {
        let room_id = RoomId::generate();
        let frame: ClientFrame = serde_json::from_value(json!({
            "type": "SEND_MESSAGE",
            "roomId": room_id,
            "content": "hi"
        }))
        .unwrap();
        assert!(matches!(
            frame,
            ClientFrame::SendMessage { room_id: id, ref content } if id == room_id && content == "hi"
        ));

        let ping: ClientFrame = serde_json::from_str(r#"{"type":"PING"}"#).unwrap();
        assert!(matches!(ping, ClientFrame::Ping));
    }

    #[test]
    fn unknown_frame_type_is_rejected() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"SUBSCRIBE_ALL"}"#).is_err());
    }

    #[test]
    fn server_frames_serialize_with_type_tag() {
        let room_id = RoomId::generate();
        let ack: Value = serde_json::to_value(ServerFrame::ack("ENTER_ROOM", room_id)).unwrap();
        assert_eq!(ack["type"], "ACK");
        assert_eq!(ack["action"], "ENTER_ROOM");
        assert_eq!(ack["roomId"], room_id.to_string());
        assert!(ack.get("messageId").is_none());

        let pong: Value = serde_json::to_value(ServerFrame::Pong).unwrap();
        assert_eq!(pong, json!({"type": "PONG"}));

        let error: Value =
            serde_json::to_value(ServerFrame::error("UNAUTHENTICATED", "no session")).unwrap();
        assert_eq!(error["code"], "UNAUTHENTICATED");
    }

    #[test]
    fn own_departure_or_room_deletion_ends_membership() {
        let me = UserId::generate();
        let other = UserId::generate();

        let left = json!({ "type": "USER_LEFT", "userId": me }).to_string();
        let other_left = json!({ "type": "USER_LEFT", "userId": other }).to_string();
        let deleted = json!({ "type": "ROOM_DELETED", "userId": other }).to_string();
        let message = json!({ "type": "MESSAGE_SENT", "userId": me }).to_string();
        let batch = json!({
            "type": "BATCH",
            "messages": [{ "type": "MESSAGE_SENT", "userId": other }, { "type": "USER_LEFT", "userId": me }],
        })
        .to_string();

        assert!(ends_membership(&left, me));
        assert!(!ends_membership(&other_left, me));
        assert!(ends_membership(&deleted, me));
        assert!(!ends_membership(&message, me));
        assert!(ends_membership(&batch, me));
        assert!(!ends_membership("not json", me));
    }
}

//! 流式连接握手
//!
//! 凭证只从请求头读取（`Authorization: Bearer`，其次是配置的 Cookie），
//! 校验失败时在升级前直接返回 401，不写入任何会话属性。

use application::{SessionAttributes, VerifiedToken};
use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{auth::extract_token, error::ApiError, state::AppState, ws_connection::WebSocketConnection};

pub async fn websocket_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let Some(token) = extract_token(&headers, &state.cookie_name) else {
        tracing::warn!("WebSocket 握手缺少凭证");
        return Err(ApiError::authentication_failed("missing credentials"));
    };

    let verified = state.token_service.verify(&token).map_err(|err| {
        tracing::warn!(error = %err, "WebSocket 握手令牌无效");
        ApiError::authentication_failed(err.to_string())
    })?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, verified, token)))
}

async fn handle_socket(socket: WebSocket, state: AppState, verified: VerifiedToken, token: String) {
    let connection_id = Uuid::new_v4().to_string();
    let ttl = (verified.expires_at - Utc::now()).to_std().unwrap_or_default();
    let attributes = SessionAttributes {
        user_id: verified.user_id,
        username: verified.username,
        token,
        bound_at: Utc::now(),
    };

    if let Err(err) = state.session_store.put(&connection_id, attributes, ttl).await {
        tracing::error!(connection_id = %connection_id, error = %err, "会话属性写入失败，关闭连接");
        return;
    }

    tracing::info!(
        connection_id = %connection_id,
        user_id = %verified.user_id,
        ttl_secs = ttl.as_secs(),
        "WebSocket 连接已建立"
    );
    WebSocketConnection::new(connection_id, verified.user_id, state)
        .run(socket)
        .await;
}

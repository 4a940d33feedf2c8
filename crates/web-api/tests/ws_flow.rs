mod support;

use std::time::Duration;

use application::SessionStore;
use futures_util::SinkExt;
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::http::header;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as TungsteniteMessage};

use support::{frame_of_type, next_frame, send_frame, spawn_app, TestApp};

async fn wait_for_session(app: &TestApp, count: usize) -> String {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let keys = app.sessions.keys();
            if keys.len() >= count {
                return keys[count - 1].clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session was not bound")
}

#[tokio::test]
async fn handshake_without_header_credentials_is_refused() {
    let app = spawn_app().await;
    let alice = app.sign_up("alice").await;

    let bare = connect_async(app.ws_url()).await;
    match bare {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 401),
        other => panic!("expected HTTP 401, got {other:?}"),
    }

    // 查询参数中的令牌不被接受
    let query = connect_async(format!("{}?token={}", app.ws_url(), alice.token)).await;
    match query {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 401),
        other => panic!("expected HTTP 401, got {other:?}"),
    }

    assert!(app.sessions.keys().is_empty());
}

#[tokio::test]
async fn handshake_with_invalid_token_is_refused() {
    let app = spawn_app().await;

    let mut request = tokio_tungstenite::tungstenite::client::IntoClientRequest::into_client_request(
        app.ws_url(),
    )
    .unwrap();
    request.headers_mut().insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_static("Bearer forged.token.value"),
    );
    match connect_async(request).await {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 401),
        other => panic!("expected HTTP 401, got {other:?}"),
    }
    assert!(app.sessions.keys().is_empty());
}

#[tokio::test]
async fn participants_receive_room_pushes() {
    let app = spawn_app().await;
    let alice = app.sign_up("alice").await;
    let bob = app.sign_up("bob").await;
    let room = app.create_room(&alice.token, "general").await;
    let room_id = room["id"].as_str().unwrap().to_owned();
    app.client
        .post(app.url(&format!("/api/v1/rooms/{room_id}/join")))
        .bearer_auth(&bob.token)
        .send()
        .await
        .unwrap();

    let mut alice_ws = app.connect_bearer(&alice.token).await;
    let mut bob_ws = app
        .connect_with_header(header::COOKIE, &format!("access_token={}", bob.token))
        .await;

    for ws in [&mut alice_ws, &mut bob_ws] {
        send_frame(ws, json!({ "type": "ENTER_ROOM", "roomId": room_id })).await;
        let ack = frame_of_type(ws, "ACK").await;
        assert_eq!(ack["action"], "ENTER_ROOM");
        assert_eq!(ack["roomId"], room_id);
    }

    send_frame(
        &mut alice_ws,
        json!({ "type": "SEND_MESSAGE", "roomId": room_id, "content": "hello bob" }),
    )
    .await;
    let ack = frame_of_type(&mut alice_ws, "ACK").await;
    assert_eq!(ack["action"], "SEND_MESSAGE");
    assert!(ack["messageId"].is_string());

    let push = frame_of_type(&mut bob_ws, "MESSAGE_SENT").await;
    assert_eq!(push["content"], "hello bob");
    assert_eq!(push["username"], "alice");
    assert_eq!(push["roomId"], room_id);
    assert_eq!(push["messageId"], ack["messageId"]);

    send_frame(&mut bob_ws, json!({ "type": "PING" })).await;
    assert_eq!(frame_of_type(&mut bob_ws, "PONG").await["type"], "PONG");
}

#[tokio::test]
async fn entering_a_room_requires_membership() {
    let app = spawn_app().await;
    let alice = app.sign_up("alice").await;
    let mallory = app.sign_up("mallory").await;
    let room = app.create_room(&alice.token, "closed").await;
    let room_id = room["id"].as_str().unwrap().to_owned();

    let mut ws = app.connect_bearer(&mallory.token).await;
    send_frame(&mut ws, json!({ "type": "ENTER_ROOM", "roomId": room_id })).await;
    let error = next_frame(&mut ws).await;
    assert_eq!(error["type"], "ERROR");
    assert_eq!(error["code"], "NOT_FOUND");

    send_frame(&mut ws, json!({ "type": "DANCE" })).await;
    let error = next_frame(&mut ws).await;
    assert_eq!(error["code"], "BAD_FRAME");
}

#[tokio::test]
async fn frames_are_rejected_once_session_attributes_are_gone() {
    let app = spawn_app().await;
    let alice = app.sign_up("alice").await;
    let room = app.create_room(&alice.token, "general").await;
    let room_id = room["id"].as_str().unwrap().to_owned();

    let mut ws = app.connect_bearer(&alice.token).await;
    let key = wait_for_session(&app, 1).await;
    let attributes = app.sessions.get(&key).await.unwrap().unwrap();
    assert_eq!(attributes.user_id.to_string(), alice.user_id);
    assert_eq!(attributes.token, alice.token);

    app.sessions.remove(&key).await.unwrap();

    send_frame(&mut ws, json!({ "type": "ENTER_ROOM", "roomId": room_id })).await;
    let error = next_frame(&mut ws).await;
    assert_eq!(error["type"], "ERROR");
    assert_eq!(error["code"], "UNAUTHENTICATED");

    send_frame(
        &mut ws,
        json!({ "type": "SEND_MESSAGE", "roomId": room_id, "content": "ghost" }),
    )
    .await;
    assert_eq!(next_frame(&mut ws).await["code"], "UNAUTHENTICATED");

    // PING 不依赖会话属性
    send_frame(&mut ws, json!({ "type": "PING" })).await;
    assert_eq!(next_frame(&mut ws).await["type"], "PONG");
}

#[tokio::test]
async fn disconnect_removes_session_attributes() {
    let app = spawn_app().await;
    let alice = app.sign_up("alice").await;

    let mut ws = app.connect_bearer(&alice.token).await;
    let key = wait_for_session(&app, 1).await;
    assert!(app.sessions.get(&key).await.unwrap().is_some());

    ws.send(TungsteniteMessage::Close(None)).await.unwrap();
    drop(ws);

    tokio::time::timeout(Duration::from_secs(2), async {
        while app.sessions.get(&key).await.unwrap().is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session attributes were not removed");

    tokio::time::timeout(Duration::from_secs(2), async {
        while app.broadcaster.topic_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("idle topics were not reclaimed");
}

#[tokio::test]
async fn removed_participant_stops_receiving_room_pushes() {
    let app = spawn_app().await;
    let alice = app.sign_up("alice").await;
    let bob = app.sign_up("bob").await;
    let room = app.create_room(&alice.token, "private-talk").await;
    let room_id = room["id"].as_str().unwrap().to_owned();
    app.client
        .post(app.url(&format!("/api/v1/rooms/{room_id}/join")))
        .bearer_auth(&bob.token)
        .send()
        .await
        .unwrap();

    let mut alice_ws = app.connect_bearer(&alice.token).await;
    let mut bob_ws = app.connect_bearer(&bob.token).await;
    for ws in [&mut alice_ws, &mut bob_ws] {
        send_frame(ws, json!({ "type": "ENTER_ROOM", "roomId": room_id })).await;
        assert_eq!(frame_of_type(ws, "ACK").await["action"], "ENTER_ROOM");
    }

    let kicked = app
        .client
        .delete(app.url(&format!("/api/v1/rooms/{room_id}/participants/{}", bob.user_id)))
        .bearer_auth(&alice.token)
        .send()
        .await
        .unwrap();
    assert_eq!(kicked.status().as_u16(), 200);

    // 被移出的成员先收到自己的离开事件
    let left = frame_of_type(&mut bob_ws, "USER_LEFT").await;
    assert_eq!(left["userId"], bob.user_id);

    send_frame(
        &mut alice_ws,
        json!({ "type": "SEND_MESSAGE", "roomId": room_id, "content": "secret after kick" }),
    )
    .await;
    let own_push = frame_of_type(&mut alice_ws, "MESSAGE_SENT").await;
    assert_eq!(own_push["content"], "secret after kick");

    let leaked = tokio::time::timeout(
        Duration::from_millis(300),
        frame_of_type(&mut bob_ws, "MESSAGE_SENT"),
    )
    .await;
    assert!(leaked.is_err(), "removed participant received {leaked:?}");

    // 重新进入房间同样被拒绝
    send_frame(&mut bob_ws, json!({ "type": "ENTER_ROOM", "roomId": room_id })).await;
    assert_eq!(frame_of_type(&mut bob_ws, "ERROR").await["code"], "NOT_FOUND");
}

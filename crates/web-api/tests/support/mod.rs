#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use application::{
    BrokerDeadLetterSink, BrokerSubscriber, ChannelEventPublisher, ChatService,
    ChatServiceDependencies, ConsumerRunner, DeliveryConsumer, FanoutService, SessionAttributes,
    SessionError, SessionStore, SystemClock, UserService, UserServiceDependencies,
};
use async_trait::async_trait;
use config::{JwtConfig, KafkaConfig};
use futures_util::{SinkExt, StreamExt};
use infrastructure::{
    event_topics, BcryptPasswordHasher, InMemoryBroker, InMemorySessionStore, InMemoryStorage,
    LocalTopicBroadcaster,
};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use web_api::{router, AppState, JwtService};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";

/// 记录写入过的连接 ID，便于测试观察会话存储
#[derive(Default)]
pub struct RecordingSessionStore {
    inner: InMemorySessionStore,
    keys: Mutex<Vec<String>>,
}

impl RecordingSessionStore {
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionStore for RecordingSessionStore {
    async fn get(&self, key: &str) -> Result<Option<SessionAttributes>, SessionError> {
        self.inner.get(key).await
    }

    async fn put(
        &self,
        key: &str,
        attributes: SessionAttributes,
        ttl: Duration,
    ) -> Result<(), SessionError> {
        self.keys.lock().unwrap().push(key.to_owned());
        self.inner.put(key, attributes, ttl).await
    }

    async fn remove(&self, key: &str) -> Result<Option<SessionAttributes>, SessionError> {
        self.inner.remove(key).await
    }

    async fn sweep_expired(&self) -> Result<usize, SessionError> {
        self.inner.sweep_expired().await
    }
}

pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub sessions: Arc<RecordingSessionStore>,
    pub jwt: Arc<JwtService>,
    pub broadcaster: Arc<LocalTopicBroadcaster>,
    shutdown: CancellationToken,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// 进程内完整装配：内存仓储、进程内代理、投递消费者和 HTTP 服务
pub async fn spawn_app() -> TestApp {
    let storage = Arc::new(InMemoryStorage::new());
    let kafka = KafkaConfig::default();
    let topics = event_topics(&kafka);
    let broker = InMemoryBroker::new(kafka.partitions);
    let broadcaster = Arc::new(LocalTopicBroadcaster::new(64));
    let sessions = Arc::new(RecordingSessionStore::default());
    let jwt = Arc::new(JwtService::new(&JwtConfig {
        secret: TEST_SECRET.to_owned(),
        expiration_hours: 1,
        cookie_name: "access_token".to_owned(),
    }));
    let shutdown = CancellationToken::new();

    let (publisher, _publisher_task) =
        ChannelEventPublisher::spawn(Arc::new(broker.clone()), topics.clone());

    let chat_service = ChatService::new(ChatServiceDependencies {
        room_repository: storage.clone(),
        message_repository: storage.clone(),
        user_repository: storage.clone(),
        clock: Arc::new(SystemClock),
        publisher: Arc::new(publisher),
    });
    let user_service = UserService::new(UserServiceDependencies {
        user_repository: storage,
        password_hasher: Arc::new(BcryptPasswordHasher::new(Some(4))),
        token_service: jwt.clone(),
        clock: Arc::new(SystemClock),
    });

    let subscription = broker
        .subscribe(
            &[
                topics.messages.clone(),
                topics.room_events.clone(),
                topics.notifications.clone(),
            ],
            &kafka.groups.delivery,
        )
        .await
        .expect("subscribe delivery group");
    let runner = ConsumerRunner::new(
        kafka.groups.delivery.clone(),
        topics,
        Arc::new(BrokerDeadLetterSink::new(Arc::new(broker.clone()))),
    );
    let consumer = Arc::new(DeliveryConsumer::new(Arc::new(FanoutService::new(
        broadcaster.clone(),
    ))));
    let consumer_shutdown = shutdown.clone();
    tokio::spawn(async move { runner.run(subscription, consumer, consumer_shutdown).await });

    let state = AppState::new(
        Arc::new(user_service),
        Arc::new(chat_service),
        jwt.clone(),
        sessions.clone(),
        broadcaster.clone(),
        "access_token",
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        axum::serve(listener, router(state).into_make_service())
            .with_graceful_shutdown(server_shutdown.cancelled_owned())
            .await
            .ok();
    });

    TestApp {
        addr,
        client: Client::new(),
        sessions,
        jwt,
        broadcaster,
        shutdown,
    }
}

pub struct LoggedIn {
    pub user_id: String,
    pub token: String,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub async fn register(&self, username: &str) -> Value {
        let response = self
            .client
            .post(self.url("/api/v1/auth/register"))
            .json(&json!({ "username": username, "password": "correct-horse" }))
            .send()
            .await
            .expect("register request");
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json().await.expect("register json")
    }

    pub async fn login(&self, username: &str) -> LoggedIn {
        let response = self
            .client
            .post(self.url("/api/v1/auth/login"))
            .json(&json!({ "username": username, "password": "correct-horse" }))
            .send()
            .await
            .expect("login request");
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.expect("login json");
        LoggedIn {
            user_id: body["user"]["id"].as_str().expect("user id").to_owned(),
            token: body["token"].as_str().expect("token").to_owned(),
        }
    }

    /// 注册并登录
    pub async fn sign_up(&self, username: &str) -> LoggedIn {
        self.register(username).await;
        self.login(username).await
    }

    pub async fn create_room(&self, token: &str, name: &str) -> Value {
        let response = self
            .client
            .post(self.url("/api/v1/rooms"))
            .bearer_auth(token)
            .json(&json!({ "name": name, "room_type": "GROUP" }))
            .send()
            .await
            .expect("create room request");
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json().await.expect("room json")
    }

    pub async fn connect_with_header(&self, name: header::HeaderName, value: &str) -> WsStream {
        let mut request = self.ws_url().into_client_request().expect("ws request");
        request
            .headers_mut()
            .insert(name, HeaderValue::from_str(value).expect("header value"));
        let (stream, _) = connect_async(request).await.expect("ws connect");
        stream
    }

    pub async fn connect_bearer(&self, token: &str) -> WsStream {
        self.connect_with_header(header::AUTHORIZATION, &format!("Bearer {token}"))
            .await
    }
}

pub async fn send_frame(stream: &mut WsStream, frame: Value) {
    stream
        .send(TungsteniteMessage::Text(frame.to_string().into()))
        .await
        .expect("send frame");
}

/// 读取下一条文本帧
pub async fn next_frame(stream: &mut WsStream) -> Value {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match stream.next().await {
                Some(Ok(TungsteniteMessage::Text(text))) => {
                    return serde_json::from_str::<Value>(text.as_str()).expect("frame json");
                }
                Some(Ok(_)) => continue,
                other => panic!("stream ended: {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for frame")
}

/// 跳过其他帧，返回第一条指定类型的帧
pub async fn frame_of_type(stream: &mut WsStream, wanted: &str) -> Value {
    loop {
        let frame = next_frame(stream).await;
        if frame["type"] == wanted {
            return frame;
        }
    }
}

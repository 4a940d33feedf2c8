use std::sync::Arc;

use application::{ChatService, SessionStore, TokenService, UserService};
use infrastructure::LocalTopicBroadcaster;

#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub chat_service: Arc<ChatService>,
    pub token_service: Arc<dyn TokenService>,
    /// 流式连接的身份属性，以连接 ID 为键
    pub session_store: Arc<dyn SessionStore>,
    /// 流式连接按主题订阅推送
    pub broadcaster: Arc<LocalTopicBroadcaster>,
    pub cookie_name: Arc<str>,
}

impl AppState {
    pub fn new(
        user_service: Arc<UserService>,
        chat_service: Arc<ChatService>,
        token_service: Arc<dyn TokenService>,
        session_store: Arc<dyn SessionStore>,
        broadcaster: Arc<LocalTopicBroadcaster>,
        cookie_name: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            user_service,
            chat_service,
            token_service,
            session_store,
            broadcaster,
            cookie_name: cookie_name.into(),
        }
    }
}

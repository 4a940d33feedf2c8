//! Web API 层。
//!
//! 提供 Axum 路由与流式连接入口，将 HTTP / WebSocket 请求委托给应用层的用例服务。

mod auth;
mod error;
mod routes;
mod state;
mod websocket;
mod ws_connection;

pub use auth::{extract_token, require_auth, AuthUser, Claims, JwtService};
pub use error::{ApiError, ErrorBody};
pub use routes::{router, LoginResponse};
pub use state::AppState;

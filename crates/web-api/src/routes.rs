use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use application::{
    Actor, CreateRoomRequest, MessageDto, Page, PageRequest, RegisterUserRequest, RoomDto,
    SendMessageRequest, UserDto,
};
use domain::{MessageId, MessageStatus, ParticipantRole, RoomId, RoomType, UserId};

use crate::{
    auth::{require_auth, AuthUser},
    error::ApiError,
    state::AppState,
    websocket::websocket_upgrade,
};

#[derive(Debug, Deserialize)]
struct RegisterPayload {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    username: String,
    password: String,
}

/// 登录响应结构
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserDto,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CreateRoomPayload {
    name: String,
    room_type: Option<RoomType>,
}

#[derive(Debug, Deserialize)]
struct RenameRoomPayload {
    name: String,
}

#[derive(Debug, Deserialize)]
struct InvitePayload {
    user_id: UserId,
}

#[derive(Debug, Deserialize)]
struct ChangeRolePayload {
    role: ParticipantRole,
}

#[derive(Debug, Deserialize)]
struct NotificationsPayload {
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageStatusPayload {
    status: MessageStatus,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<u32>,
    size: Option<u32>,
}

impl From<PageQuery> for PageRequest {
    fn from(query: PageQuery) -> Self {
        PageRequest::new(
            query.page.unwrap_or(0),
            query.size.unwrap_or(PageRequest::DEFAULT_SIZE),
        )
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .nest("/api/v1", api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/users/me", get(current_user))
        .route("/rooms", get(list_rooms).post(create_room))
        .route(
            "/rooms/{room_id}",
            get(get_room).patch(rename_room).delete(delete_room),
        )
        .route("/rooms/{room_id}/join", post(join_room))
        .route("/rooms/{room_id}/leave", post(leave_room))
        .route("/rooms/{room_id}/invitations", post(invite_user))
        .route(
            "/rooms/{room_id}/participants/{user_id}",
            delete(remove_participant),
        )
        .route(
            "/rooms/{room_id}/participants/{user_id}/role",
            put(change_participant_role),
        )
        .route("/rooms/{room_id}/notifications", put(set_notifications))
        .route(
            "/rooms/{room_id}/messages",
            post(send_message).get(get_messages),
        )
        .route("/messages/{message_id}/status", patch(update_message_status))
        .route("/messages/{message_id}", delete(delete_message))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    Router::new()
        .route("/auth/register", post(register_user))
        .route("/auth/login", post(login_user))
        .merge(protected)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<UserDto>), ApiError> {
    let dto = state
        .user_service
        .register(RegisterUserRequest {
            username: payload.username,
            password: payload.password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(dto)))
}

/// 登录成功后同时在响应体和 Cookie 中返回令牌
async fn login_user(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginPayload>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let outcome = state
        .user_service
        .login(&payload.username, &payload.password)
        .await?;

    let cookie = Cookie::build((state.cookie_name.to_string(), outcome.token.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            user: outcome.user,
            token: outcome.token.token,
            expires_at: outcome.token.expires_at,
        }),
    ))
}

async fn current_user(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UserDto>, ApiError> {
    Ok(Json(state.user_service.get_user(user.user_id).await?))
}

async fn list_rooms(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<RoomDto>>, ApiError> {
    let rooms = state.chat_service.list_rooms(&Actor::from(user)).await?;
    Ok(Json(rooms))
}

async fn create_room(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateRoomPayload>,
) -> Result<(StatusCode, Json<RoomDto>), ApiError> {
    let dto = state
        .chat_service
        .create_room(
            &Actor::from(user),
            CreateRoomRequest {
                name: payload.name,
                room_type: payload.room_type.unwrap_or(RoomType::Group),
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(dto)))
}

async fn get_room(
    State(state): State<AppState>,
    user: AuthUser,
    Path(room_id): Path<RoomId>,
) -> Result<Json<RoomDto>, ApiError> {
    Ok(Json(
        state
            .chat_service
            .get_room(&Actor::from(user), room_id)
            .await?,
    ))
}

async fn rename_room(
    State(state): State<AppState>,
    user: AuthUser,
    Path(room_id): Path<RoomId>,
    Json(payload): Json<RenameRoomPayload>,
) -> Result<Json<RoomDto>, ApiError> {
    let dto = state
        .chat_service
        .rename_room(&Actor::from(user), room_id, payload.name)
        .await?;
    Ok(Json(dto))
}

async fn delete_room(
    State(state): State<AppState>,
    user: AuthUser,
    Path(room_id): Path<RoomId>,
) -> Result<StatusCode, ApiError> {
    state
        .chat_service
        .delete_room(&Actor::from(user), room_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn join_room(
    State(state): State<AppState>,
    user: AuthUser,
    Path(room_id): Path<RoomId>,
) -> Result<Json<RoomDto>, ApiError> {
    let dto = state
        .chat_service
        .join_room(&Actor::from(user), room_id)
        .await?;
    Ok(Json(dto))
}

async fn leave_room(
    State(state): State<AppState>,
    user: AuthUser,
    Path(room_id): Path<RoomId>,
) -> Result<StatusCode, ApiError> {
    state
        .chat_service
        .leave_room(&Actor::from(user), room_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn invite_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(room_id): Path<RoomId>,
    Json(payload): Json<InvitePayload>,
) -> Result<Json<RoomDto>, ApiError> {
    let dto = state
        .chat_service
        .invite_user(&Actor::from(user), room_id, payload.user_id)
        .await?;
    Ok(Json(dto))
}

async fn remove_participant(
    State(state): State<AppState>,
    user: AuthUser,
    Path((room_id, target)): Path<(RoomId, UserId)>,
) -> Result<Json<RoomDto>, ApiError> {
    let dto = state
        .chat_service
        .remove_participant(&Actor::from(user), room_id, target)
        .await?;
    Ok(Json(dto))
}

async fn change_participant_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path((room_id, target)): Path<(RoomId, UserId)>,
    Json(payload): Json<ChangeRolePayload>,
) -> Result<Json<RoomDto>, ApiError> {
    let dto = state
        .chat_service
        .change_participant_role(&Actor::from(user), room_id, target, payload.role)
        .await?;
    Ok(Json(dto))
}

async fn set_notifications(
    State(state): State<AppState>,
    user: AuthUser,
    Path(room_id): Path<RoomId>,
    Json(payload): Json<NotificationsPayload>,
) -> Result<Json<RoomDto>, ApiError> {
    let dto = state
        .chat_service
        .set_notifications(&Actor::from(user), room_id, payload.enabled)
        .await?;
    Ok(Json(dto))
}

async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(room_id): Path<RoomId>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<MessageDto>), ApiError> {
    let dto = state
        .chat_service
        .send_message(
            &Actor::from(user),
            SendMessageRequest {
                room_id,
                content: payload.content,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(dto)))
}

async fn get_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Path(room_id): Path<RoomId>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<MessageDto>>, ApiError> {
    let page = state
        .chat_service
        .get_messages(&Actor::from(user), room_id, PageRequest::from(query))
        .await?;
    Ok(Json(page))
}

async fn update_message_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(message_id): Path<MessageId>,
    Json(payload): Json<MessageStatusPayload>,
) -> Result<Json<MessageDto>, ApiError> {
    let dto = state
        .chat_service
        .update_message_status(&Actor::from(user), message_id, payload.status)
        .await?;
    Ok(Json(dto))
}

async fn delete_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(message_id): Path<MessageId>,
) -> Result<StatusCode, ApiError> {
    state
        .chat_service
        .delete_message(&Actor::from(user), message_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

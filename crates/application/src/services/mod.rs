pub mod chat_service;
pub mod user_service;

pub use chat_service::{
    Actor, ChatService, ChatServiceDependencies, CreateRoomRequest, SendMessageRequest,
};
pub use user_service::{LoginOutcome, RegisterUserRequest, UserService, UserServiceDependencies};

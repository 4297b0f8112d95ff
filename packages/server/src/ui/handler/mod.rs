mod http;
mod websocket;

pub use http::{
    create_user, get_room_messages, get_rooms, get_user, get_users, health_check,
    issue_call_token,
};
pub use websocket::websocket_handler;

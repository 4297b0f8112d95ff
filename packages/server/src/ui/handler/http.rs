//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    domain::ExternalIdentity,
    infrastructure::{
        credential::CredentialError,
        dto::{
            http::{
                CallTokenRequest, CallTokenResponse, CreateUserRequest, ErrorResponse,
                HealthResponse, MessageListResponse, MessagesQuery, RoomListResponse,
                RoomSummaryDto, UserListResponse, UsersQuery,
            },
            websocket::{MemberDto, MessageDto, UserDto},
        },
    },
    ui::state::AppState,
    usecase::ChatError,
};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store = state.health_check_usecase.execute().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        store: store.as_str().to_string(),
    })
}

/// Get list of users
pub async fn get_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UsersQuery>,
) -> Json<UserListResponse> {
    let users = state.get_users_usecase.execute(query.online_only).await;

    // Domain Model から DTO への変換
    Json(UserListResponse {
        users: users.iter().map(UserDto::from).collect(),
    })
}

/// Get user by ID
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserDto>, StatusCode> {
    match state.get_users_usecase.find(user_id).await {
        Some(user) => Ok(Json(UserDto::from(&user))),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// Create or update a user from an external identity
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserDto>), ApiError> {
    let identity = ExternalIdentity::from(request);
    match state.get_users_usecase.register(identity).await {
        Ok(user) => Ok((StatusCode::CREATED, Json(UserDto::from(&user)))),
        Err(e @ ChatError::InvalidIdentity(_)) => {
            Err(api_error(StatusCode::BAD_REQUEST, e.to_string()))
        }
        Err(e) => {
            tracing::error!("Failed to register user: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// Get list of public rooms that currently have members
pub async fn get_rooms(State(state): State<Arc<AppState>>) -> Json<RoomListResponse> {
    let rooms = state.get_rooms_usecase.execute().await;

    Json(RoomListResponse {
        rooms: rooms
            .into_iter()
            .map(|(room, members)| RoomSummaryDto {
                room: room.into_string(),
                members: members.iter().map(MemberDto::from).collect(),
            })
            .collect(),
    })
}

/// Get message history of a public room
pub async fn get_room_messages(
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessageListResponse>, ApiError> {
    match state.get_messages_usecase.execute(room, query.limit).await {
        Ok((room, messages)) => Ok(Json(MessageListResponse {
            room: room.into_string(),
            messages: messages.iter().map(MessageDto::from).collect(),
        })),
        Err(e) => Err(api_error(StatusCode::BAD_REQUEST, e.to_string())),
    }
}

/// Issue a short-lived credential for the video call integration
pub async fn issue_call_token(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CallTokenRequest>,
) -> Result<Json<CallTokenResponse>, ApiError> {
    match state
        .issue_call_credential_usecase
        .execute(&request.channel_name, &request.user_id)
    {
        Ok(credential) => Ok(Json(CallTokenResponse {
            token: credential.token,
            channel_name: credential.channel_name,
            user_id: credential.user_id,
            app_id: credential.app_id,
            expires_at: credential.expires_at,
        })),
        Err(e @ CredentialError::NotConfigured) => {
            Err(api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
        }
        Err(e) => Err(api_error(StatusCode::BAD_REQUEST, e.to_string())),
    }
}

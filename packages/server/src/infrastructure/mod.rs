//! インフラ層
//!
//! ドメイン層の trait（ChatStore / MessagePusher）の実装と、
//! プロセス内の共有状態（registry）、ワイヤ形式（dto）を提供します。

pub mod credential;
pub mod dto;
pub mod message_pusher;
pub mod registry;
pub mod repository;

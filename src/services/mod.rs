// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - session lifecycle, keepalive and live sync.

pub mod keepalive;
pub mod lifecycle;
pub mod poller;
pub mod publisher;
pub mod spectator;
pub mod token_client;

pub use keepalive::{CredentialBackend, Keepalive};
pub use lifecycle::{ExerciseSource, SessionController};
pub use poller::PollLoop;
pub use publisher::{LivePublisher, PublishOutcome};
pub use spectator::Spectator;
pub use token_client::TokenClient;

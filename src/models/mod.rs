// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod credential;
pub mod live;
pub mod session;

pub use credential::{Credential, CredentialHealth};
pub use live::{CheerEvent, OwnerEvent, PresenceRecord, SessionExerciseSnapshot};
pub use session::{
    ActiveSession, ExerciseRecord, RoutePoint, SessionEvent, SessionState, SetEntry, Split,
};

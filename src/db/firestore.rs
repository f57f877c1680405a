// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed live-sync store.
//!
//! Provides the three live-session collections:
//! - Exercise snapshots (written by the session owner)
//! - Spectator presence (one document per spectator)
//! - Cheers (append-only)

use crate::db::{collections, scoped_doc_id, LiveStore};
use crate::error::{AppError, Result};
use crate::models::{CheerEvent, PresenceRecord, SessionExerciseSnapshot};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Firestore store client.
#[derive(Clone)]
pub struct FirestoreStore {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreStore {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Store(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| AppError::Store(format!("Failed to connect to Firestore Emulator: {}", e)))?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock client (offline mode).
    ///
    /// All operations return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Store("Store not connected (offline mode)".to_string()))
    }

    // ─── Helper Methods ────────────────────────────────────────────

    /// Fetch one document and decode it, treating undecodable rows as absent.
    async fn get_decoded<T: DeserializeOwned>(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> Result<Option<T>> {
        let doc = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .one(doc_id)
            .await
            .map_err(|e| AppError::Store(e.to_string()))?;

        Ok(doc.and_then(|doc| decode_or_skip(collection, &doc)))
    }

    /// All documents of a session in `collection`.
    async fn query_session_docs(
        &self,
        collection: &str,
        session_id: &str,
        order: Option<(&str, firestore::FirestoreQueryDirection)>,
        limit: Option<u32>,
    ) -> Result<Vec<firestore::FirestoreDocument>> {
        let query = self
            .get_client()?
            .fluent()
            .select()
            .from(collection)
            .filter(|q| q.for_all([q.field("session_id").eq(session_id)]));

        let query = match order {
            Some((field, direction)) => query.order_by([(field, direction)]),
            None => query,
        };
        let query = match limit {
            Some(limit) => query.limit(limit),
            None => query,
        };

        query
            .query()
            .await
            .map_err(|e| AppError::Store(e.to_string()))
    }

    async fn delete_doc(&self, collection: &str, doc_id: &str) -> Result<()> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collection)
            .document_id(doc_id)
            .execute()
            .await
            .map_err(|e| AppError::Store(e.to_string()))?;
        Ok(())
    }

    /// Batch delete documents using transactions.
    async fn batch_delete(&self, doc_ids: &[String], collection: &str) -> Result<()> {
        let client = self.get_client()?;

        for chunk in doc_ids.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Store(format!("Failed to begin transaction: {}", e)))?;

            for doc_id in chunk {
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Store(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction
                .commit()
                .await
                .map_err(|e| AppError::Store(format!("Failed to commit batch deletion: {}", e)))?;
        }

        Ok(())
    }
}

/// Decode a document, logging and skipping it if malformed.
fn decode_or_skip<T: DeserializeOwned>(
    collection: &str,
    doc: &firestore::FirestoreDocument,
) -> Option<T> {
    match firestore::FirestoreDb::deserialize_doc_to::<T>(doc) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(
                collection,
                doc = %doc.name,
                error = %e,
                "Skipping malformed document"
            );
            None
        }
    }
}

/// Trailing path segment of a document name.
fn doc_id_of(doc: &firestore::FirestoreDocument) -> String {
    doc.name.rsplit('/').next().unwrap_or_default().to_string()
}

#[async_trait]
impl LiveStore for FirestoreStore {
    // ─── Exercise Snapshot Operations ────────────────────────────

    async fn get_snapshot(
        &self,
        session_id: &str,
        exercise_id: &str,
    ) -> Result<Option<SessionExerciseSnapshot>> {
        self.get_decoded(
            collections::SESSION_EXERCISES,
            &scoped_doc_id(session_id, exercise_id),
        )
        .await
    }

    async fn insert_snapshot(&self, snapshot: &SessionExerciseSnapshot) -> Result<()> {
        let _: () = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::SESSION_EXERCISES)
            .document_id(scoped_doc_id(&snapshot.session_id, &snapshot.exercise_id))
            .object(snapshot)
            .execute()
            .await
            .map_err(|e| AppError::Store(e.to_string()))?;
        Ok(())
    }

    async fn update_snapshot(&self, snapshot: &SessionExerciseSnapshot) -> Result<()> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::SESSION_EXERCISES)
            .document_id(scoped_doc_id(&snapshot.session_id, &snapshot.exercise_id))
            .object(snapshot)
            .execute()
            .await
            .map_err(|e| AppError::Store(e.to_string()))?;
        Ok(())
    }

    async fn delete_snapshot(&self, session_id: &str, exercise_id: &str) -> Result<()> {
        self.delete_doc(
            collections::SESSION_EXERCISES,
            &scoped_doc_id(session_id, exercise_id),
        )
        .await
    }

    async fn delete_session_snapshots(&self, session_id: &str) -> Result<usize> {
        // Malformed rows are deleted too, so ids come from document names.
        let doc_ids: Vec<String> = self
            .query_session_docs(collections::SESSION_EXERCISES, session_id, None, None)
            .await?
            .iter()
            .map(doc_id_of)
            .collect();

        self.batch_delete(&doc_ids, collections::SESSION_EXERCISES)
            .await?;

        tracing::debug!(session_id, count = doc_ids.len(), "Deleted session snapshots");
        Ok(doc_ids.len())
    }

    async fn list_snapshots(&self, session_id: &str) -> Result<Vec<SessionExerciseSnapshot>> {
        let docs = self
            .query_session_docs(
                collections::SESSION_EXERCISES,
                session_id,
                Some((
                    "order_index",
                    firestore::FirestoreQueryDirection::Ascending,
                )),
                None,
            )
            .await?;

        Ok(docs
            .iter()
            .filter_map(|doc| decode_or_skip(collections::SESSION_EXERCISES, doc))
            .collect())
    }

    // ─── Presence Operations ─────────────────────────────────────

    async fn upsert_presence(&self, presence: &PresenceRecord) -> Result<()> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::PRESENCE)
            .document_id(scoped_doc_id(&presence.session_id, &presence.spectator_id))
            .object(presence)
            .execute()
            .await
            .map_err(|e| AppError::Store(e.to_string()))?;
        Ok(())
    }

    async fn delete_presence(&self, session_id: &str, spectator_id: &str) -> Result<()> {
        self.delete_doc(
            collections::PRESENCE,
            &scoped_doc_id(session_id, spectator_id),
        )
        .await
    }

    async fn list_presence(&self, session_id: &str) -> Result<Vec<PresenceRecord>> {
        let docs = self
            .query_session_docs(collections::PRESENCE, session_id, None, None)
            .await?;

        Ok(docs
            .iter()
            .filter_map(|doc| decode_or_skip(collections::PRESENCE, doc))
            .collect())
    }

    // ─── Cheer Operations ────────────────────────────────────────

    async fn insert_cheer(&self, cheer: &CheerEvent) -> Result<()> {
        let _: () = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::CHEERS)
            .document_id(scoped_doc_id(&cheer.session_id, &cheer.id))
            .object(cheer)
            .execute()
            .await
            .map_err(|e| AppError::Store(e.to_string()))?;
        Ok(())
    }

    async fn recent_cheers(&self, session_id: &str, limit: u32) -> Result<Vec<CheerEvent>> {
        let docs = self
            .query_session_docs(
                collections::CHEERS,
                session_id,
                Some(("created_at", firestore::FirestoreQueryDirection::Descending)),
                Some(limit),
            )
            .await?;

        Ok(docs
            .iter()
            .filter_map(|doc| decode_or_skip(collections::CHEERS, doc))
            .collect())
    }
}

//! Compendium writer
//!
//! Persists a compendium, its documents and per-type statistics in a
//! single transaction. Statistics come from the documents that actually
//! made it into the database.

use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;
use uuid::Uuid;

use crate::db;
use crate::models::{count_by_type, Compendium, Document, ImportIssue, IssueCode};
use crate::utils::retry_on_lock;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Compendium '{name}' already exists for plugin {plugin_id} (slug '{slug}'); enable overwriteExisting to replace it")]
    Conflict {
        name: String,
        slug: String,
        plugin_id: String,
        existing: Vec<Uuid>,
    },

    #[error("Failed to persist compendium: {0}")]
    Database(#[from] dlab_common::Error),
}

impl From<sqlx::Error> for WriteError {
    fn from(err: sqlx::Error) -> Self {
        WriteError::Database(err.into())
    }
}

#[derive(Debug)]
pub struct WriteOutcome {
    /// The compendium as stored, statistics included
    pub compendium: Compendium,
    pub persisted: Vec<Uuid>,
    /// Compendiums removed because `overwrite` was set
    pub replaced_compendiums: usize,
    /// Documents of other compendiums displaced by slug
    pub replaced_documents: usize,
    pub issues: Vec<ImportIssue>,
}

/// Split `documents` into the ones that can be written and a skip issue
/// for every later record reusing a slug already seen in the batch
///
/// Dry runs use this too, so both report the same clashes.
pub fn dedupe_slugs(documents: &[Document]) -> (Vec<&Document>, Vec<ImportIssue>) {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut kept = Vec::with_capacity(documents.len());
    let mut issues = Vec::new();

    for document in documents {
        if seen.insert(document.slug.as_str()) {
            kept.push(document);
        } else {
            issues.push(ImportIssue::skip(
                IssueCode::PersistenceError,
                Some(document.name.clone()),
                format!("slug '{}' is used by another record in this archive", document.slug),
            ));
        }
    }
    (kept, issues)
}

/// Skip issue for a document whose slug another compendium already holds
pub fn slug_taken(document: &Document) -> ImportIssue {
    ImportIssue::skip(
        IssueCode::PersistenceError,
        Some(document.name.clone()),
        format!("a document with slug '{}' already exists", document.slug),
    )
}

/// Write `compendium` and `documents` atomically
///
/// Every document must already carry `compendium.id`. A document whose slug
/// is taken is skipped with a `PERSISTENCE_ERROR`, or replaces the holder of
/// that slug when `overwrite` is set; the holder's compendium statistics are
/// recomputed in the same transaction.
///
/// The transaction starts with `BEGIN IMMEDIATE` so the write lock is held
/// before the first read. Waiting for it is retried for up to
/// `max_lock_wait_ms`.
pub async fn write_compendium(
    pool: &SqlitePool,
    mut compendium: Compendium,
    documents: &[Document],
    overwrite: bool,
    max_lock_wait_ms: u64,
) -> Result<WriteOutcome, WriteError> {
    let mut tx = retry_on_lock("begin compendium write", max_lock_wait_ms, || async {
        Ok::<_, dlab_common::Error>(pool.begin_with("BEGIN IMMEDIATE").await?)
    })
    .await?;

    let existing =
        db::compendiums::find_conflicting(&mut tx, &compendium.slug, &compendium.name, &compendium.plugin_id).await?;
    if !existing.is_empty() && !overwrite {
        return Err(WriteError::Conflict {
            name: compendium.name.clone(),
            slug: compendium.slug.clone(),
            plugin_id: compendium.plugin_id.clone(),
            existing,
        });
    }
    for id in &existing {
        tracing::info!(compendium_id = %id, "Replacing existing compendium");
        db::compendiums::delete(&mut tx, *id).await?;
    }

    db::compendiums::insert(&mut tx, &compendium).await?;

    let (candidates, issues) = dedupe_slugs(documents);
    let mut outcome = WriteOutcome {
        compendium: compendium.clone(),
        persisted: Vec::with_capacity(candidates.len()),
        replaced_compendiums: existing.len(),
        replaced_documents: 0,
        issues,
    };
    let mut written: Vec<&Document> = Vec::with_capacity(candidates.len());
    let mut displaced: BTreeSet<Uuid> = BTreeSet::new();

    for document in candidates {
        match db::documents::insert(&mut tx, document).await {
            Ok(()) => {}
            Err(e) if e.is_unique_violation() && overwrite => {
                if let Some(owner) = db::documents::owner_of_slug(&mut tx, &document.slug).await? {
                    displaced.insert(owner);
                }
                let removed = db::documents::delete_by_slug(&mut tx, &document.slug).await?;
                db::documents::insert(&mut tx, document).await?;
                outcome.replaced_documents += removed as usize;
                tracing::debug!(slug = %document.slug, "Replaced existing document");
            }
            Err(e) if e.is_unique_violation() => {
                outcome.issues.push(slug_taken(document));
                continue;
            }
            Err(e) => return Err(e.into()),
        }
        outcome.persisted.push(document.id);
        written.push(document);
    }

    for owner in displaced.iter().filter(|id| **id != compendium.id) {
        let counts = db::documents::type_counts(&mut tx, *owner).await?;
        let total: usize = counts.values().sum();
        db::compendiums::update_statistics(&mut tx, *owner, &counts, total).await?;
        tracing::debug!(compendium_id = %owner, total_entries = total, "Statistics recomputed after slug takeover");
    }

    compendium.entries_by_type = count_by_type(written.iter().copied());
    compendium.total_entries = written.len();
    db::compendiums::update_statistics(&mut tx, compendium.id, &compendium.entries_by_type, compendium.total_entries)
        .await?;

    tx.commit().await?;

    tracing::info!(
        compendium_id = %compendium.id,
        slug = %compendium.slug,
        documents = compendium.total_entries,
        skipped = outcome.issues.len(),
        "Compendium persisted"
    );
    outcome.compendium = compendium;
    Ok(outcome)
}

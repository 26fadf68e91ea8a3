//! Import orchestration: parse an uploaded file, compute normalized match
//! fields and import-time match keys, and link the resulting record
//! sources to canonical records.
//!
//! Runs as a background task under the project advisory lock. All errors
//! are caught and written to the import job — there are no silent
//! failures. A successful import triggers the auto within-source overlap
//! pass for the source while the lock is still held.

use std::sync::Arc;

use uuid::Uuid;

use refdedup_core::normalize::{normalize_doi, normalize_first_author, normalize_title};
use refdedup_core::{compute_match_key, parse_bytes, ParsedRecord, Preset};

use crate::error::{ServiceError, ServiceResult};
use crate::locks::ProjectLocks;
use crate::model::{ImportJobStatus, Record, RecordSource};
use crate::service::overlap::OverlapService;
use crate::storage::{batch_chunk_size, PersistenceGateway, RECORD_COLUMNS, RECORD_SOURCE_COLUMNS};

/// Runs import jobs against the persistence gateway.
#[derive(Clone)]
pub struct ImportService {
    gateway: Arc<dyn PersistenceGateway>,
    locks: ProjectLocks,
    overlap: OverlapService,
}

impl ImportService {
    #[must_use]
    pub fn new(gateway: Arc<dyn PersistenceGateway>, locks: ProjectLocks) -> Self {
        let overlap = OverlapService::new(Arc::clone(&gateway), locks.clone());
        Self {
            gateway,
            locks,
            overlap,
        }
    }

    /// Background-task entry point. Never returns an error: every failure
    /// lands on the job row so no job stays `processing` forever.
    pub async fn process_import(
        &self,
        job_id: Uuid,
        project_id: Uuid,
        source_id: Uuid,
        file_bytes: &[u8],
    ) {
        if let Err(err) = self.run(job_id, project_id, source_id, file_bytes).await {
            tracing::error!(%job_id, %project_id, error = %err, "import job failed");
            let message = err.user_message();
            if let Err(err) = self
                .gateway
                .set_import_job_finished(job_id, ImportJobStatus::Failed, 0, Some(message))
                .await
            {
                tracing::error!(%job_id, error = %err, "failed to mark import job failed");
            }
        }
    }

    async fn run(
        &self,
        job_id: Uuid,
        project_id: Uuid,
        source_id: Uuid,
        file_bytes: &[u8],
    ) -> ServiceResult<()> {
        let Some(_guard) = self.locks.try_acquire(project_id) else {
            self.gateway
                .set_import_job_finished(
                    job_id,
                    ImportJobStatus::Failed,
                    0,
                    Some(ServiceError::ProjectLocked.user_message()),
                )
                .await?;
            return Ok(());
        };

        self.gateway.set_import_job_processing(job_id).await?;

        self.gateway
            .get_source(source_id)
            .await?
            .ok_or(ServiceError::SourceNotFound(source_id))?;

        let parsed = parse_bytes(file_bytes);
        tracing::info!(
            %job_id,
            format = %parsed.format_detected,
            valid = parsed.valid_count,
            failed = parsed.failed_count,
            "file parsed"
        );

        if parsed.valid_count == 0 {
            self.gateway
                .set_import_job_finished(
                    job_id,
                    ImportJobStatus::Failed,
                    0,
                    Some(parsed.error_summary()),
                )
                .await?;
            return Ok(());
        }

        let preset = self
            .gateway
            .get_active_strategy(project_id)
            .await?
            .map_or(Preset::DoiFirstStrict, |s| s.import_preset());

        // Normalize every record and compute its import-time match key.
        let mut canonical_rows = Vec::with_capacity(parsed.records.len());
        let mut norm_fields = Vec::with_capacity(parsed.records.len());
        for record in &parsed.records {
            let norm_title = record.title.as_deref().and_then(normalize_title);
            let norm_first_author = normalize_first_author(&record.authors);
            let match_doi = record.doi.as_deref().and_then(normalize_doi);
            let (match_key, basis) = compute_match_key(
                norm_title.as_deref(),
                norm_first_author.as_deref(),
                record.year,
                match_doi.as_deref(),
                preset,
            );
            canonical_rows.push(canonical_record(project_id, record, match_key, basis.as_str()));
            norm_fields.push((norm_title, norm_first_author, match_doi));
        }

        // Upsert canonical records in parameter-budget-sized batches.
        let mut canonical_ids = Vec::with_capacity(canonical_rows.len());
        for chunk in canonical_rows.chunks(batch_chunk_size(RECORD_COLUMNS)) {
            canonical_ids.extend(
                self.gateway
                    .upsert_records_by_match_key(chunk.to_vec())
                    .await?,
            );
        }

        // Link each parsed record to its canonical row.
        let source_rows: Vec<RecordSource> = parsed
            .records
            .iter()
            .zip(norm_fields)
            .zip(&canonical_ids)
            .map(|((record, (norm_title, norm_first_author, match_doi)), &record_id)| {
                RecordSource {
                    id: Uuid::new_v4(),
                    record_id,
                    source_id,
                    project_id,
                    import_job_id: Some(job_id),
                    raw_data: record.raw_data.clone(),
                    norm_title,
                    norm_first_author,
                    match_year: record.year,
                    match_doi,
                }
            })
            .collect();

        let mut inserted = 0;
        for chunk in source_rows.chunks(batch_chunk_size(RECORD_SOURCE_COLUMNS)) {
            inserted += self.gateway.insert_record_sources(chunk.to_vec()).await?;
        }

        let (status, error_msg) = if parsed.has_warnings() {
            (
                ImportJobStatus::CompletedWithWarnings,
                Some(parsed.error_summary()),
            )
        } else {
            (ImportJobStatus::Completed, None)
        };
        self.gateway
            .set_import_job_finished(job_id, status, inserted, error_msg)
            .await?;

        tracing::info!(%job_id, %source_id, inserted, "import complete");

        // Auto within-source pass; the import still holds the project lock,
        // so this is the single writer for the source.
        self.overlap
            .run_within_source_detection(project_id, source_id)
            .await?;
        Ok(())
    }
}

fn canonical_record(
    project_id: Uuid,
    record: &ParsedRecord,
    match_key: Option<String>,
    match_basis: &str,
) -> Record {
    Record {
        id: Uuid::new_v4(),
        project_id,
        match_key,
        match_basis: match_basis.to_string(),
        title: record.title.clone(),
        abstract_text: record.abstract_text.clone(),
        authors: record.authors.clone(),
        year: record.year,
        journal: record.journal.clone(),
        volume: record.volume.clone(),
        issue: record.issue.clone(),
        pages: record.pages.clone(),
        doi: record.doi.clone(),
        issn: record.issn.clone(),
        keywords: record.keywords.clone(),
        source_format: record.source_format,
    }
}

//! Verification life cycle
//!
//! Every transition reads the record, builds the next version in memory
//! (history entry included) and writes it back with one conditional replace
//! on the previously read `updatedAt`. Lost races are retried.

use std::sync::Arc;
use std::time::Duration;

use bson::{doc, DateTime, Document};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::Caller;
use crate::db::schemas::{
    AnalysisResult, AnalysisStatus, HabitatRecord, HistoryEntry, Schutzstatus, MODULE_CORRECTION,
    MODULE_DELETION, MODULE_REANALYSIS, MODULE_UNVERIFICATION, MODULE_VERIFICATION,
};
use crate::services::records::{not_found, RecordService};
use crate::types::{BiotopError, Result};

/// Attempts before a transition gives up with `Conflict`
pub const MAX_TRANSITION_ATTEMPTS: usize = 5;

impl RecordService {
    /// Mark a record as expert-verified with the given habitat type
    pub async fn verify(
        &self,
        caller: &Caller,
        record_id: &str,
        effective_habitat: &str,
        kommentar: Option<&str>,
    ) -> Result<HabitatRecord> {
        let verifier = self.require_verifier(caller).await?;

        let habitat = effective_habitat.trim();
        if habitat.is_empty() {
            return Err(BiotopError::Validation("effectiveHabitat is required".into()));
        }

        self.load_active(record_id).await?;

        let habitat_type = self.catalog.lookup(habitat).await?.ok_or_else(|| {
            BiotopError::NotFound(format!("Unknown habitat type '{}'", habitat))
        })?;

        let kommentar = kommentar.map(str::trim).filter(|k| !k.is_empty());

        let record = self
            .apply_transition(record_id, |record, now| {
                let previous = classification_snapshot(record)?;

                let mut result = record.auto_result.clone().unwrap_or_default();
                result.habitattyp = Some(habitat.to_string());
                result.habitatfamilie = Some(habitat_type.habitat_family.clone());
                result.schutzstatus =
                    Some(Schutzstatus::Label(habitat_type.legal_status_label.clone()));
                result.kommentar = kommentar.map(str::to_string);

                record.mark_verified(result, verifier.verified_by(), now);

                let changes = verification_snapshot(record)?;
                record.history.append(HistoryEntry::new(
                    now,
                    verifier.audit_user(),
                    MODULE_VERIFICATION,
                    previous,
                    changes,
                ));
                Ok(())
            })
            .await?;

        info!(
            record_id,
            caller = %caller.email,
            habitat,
            module = MODULE_VERIFICATION,
            "Record verified"
        );
        Ok(record)
    }

    /// Drop the verification of a verified record
    pub async fn unverify(&self, caller: &Caller, record_id: &str) -> Result<HabitatRecord> {
        let verifier = self.require_verifier(caller).await?;

        let record = self
            .apply_transition(record_id, |record, now| {
                if !record.verified {
                    return Err(BiotopError::InvalidState(format!(
                        "Record {} is not verified",
                        record.record_id
                    )));
                }

                let previous = verification_snapshot(record)?;
                record.clear_verification();
                record.history.append(HistoryEntry::new(
                    now,
                    verifier.audit_user(),
                    MODULE_UNVERIFICATION,
                    previous,
                    doc! { "verified": false },
                ));
                Ok(())
            })
            .await?;

        info!(
            record_id,
            caller = %caller.email,
            module = MODULE_UNVERIFICATION,
            "Record unverified"
        );
        Ok(record)
    }

    /// Replace the verified result of an already verified record
    pub async fn correct(
        &self,
        caller: &Caller,
        record_id: &str,
        new_result: AnalysisResult,
    ) -> Result<HabitatRecord> {
        let verifier = self.require_verifier(caller).await?;

        let habitat = new_result
            .habitattyp
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .ok_or_else(|| BiotopError::Validation("habitattyp is required".into()))?;

        let record = self
            .apply_transition(record_id, |record, now| {
                if !record.verified {
                    return Err(BiotopError::InvalidState(format!(
                        "Record {} must be verified before it can be corrected",
                        record.record_id
                    )));
                }

                let previous = verification_snapshot(record)?;
                let mut result = new_result.clone();
                result.habitattyp = Some(habitat.clone());
                record.mark_verified(result, verifier.verified_by(), now);

                let changes = verification_snapshot(record)?;
                record.history.append(HistoryEntry::new(
                    now,
                    verifier.audit_user(),
                    MODULE_CORRECTION,
                    previous,
                    changes,
                ));
                Ok(())
            })
            .await?;

        info!(
            record_id,
            caller = %caller.email,
            module = MODULE_CORRECTION,
            "Verified result corrected"
        );
        Ok(record)
    }

    /// Start a new automatic classification.
    ///
    /// Marks the record as analyzing and returns; the classifier runs on a
    /// spawned task whose handle is returned. An `analyzing` marker older than
    /// the stale window is taken over.
    pub async fn request_reanalysis(
        self: &Arc<Self>,
        caller: &Caller,
        record_id: &str,
    ) -> Result<JoinHandle<()>> {
        let classifier = self
            .classifier
            .clone()
            .ok_or_else(|| BiotopError::Upstream("No classifier configured".into()))?;

        let current = self.load_active(record_id).await?;
        require_manager(caller, &current)?;

        let stale_after = self.analysis_stale_after;
        let marked = self
            .apply_transition(record_id, |record, now| {
                require_manager(caller, record)?;
                if record.analysis_status == AnalysisStatus::Analyzing {
                    let requested_at = record.analysis_requested_at.unwrap_or(record.updated_at);
                    if !is_stale(requested_at, now, stale_after) {
                        return Err(BiotopError::InvalidState(format!(
                            "Record {} is already being analyzed",
                            record.record_id
                        )));
                    }
                    warn!(record_id = %record.record_id, "Taking over abandoned re-analysis");
                }
                record.analysis_status = AnalysisStatus::Analyzing;
                record.analysis_requested_at = Some(now);
                record.analysis_error = None;
                Ok(())
            })
            .await?;

        info!(record_id, caller = %caller.email, "Re-analysis requested");

        let service = Arc::clone(self);
        let caller = caller.clone();
        let record_id = record_id.to_string();
        Ok(tokio::spawn(async move {
            // Own task so a panicking classifier still ends in `failed`
            let classification = tokio::spawn(async move { classifier.classify(&marked).await });
            let outcome = match classification.await {
                Ok(outcome) => outcome,
                Err(e) => Err(BiotopError::Upstream(format!("Classifier task failed: {}", e))),
            };
            if let Err(e) = service
                .complete_reanalysis(&caller, &record_id, outcome)
                .await
            {
                warn!(record_id = %record_id, error = %e, "Failed to store re-analysis outcome");
            }
        }))
    }

    /// Store the classifier outcome of a re-analysis
    pub async fn complete_reanalysis(
        &self,
        caller: &Caller,
        record_id: &str,
        outcome: Result<AnalysisResult>,
    ) -> Result<HabitatRecord> {
        let record = self
            .apply_transition(record_id, |record, now| {
                let previous = match &record.auto_result {
                    Some(result) => result.snapshot()?,
                    None => Document::new(),
                };

                let changes = match &outcome {
                    Ok(result) => {
                        record.auto_result = Some(result.clone());
                        record.analysis_status = AnalysisStatus::Completed;
                        record.analysis_error = None;
                        result.snapshot()?
                    }
                    Err(e) => {
                        record.analysis_status = AnalysisStatus::Failed;
                        record.analysis_error = Some(e.to_string());
                        doc! { "analysisError": e.to_string() }
                    }
                };
                record.analysis_requested_at = None;

                record.history.append(HistoryEntry::new(
                    now,
                    caller.audit_user(),
                    MODULE_REANALYSIS,
                    previous,
                    changes,
                ));
                Ok(())
            })
            .await?;

        info!(
            record_id,
            status = record.analysis_status.as_str(),
            module = MODULE_REANALYSIS,
            "Re-analysis finished"
        );
        Ok(record)
    }

    /// Soft-delete a record. It stays readable by id for authorized callers.
    pub async fn delete_record(&self, caller: &Caller, record_id: &str) -> Result<HabitatRecord> {
        let record = self
            .apply_transition(record_id, |record, now| {
                require_manager(caller, record)?;
                record.mark_deleted(&caller.email, now);
                record.history.append(HistoryEntry::new(
                    now,
                    caller.audit_user(),
                    MODULE_DELETION,
                    doc! { "deleted": false },
                    doc! { "deleted": true, "deletedBy": caller.email.as_str() },
                ));
                Ok(())
            })
            .await?;

        info!(
            record_id,
            caller = %caller.email,
            module = MODULE_DELETION,
            "Record deleted"
        );
        Ok(record)
    }

    /// Read, transform and conditionally replace a non-deleted record
    async fn apply_transition<F>(&self, record_id: &str, mut transition: F) -> Result<HabitatRecord>
    where
        F: FnMut(&mut HabitatRecord, DateTime) -> Result<()> + Send,
    {
        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            let current = self.load_active(record_id).await?;

            let now = next_timestamp(current.updated_at);
            let mut next = current.clone();
            transition(&mut next, now)?;
            next.updated_at = now;

            if self
                .store
                .replace_if_unchanged(record_id, current.updated_at, &next)
                .await?
            {
                return Ok(next);
            }

            debug!(record_id, attempt, "Record changed concurrently, retrying");
        }

        warn!(record_id, "Giving up after repeated concurrent updates");
        Err(BiotopError::Conflict(format!(
            "Record {} kept changing, try again",
            record_id
        )))
    }

    /// Token role first; a stale token is accepted when the directory
    /// already lists the caller as expert or admin. Returns the caller with
    /// the role that authorized the change, for audit entries.
    async fn require_verifier(&self, caller: &Caller) -> Result<Caller> {
        if caller.can_verify() {
            return Ok(caller.clone());
        }
        match self.users.privileged_role(&caller.email).await? {
            Some(role) => {
                debug!(caller = %caller.email, %role, "Token role is stale, using directory role");
                Ok(caller.clone().with_role(role))
            }
            None => Err(BiotopError::Forbidden(format!(
                "Role '{}' may not change verifications",
                caller.role
            ))),
        }
    }

    async fn load_active(&self, record_id: &str) -> Result<HabitatRecord> {
        self.store
            .find_one(record_id)
            .await?
            .filter(|record| !record.deleted)
            .ok_or_else(|| not_found(record_id))
    }
}

fn require_manager(caller: &Caller, record: &HabitatRecord) -> Result<()> {
    if caller.can_manage(&record.author_email) {
        Ok(())
    } else {
        Err(BiotopError::Forbidden(format!(
            "No permission to modify record {}",
            record.record_id
        )))
    }
}

fn is_stale(requested_at: DateTime, now: DateTime, stale_after: Duration) -> bool {
    let age = now.timestamp_millis().saturating_sub(requested_at.timestamp_millis());
    u128::try_from(age).is_ok_and(|age| age >= stale_after.as_millis())
}

/// Strictly after `previous`, normally the current time
fn next_timestamp(previous: DateTime) -> DateTime {
    let now = DateTime::now();
    if now > previous {
        now
    } else {
        DateTime::from_millis(previous.timestamp_millis() + 1)
    }
}

/// Verified result if any, else the automatic one
fn classification_snapshot(record: &HabitatRecord) -> Result<Document> {
    match record.effective_result() {
        Some(result) => Ok(result.snapshot()?),
        None => Ok(Document::new()),
    }
}

/// Verified result together with its derived status
fn verification_snapshot(record: &HabitatRecord) -> Result<Document> {
    let mut snapshot = match &record.verified_result {
        Some(result) => result.snapshot()?,
        None => Document::new(),
    };
    if let Some(status) = record.protection_status {
        snapshot.insert("protectionStatus", status.as_str());
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::memory::InMemoryRecordStore;
    use crate::db::schemas::ProtectionStatus;
    use crate::db::store::RecordStore;
    use crate::services::catalog::{HabitatCatalog, StaticHabitatCatalog};
    use crate::services::users::InMemoryUserDirectory;
    use async_trait::async_trait;

    fn expert() -> Caller {
        Caller::new("eva@example.org", Role::Expert).with_name("Eva")
    }

    async fn service_with(record: HabitatRecord) -> Arc<RecordService> {
        let store = Arc::new(InMemoryRecordStore::new());
        store.insert(record).unwrap();
        let catalog = StaticHabitatCatalog::new();
        catalog.ensure_seeded().await.unwrap();
        Arc::new(RecordService::new(
            store,
            Arc::new(InMemoryUserDirectory::new()),
            Arc::new(catalog),
        ))
    }

    #[test]
    fn test_next_timestamp_is_strictly_increasing() {
        let future = DateTime::from_millis(DateTime::now().timestamp_millis() + 60_000);
        assert_eq!(next_timestamp(future).timestamp_millis(), future.timestamp_millis() + 1);

        let past = DateTime::from_millis(1_000);
        assert!(next_timestamp(past) > past);
    }

    #[tokio::test]
    async fn test_verify_requires_privileged_role_and_habitat() {
        let service = service_with(HabitatRecord::new("r-1", "anna@example.org")).await;

        let user = Caller::new("anna@example.org", Role::User);
        let err = service.verify(&user, "r-1", "Magerwiese", None).await.unwrap_err();
        assert!(matches!(err, BiotopError::Forbidden(_)));

        let err = service.verify(&expert(), "r-1", "   ", None).await.unwrap_err();
        assert!(matches!(err, BiotopError::Validation(_)));

        let err = service.verify(&expert(), "r-1", "Mondwiese", None).await.unwrap_err();
        assert!(matches!(err, BiotopError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_directory_role_overrides_stale_token() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.insert(HabitatRecord::new("r-1", "anna@example.org")).unwrap();
        let users = InMemoryUserDirectory::with_users([crate::db::schemas::UserDoc::new(
            "promoted@example.org",
            Role::Expert,
        )]);
        let service = RecordService::new(
            store,
            Arc::new(users),
            Arc::new(StaticHabitatCatalog::with_types(crate::db::schemas::default_catalog())),
        );

        let stale = Caller::new("promoted@example.org", Role::User);
        let record = service.verify(&stale, "r-1", "Hecke", None).await.unwrap();
        assert!(record.verified);
        assert_eq!(record.verified_by.as_ref().unwrap().role, Role::Expert);
        assert_eq!(record.history.last().unwrap().user.role, Role::Expert);

        let record = service.unverify(&stale, "r-1").await.unwrap();
        assert_eq!(record.history.last().unwrap().user.role, Role::Expert);
    }

    #[tokio::test]
    async fn test_verify_fills_result_from_catalog() {
        let mut record = HabitatRecord::new("r-1", "anna@example.org");
        let mut auto = AnalysisResult::with_habitat("Fettwiese");
        auto.zusammenfassung = Some("Artenarme Wiese".into());
        record.auto_result = Some(auto);
        let service = service_with(record).await;

        let verified = service
            .verify(&expert(), "r-1", " Magerwiese ", Some("Viele Orchideen"))
            .await
            .unwrap();

        let result = verified.verified_result.as_ref().unwrap();
        assert_eq!(result.habitattyp.as_deref(), Some("Magerwiese"));
        assert_eq!(result.habitatfamilie.as_deref(), Some("Grünland"));
        assert_eq!(result.kommentar.as_deref(), Some("Viele Orchideen"));
        assert_eq!(result.zusammenfassung.as_deref(), Some("Artenarme Wiese"));
        assert_eq!(verified.protection_status, Some(ProtectionStatus::Red));
        assert_eq!(verified.verified_by.as_ref().unwrap().user_name, "Eva");

        let entry = verified.history.last().unwrap();
        assert_eq!(entry.module, MODULE_VERIFICATION);
        assert_eq!(entry.previous_result.get_str("habitattyp").unwrap(), "Fettwiese");
        assert_eq!(entry.changes.get_str("protectionStatus").unwrap(), "red");
    }

    #[tokio::test]
    async fn test_correct_requires_verified_record() {
        let service = service_with(HabitatRecord::new("r-1", "anna@example.org")).await;

        let err = service
            .correct(&expert(), "r-1", AnalysisResult::with_habitat("Hecke"))
            .await
            .unwrap_err();
        assert!(matches!(err, BiotopError::InvalidState(_)));

        let err = service
            .correct(&expert(), "r-1", AnalysisResult::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BiotopError::Validation(_)));
    }

    #[tokio::test]
    async fn test_correct_normalizes_weight_map() {
        let service = service_with(HabitatRecord::new("r-1", "anna@example.org")).await;
        service.verify(&expert(), "r-1", "Magerwiese", None).await.unwrap();

        let corrected = service
            .correct(
                &expert(),
                "r-1",
                AnalysisResult {
                    habitattyp: Some("Hecke".into()),
                    schutzstatus: Some(Schutzstatus::Weights(
                        doc! { "gesetzlich": 10, "hochwertig": 60 },
                    )),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(corrected.protection_status, Some(ProtectionStatus::Yellow));
        assert_eq!(
            corrected.verified_result.unwrap().schutzstatus,
            Some(Schutzstatus::Label("ökologisch hochwertig".into()))
        );
        assert_eq!(corrected.history.len(), 2);
        assert_eq!(corrected.history.last().unwrap().module, MODULE_CORRECTION);
    }

    #[tokio::test]
    async fn test_delete_permissions_and_repeat() {
        let service = service_with(HabitatRecord::new("r-1", "anna@example.org")).await;

        let stranger = Caller::new("bert@example.org", Role::User);
        let err = service.delete_record(&stranger, "r-1").await.unwrap_err();
        assert!(matches!(err, BiotopError::Forbidden(_)));

        let owner = Caller::new("anna@example.org", Role::User);
        let deleted = service.delete_record(&owner, "r-1").await.unwrap();
        assert!(deleted.deleted);
        assert_eq!(deleted.deleted_by.as_deref(), Some("anna@example.org"));
        assert_eq!(deleted.history.last().unwrap().module, MODULE_DELETION);

        let err = service.delete_record(&owner, "r-1").await.unwrap_err();
        assert!(matches!(err, BiotopError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reanalysis_without_classifier_leaves_record_alone() {
        let service = service_with(HabitatRecord::new("r-1", "anna@example.org")).await;
        let owner = Caller::new("anna@example.org", Role::User);

        let err = service.request_reanalysis(&owner, "r-1").await.unwrap_err();
        assert!(matches!(err, BiotopError::Upstream(_)));

        let record = service.get_record(&owner, "r-1").await.unwrap();
        assert_eq!(record.analysis_status, AnalysisStatus::Pending);
    }

    struct PanickingClassifier;

    #[async_trait]
    impl crate::services::classifier::Classifier for PanickingClassifier {
        async fn classify(&self, _record: &HabitatRecord) -> Result<AnalysisResult> {
            panic!("classifier crashed");
        }
    }

    struct EchoClassifier;

    #[async_trait]
    impl crate::services::classifier::Classifier for EchoClassifier {
        async fn classify(&self, _record: &HabitatRecord) -> Result<AnalysisResult> {
            Ok(AnalysisResult::with_habitat("Hecke"))
        }
    }

    async fn reanalysis_service(
        record: HabitatRecord,
        classifier: Arc<dyn crate::services::classifier::Classifier>,
    ) -> Arc<RecordService> {
        let store = Arc::new(InMemoryRecordStore::new());
        store.insert(record).unwrap();
        Arc::new(
            RecordService::new(
                store,
                Arc::new(InMemoryUserDirectory::new()),
                Arc::new(StaticHabitatCatalog::with_types(crate::db::schemas::default_catalog())),
            )
            .with_classifier(classifier),
        )
    }

    #[tokio::test]
    async fn test_panicking_classifier_ends_in_failed() {
        let service = reanalysis_service(
            HabitatRecord::new("r-1", "anna@example.org"),
            Arc::new(PanickingClassifier),
        )
        .await;
        let owner = Caller::new("anna@example.org", Role::User);

        let handle = service.request_reanalysis(&owner, "r-1").await.unwrap();
        handle.await.unwrap();

        let record = service.get_record(&owner, "r-1").await.unwrap();
        assert_eq!(record.analysis_status, AnalysisStatus::Failed);
        assert!(record.analysis_error.is_some());
        assert!(record.analysis_requested_at.is_none());
        assert_eq!(record.history.len(), 1);
        assert_eq!(record.history.last().unwrap().module, MODULE_REANALYSIS);

        // A failed attempt does not block the next one
        let handle = service.request_reanalysis(&owner, "r-1").await.unwrap();
        handle.await.unwrap();
        let record = service.get_record(&owner, "r-1").await.unwrap();
        assert_eq!(record.history.len(), 2);
    }

    #[tokio::test]
    async fn test_abandoned_analysis_is_taken_over() {
        let owner = Caller::new("anna@example.org", Role::User);

        let mut running = HabitatRecord::new("r-1", "anna@example.org");
        running.analysis_status = AnalysisStatus::Analyzing;
        running.analysis_requested_at = Some(DateTime::now());
        let service = reanalysis_service(running, Arc::new(EchoClassifier)).await;
        let err = service.request_reanalysis(&owner, "r-1").await.unwrap_err();
        assert!(matches!(err, BiotopError::InvalidState(_)));

        let mut abandoned = HabitatRecord::new("r-1", "anna@example.org");
        abandoned.analysis_status = AnalysisStatus::Analyzing;
        abandoned.analysis_requested_at =
            Some(DateTime::from_millis(DateTime::now().timestamp_millis() - 3_600_000));
        let service = reanalysis_service(abandoned, Arc::new(EchoClassifier)).await;
        let handle = service.request_reanalysis(&owner, "r-1").await.unwrap();
        handle.await.unwrap();

        let record = service.get_record(&owner, "r-1").await.unwrap();
        assert_eq!(record.analysis_status, AnalysisStatus::Completed);
        assert_eq!(record.effective_habitat(), Some("Hecke"));
    }

    #[test]
    fn test_is_stale() {
        let now = DateTime::from_millis(10_000);
        let window = Duration::from_secs(5);
        assert!(!is_stale(DateTime::from_millis(9_000), now, window));
        assert!(is_stale(DateTime::from_millis(5_000), now, window));
        assert!(!is_stale(DateTime::from_millis(20_000), now, window));
    }

    /// Store whose first replace always loses, as if another writer won
    struct RacingStore {
        inner: InMemoryRecordStore,
        losses: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl RecordStore for RacingStore {
        async fn find_one(&self, record_id: &str) -> Result<Option<HabitatRecord>> {
            self.inner.find_one(record_id).await
        }

        async fn replace_if_unchanged(
            &self,
            record_id: &str,
            expected_updated_at: DateTime,
            replacement: &HabitatRecord,
        ) -> Result<bool> {
            use std::sync::atomic::Ordering;
            if self.losses.load(Ordering::SeqCst) > 0 {
                self.losses.fetch_sub(1, Ordering::SeqCst);
                return Ok(false);
            }
            self.inner
                .replace_if_unchanged(record_id, expected_updated_at, replacement)
                .await
        }

        async fn find(
            &self,
            query: &crate::db::query::RecordQuery,
            sort: crate::db::query::RecordSort,
            page: crate::db::query::Page,
        ) -> Result<crate::db::query::RecordPage> {
            self.inner.find(query, sort, page).await
        }

        async fn aggregate_distinct(
            &self,
            field: crate::db::query::FacetField,
            query: &crate::db::query::RecordQuery,
        ) -> Result<Vec<crate::db::query::FacetBucket>> {
            self.inner.aggregate_distinct(field, query).await
        }
    }

    async fn racing_service(losses: usize) -> RecordService {
        let inner = InMemoryRecordStore::new();
        inner.insert(HabitatRecord::new("r-1", "anna@example.org")).unwrap();
        let catalog = StaticHabitatCatalog::new();
        catalog.ensure_seeded().await.unwrap();
        RecordService::new(
            Arc::new(RacingStore {
                inner,
                losses: std::sync::atomic::AtomicUsize::new(losses),
            }),
            Arc::new(InMemoryUserDirectory::new()),
            Arc::new(catalog),
        )
    }

    #[tokio::test]
    async fn test_transition_retries_after_lost_race() {
        let service = racing_service(MAX_TRANSITION_ATTEMPTS - 1).await;
        let record = service.verify(&expert(), "r-1", "Hecke", None).await.unwrap();
        assert!(record.verified);
        assert_eq!(record.history.len(), 1);
    }

    #[tokio::test]
    async fn test_transition_gives_up_with_conflict() {
        let service = racing_service(MAX_TRANSITION_ATTEMPTS).await;
        let err = service.verify(&expert(), "r-1", "Hecke", None).await.unwrap_err();
        assert!(matches!(err, BiotopError::Conflict(_)));

        let owner = Caller::new("anna@example.org", Role::User);
        let record = service.get_record(&owner, "r-1").await.unwrap();
        assert!(!record.verified);
        assert!(record.history.is_empty());
    }
}

//! Upload ingest pipeline.
//!
//! Routes each parsed record to the store gateway with source-terminal
//! attribution, then hands the syncable set to the fan-out. Records that
//! fail payload validation are dropped before the store but still reach
//! the fan-out so every active peer gets an audited "skipped" row.

use std::sync::Arc;

use tracing::warn;

use gatesync_core::wire::{validate_bio, FormatError, Record};

use crate::storage::{Database, DatabaseError, SyncLogParams};
use crate::sync::fanout::{Fanout, FanoutSummary};

pub struct Ingestor {
    db: Database,
    fanout: Arc<Fanout>,
    propagate_photos: bool,
}

/// Counts returned to the upload endpoint.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Records stored (the count the terminal sees in `OK: <count>`).
    pub accepted: usize,
    /// Peer commands queued by the fan-out.
    pub queued: usize,
    /// (peer, record) pairs skipped by the fan-out.
    pub skipped: usize,
}

impl Ingestor {
    pub const fn new(db: Database, fanout: Arc<Fanout>, propagate_photos: bool) -> Self {
        Self {
            db,
            fanout,
            propagate_photos,
        }
    }

    /// Ingest one upload body from a terminal.
    ///
    /// Malformed lines and validation failures are logged and excluded
    /// from the accepted count; store errors abort the request (the
    /// terminal will resume from its stamp).
    pub async fn ingest(&self, source: &str, body: &str) -> Result<IngestOutcome, DatabaseError> {
        let mut accepted = 0;
        let mut to_sync: Vec<Record> = Vec::new();

        for parsed in gatesync_core::wire::parse_payload(body) {
            let record = match parsed {
                Ok(record) => record,
                Err(e) => {
                    warn!(source = %source, error = %e, "Dropped malformed record");
                    continue;
                }
            };

            if let Err(reason) = validate_record(&record) {
                warn!(
                    source = %source,
                    tag = record.tag(),
                    key = %record.key(),
                    %reason,
                    "Record failed validation, dropped"
                );
                if record.is_syncable() {
                    to_sync.push(record);
                }
                continue;
            }

            self.store(source, &record).await?;
            accepted += 1;

            if self.should_sync(&record) {
                to_sync.push(record);
            }
        }

        let summary = if to_sync.is_empty() {
            FanoutSummary::default()
        } else {
            self.fanout.sync_records(source, &to_sync).await
        };

        Ok(IngestOutcome {
            accepted,
            queued: summary.queued,
            skipped: summary.skipped,
        })
    }

    fn should_sync(&self, record: &Record) -> bool {
        if record.is_syncable() {
            return true;
        }
        self.propagate_photos && matches!(record, Record::UserPic(_) | Record::BioPhoto(_))
    }

    async fn store(&self, source: &str, record: &Record) -> Result<(), DatabaseError> {
        match record {
            Record::User(u) => self.db.upsert_user(u, source).await,
            // The store knows only the unified biometric form; legacy tags
            // are translated here, at the ingest boundary.
            Record::Fingerprint(fp) => self.db.upsert_template(&fp.into(), source).await,
            Record::Face(face) => self.db.upsert_template(&face.into(), source).await,
            Record::FingerVein(fv) => self.db.upsert_template(&fv.into(), source).await,
            Record::BioData(b) => self.db.upsert_template(b, source).await,
            Record::UserPic(p) => self.db.upsert_user_photo(p, source).await,
            Record::BioPhoto(p) => self.db.upsert_bio_photo(p, source).await,
            Record::IdCard(c) => self.db.upsert_idcard(c, source).await,
            Record::WorkCode(w) => self.db.upsert_workcode(w, source).await,
            Record::Sms(s) => self.db.upsert_message(s, source).await,
            Record::UserSms(us) => self.db.upsert_user_message(us, source).await,
            Record::ErrorLog(e) => {
                self.db
                    .append_sync_log(&SyncLogParams {
                        source_sn: source,
                        target_sn: "",
                        record_type: "ERRORLOG",
                        record_key: &e.cmd_id,
                        action: &format!("{}:{}", e.data_origin, e.err_msg),
                        status: "logged",
                        detail: &e.err_code,
                    })
                    .await
            }
        }
    }
}

/// Enqueue-rule validation at the ingest boundary. Biometric material
/// gets the full template/slot checks; everything else just needs a
/// primary key, since a keyless row would corrupt the canonical tables.
fn validate_record(record: &Record) -> Result<(), FormatError> {
    match record {
        Record::User(u) if u.pin.is_empty() => Err(FormatError::EmptyPin),
        Record::Fingerprint(fp) => validate_bio(&fp.into()),
        Record::Face(face) => validate_bio(&face.into()),
        Record::FingerVein(fv) => validate_bio(&fv.into()),
        Record::BioData(b) => validate_bio(b),
        Record::Sms(s) if s.uid.is_empty() => Err(FormatError::EmptyKey),
        Record::IdCard(c) if c.id_num.is_empty() => Err(FormatError::EmptyKey),
        Record::WorkCode(w) if w.code.is_empty() => Err(FormatError::EmptyKey),
        _ => Ok(()),
    }
}

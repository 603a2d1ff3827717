//! Per-table reconciliation of a translated snapshot against the middleware store.
//!
//! `prepare` aligns incoming records with the table's columns and types, `diff` computes the change
//! set and `apply` writes it in one transaction, notifying the downstream sink around the write.

use diesel::Connection;
use diesel::sqlite::SqliteConnection;
use log::{error, info, warn};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

use crate::db::models::SyncTable;
use crate::models::record::Record;
use crate::services::scada::DownstreamSink;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{table}: reading existing rows failed: {source}")]
    Read {
        table: &'static str,
        #[source]
        source: diesel::result::Error,
    },
    #[error("{table}: {phase} failed: {source}")]
    Write {
        table: &'static str,
        phase: &'static str,
        /// Offending rows (or keys) as JSON.
        payload: String,
        #[source]
        source: diesel::result::Error,
    },
}

/// Incoming rows after column alignment and type coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared<R> {
    pub rows: Vec<R>,
    /// Records dropped for a blank or duplicate primary key.
    pub dropped: usize,
    /// Columns absent from every incoming record.
    pub backfilled: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet<R> {
    pub new: Vec<R>,
    pub update: Vec<R>,
    pub remove: BTreeSet<String>,
}

impl<R> ChangeSet<R> {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub table: &'static str,
    pub total: usize,
    pub new: usize,
    pub updated: usize,
    pub removed: usize,
    pub dropped: usize,
    pub pushed: usize,
    pub push_failures: usize,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushCounts {
    pub pushed: usize,
    pub failed: usize,
}

/// Align translated records with the columns of `R` and type them.
pub fn prepare<R: SyncTable>(records: &[Record]) -> Prepared<R> {
    let backfilled: Vec<&'static str> = if records.is_empty() {
        Vec::new()
    } else {
        R::COLUMNS
            .iter()
            .skip(1)
            .copied()
            .filter(|col| records.iter().all(|r| !r.contains(col)))
            .collect()
    };
    for col in &backfilled {
        if R::TEXT_COLUMNS.contains(col) {
            warn!("{}: column {} is missing from every record; backfilling with blanks", R::TABLE, col);
        } else {
            warn!("{}: column {} is missing from every record; storing NULL", R::TABLE, col);
        }
    }

    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(records.len());
    let mut dropped = 0;
    for record in records {
        let mut aligned: Record = R::COLUMNS
            .iter()
            .filter_map(|col| record.get(col).map(|v| (col.to_string(), v.clone())))
            .collect();
        // non-text columns stay absent and load as NULL
        for col in backfilled.iter().filter(|c| R::TEXT_COLUMNS.contains(c)) {
            aligned.insert(*col, "");
        }

        match R::from_record(&aligned) {
            Some(row) if seen.insert(row.key().to_string()) => rows.push(row),
            Some(row) => {
                warn!("{}: duplicate key {}; keeping the first occurrence", R::TABLE, row.key());
                dropped += 1;
            }
            None => {
                warn!("{}: dropping a record without {}", R::TABLE, R::COLUMNS[0]);
                dropped += 1;
            }
        }
    }

    Prepared {
        rows,
        dropped,
        backfilled,
    }
}

/// Compare incoming rows with the stored ones by primary key.
pub fn diff<R: SyncTable>(incoming: Vec<R>, existing: &[R]) -> ChangeSet<R> {
    let stored: HashMap<&str, &R> = existing.iter().map(|r| (r.key(), r)).collect();
    let incoming_keys: HashSet<&str> = incoming.iter().map(|r| r.key()).collect();

    let remove = existing
        .iter()
        .filter(|r| !incoming_keys.contains(r.key()))
        .map(|r| r.key().to_string())
        .collect();

    let mut new = Vec::new();
    let mut update = Vec::new();
    for row in incoming {
        match stored.get(row.key()) {
            None => new.push(row),
            Some(old) if **old != row => update.push(row),
            Some(_) => {}
        }
    }

    ChangeSet { new, update, remove }
}

fn push_rows<'a, R: SyncTable + 'a>(
    sink: &mut dyn DownstreamSink,
    records: impl Iterator<Item = (&'a str, Record)>,
) -> PushCounts {
    let mut counts = PushCounts::default();
    let Some(kind) = R::SCADA else {
        return counts;
    };
    for (key, record) in records {
        match sink.push(kind, &record) {
            Ok(()) => counts.pushed += 1,
            Err(e) => {
                error!("{}: downstream push of {} failed: {}", R::TABLE, key, e);
                counts.failed += 1;
            }
        }
    }
    counts
}

struct PhaseError {
    phase: &'static str,
    payload: String,
    source: diesel::result::Error,
}

impl From<diesel::result::Error> for PhaseError {
    fn from(source: diesel::result::Error) -> Self {
        PhaseError {
            phase: "commit",
            payload: String::new(),
            source,
        }
    }
}

fn as_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("<unserializable: {}>", e))
}

/// Write `changes` and notify `sink`: disable doomed rows, delete/update/insert in one transaction,
/// then push every updated and inserted row.
pub fn apply<R: SyncTable>(
    conn: &mut SqliteConnection,
    changes: &ChangeSet<R>,
    mut sink: Option<&mut (dyn DownstreamSink + '_)>,
) -> Result<PushCounts, SyncError> {
    let mut counts = PushCounts::default();
    let remove: Vec<String> = changes.remove.iter().cloned().collect();

    if let (Some(sink), Some(_), false) = (sink.as_deref_mut(), R::SCADA, remove.is_empty()) {
        let doomed = R::load_keys(conn, &remove).map_err(|source| SyncError::Read {
            table: R::TABLE,
            source,
        })?;
        let disabled = doomed.iter().map(|row| {
            let mut record = row.to_record();
            record.insert("enabled", false);
            (row.key(), record)
        });
        let c = push_rows::<R>(sink, disabled);
        info!("{}: disabled {} doomed rows downstream ({} failed)", R::TABLE, c.pushed, c.failed);
        counts.pushed += c.pushed;
        counts.failed += c.failed;
    }

    let written = conn.transaction::<_, PhaseError, _>(|conn| {
        let deleted = R::delete_keys(conn, &remove).map_err(|source| PhaseError {
            phase: "delete",
            payload: as_json(&remove),
            source,
        })?;
        info!("{}: deleted {} rows", R::TABLE, deleted);

        for row in &changes.update {
            R::update_row(conn, row).map_err(|source| PhaseError {
                phase: "update",
                payload: as_json(row),
                source,
            })?;
        }
        info!("{}: updated {} rows", R::TABLE, changes.update.len());

        let inserted = R::insert_rows(conn, &changes.new).map_err(|source| PhaseError {
            phase: "insert",
            payload: as_json(&changes.new),
            source,
        })?;
        info!("{}: inserted {} rows", R::TABLE, inserted);
        Ok(())
    });

    if let Err(e) = written {
        error!("{}: {} failed, transaction rolled back: {}; rows: {}", R::TABLE, e.phase, e.source, e.payload);
        return Err(SyncError::Write {
            table: R::TABLE,
            phase: e.phase,
            payload: e.payload,
            source: e.source,
        });
    }

    if let (Some(sink), Some(_)) = (sink, R::SCADA) {
        let changed = changes
            .update
            .iter()
            .chain(&changes.new)
            .map(|row| (row.key(), row.to_record()));
        let c = push_rows::<R>(sink, changed);
        info!("{}: pushed {} changed rows downstream ({} failed)", R::TABLE, c.pushed, c.failed);
        counts.pushed += c.pushed;
        counts.failed += c.failed;
    }

    Ok(counts)
}

/// Reconcile one table with the translated `records`.
pub fn reconcile<R: SyncTable>(
    conn: &mut SqliteConnection,
    records: &[Record],
    sink: Option<&mut (dyn DownstreamSink + '_)>,
    dry_run: bool,
) -> Result<TableSummary, SyncError> {
    let existing = R::load_all(conn).map_err(|source| SyncError::Read {
        table: R::TABLE,
        source,
    })?;
    let prepared = prepare::<R>(records);
    let total = prepared.rows.len();
    let changes = diff(prepared.rows, &existing);

    info!(
        "{}: {} incoming, {} stored, {} new, {} to update, {} to remove",
        R::TABLE,
        total,
        existing.len(),
        changes.new.len(),
        changes.update.len(),
        changes.remove.len()
    );

    let mut summary = TableSummary {
        table: R::TABLE,
        total,
        new: changes.new.len(),
        updated: changes.update.len(),
        removed: changes.remove.len(),
        dropped: prepared.dropped,
        dry_run,
        ..Default::default()
    };

    if dry_run {
        if !changes.remove.is_empty() {
            info!("{}: would remove {}", R::TABLE, as_json(&changes.remove));
        }
        return Ok(summary);
    }

    let counts = apply(conn, &changes, sink)?;
    summary.pushed = counts.pushed;
    summary.push_failures = counts.failed;
    Ok(summary)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::models::{EquipmentTagRow, ModbusEquipmentRow};
    use crate::db::store::test_connection;
    use crate::services::scada::{PayloadKind, ScadaError};
    use diesel::RunQueryDsl;
    use serde_json::json;

    /// Sink that records every push; optionally fails them all.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub pushes: Vec<(PayloadKind, Record)>,
        pub fail: bool,
    }

    impl DownstreamSink for RecordingSink {
        fn push(&mut self, kind: PayloadKind, row: &Record) -> Result<(), ScadaError> {
            self.pushes.push((kind, row.clone()));
            if self.fail {
                Err(ScadaError::Transport("unreachable".into()))
            } else {
                Ok(())
            }
        }
    }

    fn equipment(xid: &str, enabled: bool) -> Record {
        serde_json::from_value(json!({
            "xid_equip": xid,
            "xid_gateway": "GW1",
            "enabled": enabled,
            "host": "10.0.0.1",
            "port": 502,
            "type": "SENSOR",
            "updatePeriodType": "SECONDS",
            "fabricante": "Acme",
            "modelo": "M1",
            "sap_id": "42",
            "maxReadBitCount": 2000,
            "maxReadRegisterCount": 125,
            "maxWriteRegisterCount": 120,
            "retries": 2,
            "timeout": 500,
            "updatePeriods": 5,
        }))
        .unwrap()
    }

    fn stored_keys(conn: &mut SqliteConnection) -> Vec<(String, Option<bool>)> {
        ModbusEquipmentRow::load_all(conn)
            .unwrap()
            .into_iter()
            .map(|r| (r.xid_equip, r.enabled))
            .collect()
    }

    #[test]
    fn new_update_remove_scenario() {
        let mut conn = test_connection();
        reconcile::<ModbusEquipmentRow>(&mut conn, &[equipment("A", false), equipment("C", true)], None, false)
            .unwrap();

        let mut sink = RecordingSink::default();
        let incoming = [equipment("A", true), equipment("B", true)];
        let summary = reconcile::<ModbusEquipmentRow>(&mut conn, &incoming, Some(&mut sink), false).unwrap();

        assert_eq!((summary.new, summary.updated, summary.removed), (1, 1, 1));
        assert_eq!(
            stored_keys(&mut conn),
            vec![("A".to_string(), Some(true)), ("B".to_string(), Some(true))]
        );

        let pushed: Vec<(String, bool)> = sink
            .pushes
            .iter()
            .map(|(kind, r)| {
                assert_eq!(*kind, PayloadKind::ModbusDatasource);
                (r.text("xid_equip").unwrap(), r.flag("enabled").unwrap())
            })
            .collect();
        assert_eq!(
            pushed,
            vec![("C".to_string(), false), ("A".to_string(), true), ("B".to_string(), true)]
        );
        assert_eq!(summary.pushed, 3);
    }

    #[test]
    fn second_run_is_a_no_op() {
        let mut conn = test_connection();
        let incoming = [equipment("A", true), equipment("B", false)];
        let mut sink = RecordingSink::default();
        reconcile::<ModbusEquipmentRow>(&mut conn, &incoming, Some(&mut sink), false).unwrap();
        assert_eq!(sink.pushes.len(), 2);

        let mut sink = RecordingSink::default();
        let summary = reconcile::<ModbusEquipmentRow>(&mut conn, &incoming, Some(&mut sink), false).unwrap();
        assert_eq!((summary.new, summary.updated, summary.removed), (0, 0, 0));
        assert!(sink.pushes.is_empty());
    }

    #[test]
    fn identical_rows_are_not_updates() {
        let existing = vec![ModbusEquipmentRow::from_record(&equipment("A", true)).unwrap()];
        // numbers stored as text coerce to the same typed row
        let mut incoming = equipment("A", true);
        incoming.insert("port", "502");
        let changes = diff(prepare::<ModbusEquipmentRow>(&[incoming]).rows, &existing);
        assert!(changes.is_empty());
    }

    #[test]
    fn empty_snapshot_clears_the_table() {
        let mut conn = test_connection();
        reconcile::<ModbusEquipmentRow>(&mut conn, &[equipment("A", true), equipment("B", true)], None, false)
            .unwrap();

        let changes = diff::<ModbusEquipmentRow>(Vec::new(), &ModbusEquipmentRow::load_all(&mut conn).unwrap());
        assert!(changes.new.is_empty() && changes.update.is_empty());
        assert_eq!(changes.remove.iter().collect::<Vec<_>>(), vec!["A", "B"]);

        let summary = reconcile::<ModbusEquipmentRow>(&mut conn, &[], None, false).unwrap();
        assert_eq!(summary.removed, 2);
        assert!(stored_keys(&mut conn).is_empty());
    }

    #[test]
    fn dry_run_leaves_the_store_alone() {
        let mut conn = test_connection();
        let mut sink = RecordingSink::default();
        let summary =
            reconcile::<ModbusEquipmentRow>(&mut conn, &[equipment("A", true)], Some(&mut sink), true).unwrap();
        assert_eq!(summary.new, 1);
        assert!(summary.dry_run);
        assert!(stored_keys(&mut conn).is_empty());
        assert!(sink.pushes.is_empty());
    }

    #[test]
    fn missing_columns_are_backfilled() {
        let records: Vec<Record> = ["A", "B"]
            .iter()
            .map(|xid| {
                let mut r = equipment(xid, true);
                r.remove("fabricante");
                r.remove("port");
                r.insert("not_a_column", "x");
                r
            })
            .collect();
        let prepared = prepare::<ModbusEquipmentRow>(&records);
        assert_eq!(prepared.backfilled, vec!["fabricante", "port"]);
        assert_eq!(prepared.rows[0].fabricante.as_deref(), Some(""));
        assert_eq!(prepared.rows[0].port, None);
    }

    #[test]
    fn blank_and_duplicate_keys_are_dropped() {
        let mut first = equipment("A", true);
        first.insert("host", "first");
        let mut second = equipment("A", false);
        second.insert("host", "second");
        let prepared = prepare::<ModbusEquipmentRow>(&[first, equipment(" ", true), second]);
        assert_eq!(prepared.dropped, 2);
        assert_eq!(prepared.rows.len(), 1);
        assert_eq!(prepared.rows[0].host.as_deref(), Some("first"));
    }

    #[test]
    fn push_failures_do_not_roll_back_writes() {
        let mut conn = test_connection();
        let mut sink = RecordingSink {
            fail: true,
            ..Default::default()
        };
        let summary = reconcile::<ModbusEquipmentRow>(
            &mut conn,
            &[equipment("A", true), equipment("B", true)],
            Some(&mut sink),
            false,
        )
        .unwrap();
        assert_eq!(summary.push_failures, 2);
        assert_eq!(sink.pushes.len(), 2);
        assert_eq!(stored_keys(&mut conn).len(), 2);
    }

    #[test]
    fn failed_insert_rolls_back_the_table() {
        let mut conn = test_connection();
        let tag = |id: &str| -> Record {
            serde_json::from_value(json!({"id": id, "xid_equip": "s1", "nome": "fase", "valor": "A"})).unwrap()
        };
        reconcile::<EquipmentTagRow>(&mut conn, &[tag("1")], None, false).unwrap();
        diesel::sql_query(
            "CREATE TRIGGER reject_tags BEFORE INSERT ON \"EQP_TAGS\" BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .execute(&mut conn)
        .unwrap();

        let err = reconcile::<EquipmentTagRow>(&mut conn, &[tag("2")], None, false).unwrap_err();
        match err {
            SyncError::Write { table, phase, payload, .. } => {
                assert_eq!(table, "EQP_TAGS");
                assert_eq!(phase, "insert");
                assert!(payload.contains("\"id\":\"2\""));
            }
            other => panic!("unexpected error {other}"),
        }
        // the delete of tag 1 was rolled back with the failed insert
        let ids: Vec<String> = EquipmentTagRow::load_all(&mut conn).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["1"]);
    }
}

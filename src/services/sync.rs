//! The sync pipeline: translate a flat snapshot into each middleware table and reconcile the tables
//! one after another.

use diesel::sqlite::SqliteConnection;
use log::{error, info, warn};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

use crate::db::models::{
    DatapointTagRow, Dnp3DatapointRow, Dnp3EquipmentRow, EquipmentTagRow, GatewayRow, ModbusDatapointRow,
    ModbusEquipmentRow, SyncTable,
};
use crate::models::inventory::Tag;
use crate::models::record::Record;
use crate::services::reconcile::{SyncError, TableSummary, reconcile};
use crate::services::scada::{DownstreamSink, ForwardStats};
use crate::services::snapshot::{FlatSnapshot, SkippedEntity};
use crate::translate::{Section, Translator, Vocabulary};

/// Where tags live in an assembly record and which middleware column names their owner.
struct TagSource {
    tags_field: &'static str,
    owner_field: &'static str,
}

const SENSOR_TAGS_MODBUS: TagSource = TagSource {
    tags_field: "tags_sen",
    owner_field: "id_sen",
};
const SENSOR_TAGS_DNP3: TagSource = TagSource {
    tags_field: "tags_sen_dnp3",
    owner_field: "id_sen_dnp3",
};
const REGISTER_TAGS_MODBUS: TagSource = TagSource {
    tags_field: "tags_reg_mod",
    owner_field: "id_reg_mod",
};
const REGISTER_TAGS_DNP3: TagSource = TagSource {
    tags_field: "tags_reg_dnp3",
    owner_field: "id_reg_dnp3",
};

/// Expand the JSON tag lists embedded in assembly records into `{id, <owner_column>, nome, valor}`
/// records, one per distinct tag id.
fn expand_tags(records: &[Record], source: &TagSource, owner_column: &str) -> Vec<Record> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for record in records {
        let Some(owner) = record.key_text(source.owner_field) else {
            continue;
        };
        let tags: Vec<Tag> = match record.get(source.tags_field) {
            None | Some(Value::Null) => continue,
            Some(Value::String(text)) if text.trim().is_empty() => continue,
            Some(Value::String(text)) => match serde_json::from_str(text) {
                Ok(tags) => tags,
                Err(e) => {
                    warn!("{} of {} is not a tag list: {}", source.tags_field, owner, e);
                    continue;
                }
            },
            Some(other) => match serde_json::from_value(other.clone()) {
                Ok(tags) => tags,
                Err(e) => {
                    warn!("{} of {} is not a tag list: {}", source.tags_field, owner, e);
                    continue;
                }
            },
        };
        for tag in tags {
            if !seen.insert(tag.id.clone()) {
                continue;
            }
            let valor = match tag.value {
                None | Some(Value::Null) => Value::Null,
                Some(Value::String(s)) => Value::String(s),
                Some(other) => Value::String(other.to_string()),
            };
            out.push(
                Record::new()
                    .with("id", tag.id)
                    .with(owner_column, owner.clone())
                    .with("nome", tag.name)
                    .with("valor", valor),
            );
        }
    }
    out
}

pub fn equipment_tags(flat: &FlatSnapshot) -> Vec<Record> {
    let mut tags = expand_tags(&flat.modbus, &SENSOR_TAGS_MODBUS, "xid_equip");
    tags.extend(expand_tags(&flat.dnp3, &SENSOR_TAGS_DNP3, "xid_equip"));
    tags
}

pub fn datapoint_tags(flat: &FlatSnapshot) -> Vec<Record> {
    let mut tags = expand_tags(&flat.modbus, &REGISTER_TAGS_MODBUS, "xid_sensor");
    tags.extend(expand_tags(&flat.dnp3, &REGISTER_TAGS_DNP3, "xid_sensor"));
    tags
}

/// Leaf records repeat their sensor once per register; keep the first leaf of each sensor.
/// Records without a sensor id pass through and are dropped later for lacking a key.
fn one_per_sensor(records: &[Record], sensor_field: &str) -> Vec<Record> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| r.key_text(sensor_field).is_none_or(|id| seen.insert(id)))
        .cloned()
        .collect()
}

/// Translate assembly records into the middleware vocabulary; later sections win on collisions.
pub fn to_middleware(translator: &Translator, sections: &[Section], records: &[Record]) -> Vec<Record> {
    translator
        .mapping(sections, Vocabulary::Assembly, Vocabulary::Middleware)
        .apply_all(records)
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub tables: Vec<TableSummary>,
    pub failures: Vec<String>,
    pub forwarded: Option<ForwardStats>,
    pub skipped: Vec<SkippedEntity>,
}

impl SyncReport {
    fn record(&mut self, result: Result<TableSummary, SyncError>) {
        match result {
            Ok(summary) => self.tables.push(summary),
            Err(e) => {
                error!("{}", e);
                self.failures.push(e.to_string());
            }
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in &self.tables {
            write!(
                f,
                "{:<14} total {:>6}  new {:>5}  updated {:>5}  removed {:>5}",
                t.table, t.total, t.new, t.updated, t.removed
            )?;
            if t.dropped > 0 {
                write!(f, "  dropped {}", t.dropped)?;
            }
            if t.dry_run {
                write!(f, "  (dry run)")?;
            }
            writeln!(f)?;
        }
        for failure in &self.failures {
            writeln!(f, "failed: {}", failure)?;
        }
        if let Some(s) = &self.forwarded {
            writeln!(f, "SCADA: {} sent, {} rejected, {} failed", s.sent, s.rejected, s.failed)?;
        }
        if !self.skipped.is_empty() {
            writeln!(f, "skipped {} entities:", self.skipped.len())?;
            for s in &self.skipped {
                writeln!(f, "  {} {}: {}", s.kind, s.id, s.reason)?;
            }
        }
        Ok(())
    }
}

fn sync_table<R: SyncTable>(
    report: &mut SyncReport,
    conn: &mut SqliteConnection,
    records: &[Record],
    sink: Option<&mut (dyn DownstreamSink + '_)>,
    dry_run: bool,
) {
    info!("Reconciling {} ({} records)", R::TABLE, records.len());
    report.record(reconcile::<R>(conn, records, sink, dry_run));
}

/// Reconcile every middleware table against `flat`. Table failures are recorded and the next
/// table proceeds.
pub fn sync_snapshot(
    conn: &mut SqliteConnection,
    translator: &Translator,
    flat: &FlatSnapshot,
    mut sink: Option<&mut (dyn DownstreamSink + '_)>,
    dry_run: bool,
) -> SyncReport {
    let mut report = SyncReport::default();

    let gateways = to_middleware(translator, &[Section::Gateway], &flat.gateways);
    sync_table::<GatewayRow>(&mut report, conn, &gateways, sink.as_deref_mut(), dry_run);

    let modbus_equipment = to_middleware(
        translator,
        &[Section::Gateway, Section::Hardware, Section::SensorModbus],
        &one_per_sensor(&flat.modbus, SENSOR_TAGS_MODBUS.owner_field),
    );
    sync_table::<ModbusEquipmentRow>(&mut report, conn, &modbus_equipment, sink.as_deref_mut(), dry_run);

    let modbus_points = to_middleware(translator, &[Section::SensorModbus, Section::RegisterModbus], &flat.modbus);
    sync_table::<ModbusDatapointRow>(&mut report, conn, &modbus_points, sink.as_deref_mut(), dry_run);

    let dnp3_equipment = to_middleware(
        translator,
        &[Section::Gateway, Section::Hardware, Section::SensorDnp3],
        &one_per_sensor(&flat.dnp3, SENSOR_TAGS_DNP3.owner_field),
    );
    sync_table::<Dnp3EquipmentRow>(&mut report, conn, &dnp3_equipment, sink.as_deref_mut(), dry_run);

    let dnp3_points = to_middleware(translator, &[Section::SensorDnp3, Section::RegisterDnp3], &flat.dnp3);
    sync_table::<Dnp3DatapointRow>(&mut report, conn, &dnp3_points, sink.as_deref_mut(), dry_run);

    sync_table::<EquipmentTagRow>(&mut report, conn, &equipment_tags(flat), sink.as_deref_mut(), dry_run);
    sync_table::<DatapointTagRow>(&mut report, conn, &datapoint_tags(flat), sink.as_deref_mut(), dry_run);

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::test_connection;
    use crate::services::reconcile::tests::RecordingSink;
    use crate::services::scada::PayloadKind;
    use serde_json::json;

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn modbus_leaf(sensor: &str, register: &str, tags: &str) -> Record {
        record(json!({
            "id_gtw": "g1",
            "name_gtw": "GW-01",
            "ip_gtw": "10.0.0.1",
            "active_gtw": true,
            "name_sub": "Sub Norte",
            "sapAbbreviation_sub": "NRT",
            "id_hdw": "h1",
            "sapId_hdw": "SAP-1",
            "type_hdw": "TRAFO",
            "id_sen": sensor,
            "name_sen": "Medidor",
            "ip_sen": "10.0.0.9",
            "port_sen": 502,
            "active_sen": true,
            "tags_sen": r#"[{"id":"t1","name":"fase","value":"A"}]"#,
            "id_reg_mod": register,
            "name_reg_mod": "Tensao",
            "multiplier_reg_mod": 0.1,
            "active_reg_mod": true,
            "tags_reg_mod": tags,
        }))
    }

    fn snapshot() -> FlatSnapshot {
        FlatSnapshot {
            gateways: vec![record(json!({
                "id_gtw": "g1",
                "name_gtw": "GW-01",
                "ip_gtw": "10.0.0.1",
                "active_gtw": true,
                "name_sub": "Sub Norte",
            }))],
            modbus: vec![
                modbus_leaf("s1", "r1", r#"[{"id":"rt1","name":"unidade","value":"V"}]"#),
                modbus_leaf("s1", "r2", "[]"),
            ],
            dnp3: Vec::new(),
        }
    }

    #[test]
    fn tags_expand_once_per_tag() {
        let flat = snapshot();
        let eqp = equipment_tags(&flat);
        assert_eq!(
            eqp,
            vec![record(json!({"id": "t1", "xid_equip": "s1", "nome": "fase", "valor": "A"}))]
        );
        let dp = datapoint_tags(&flat);
        assert_eq!(
            dp,
            vec![record(json!({"id": "rt1", "xid_sensor": "r1", "nome": "unidade", "valor": "V"}))]
        );
    }

    #[test]
    fn non_text_tag_values_are_rendered() {
        let rec = record(json!({"id_sen": "s1", "tags_sen": r#"[{"id":"t9","name":"limite","value":42}]"#}));
        let tags = expand_tags(&[rec], &SENSOR_TAGS_MODBUS, "xid_equip");
        assert_eq!(tags[0].text("valor").as_deref(), Some("42"));

        let broken = record(json!({"id_sen": "s1", "tags_sen": "not json"}));
        assert!(expand_tags(&[broken], &SENSOR_TAGS_MODBUS, "xid_equip").is_empty());
    }

    #[test]
    fn pipeline_fills_every_table_and_then_settles() {
        let translator = Translator::load().unwrap();
        let mut conn = test_connection();
        let flat = snapshot();

        let mut sink = RecordingSink::default();
        let report = sync_snapshot(&mut conn, &translator, &flat, Some(&mut sink), false);
        assert!(report.failures.is_empty(), "{:?}", report.failures);

        let news: Vec<(&str, usize)> = report.tables.iter().map(|t| (t.table, t.new)).collect();
        assert_eq!(
            news,
            vec![
                ("CMA_GD", 1),
                ("EQP_MODBUS_IP", 1),
                ("DP_MODBUS_IP", 2),
                ("EQP_DNP3", 0),
                ("DP_DNP3", 0),
                ("EQP_TAGS", 1),
                ("DP_TAGS", 1),
            ]
        );
        let kinds: Vec<PayloadKind> = sink.pushes.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                PayloadKind::ModbusDatasource,
                PayloadKind::ModbusDatapoint,
                PayloadKind::ModbusDatapoint
            ]
        );

        let gateways = GatewayRow::load_all(&mut conn).unwrap();
        assert_eq!(gateways[0].xid_gateway, "GW-01");
        assert_eq!(gateways[0].status, Some(true));
        let points = ModbusDatapointRow::load_all(&mut conn).unwrap();
        assert_eq!(points[0].xid_sensor, "r1");
        assert_eq!(points[0].xid_equip.as_deref(), Some("s1"));
        assert_eq!(points[0].multiplier, Some(0.1));

        let mut sink = RecordingSink::default();
        let again = sync_snapshot(&mut conn, &translator, &flat, Some(&mut sink), false);
        assert!(again.tables.iter().all(|t| t.new + t.updated + t.removed == 0));
        assert!(sink.pushes.is_empty());
    }

    #[test]
    fn registers_of_one_sensor_make_one_equipment_row() {
        let flat = snapshot();
        let mut orphan = modbus_leaf("s1", "r3", "[]");
        orphan.remove("id_sen");
        let leaves = [flat.modbus.clone(), vec![orphan]].concat();
        let kept = one_per_sensor(&leaves, "id_sen");
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].text("id_reg_mod").as_deref(), Some("r1"));
        assert!(!kept[1].contains("id_sen"));

        let translator = Translator::load().unwrap();
        let mut conn = test_connection();
        let report = sync_snapshot(&mut conn, &translator, &flat, None, false);
        let eqp = report.tables.iter().find(|t| t.table == "EQP_MODBUS_IP").unwrap();
        assert_eq!((eqp.total, eqp.new, eqp.dropped), (1, 1, 0));
        assert!(!report.to_string().contains("dropped"));
    }

    #[test]
    fn report_lists_tables_and_skips() {
        let report = SyncReport {
            tables: vec![TableSummary {
                table: "CMA_GD",
                total: 3,
                new: 1,
                ..Default::default()
            }],
            failures: vec!["EQP_TAGS: insert failed".into()],
            forwarded: Some(ForwardStats {
                sent: 2,
                rejected: 1,
                failed: 0,
            }),
            skipped: Vec::new(),
        };
        let text = report.to_string();
        assert!(text.starts_with("CMA_GD"));
        assert!(text.contains("failed: EQP_TAGS: insert failed"));
        assert!(text.contains("SCADA: 2 sent, 1 rejected, 0 failed"));
        assert!(!report.is_clean());
    }
}

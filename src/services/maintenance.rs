use diesel::Connection;
use diesel::sqlite::SqliteConnection;
use log::info;
use std::io::{self, Write};
use thiserror::Error;

use crate::db::models::{
    DatapointTagRow, Dnp3DatapointRow, Dnp3EquipmentRow, EquipmentTagRow, GatewayRow, ModbusDatapointRow,
    ModbusEquipmentRow, SyncTable, TableKind,
};

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("database error: {0}")]
    Db(#[from] diesel::result::Error),
    #[error("write error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Empty every middleware table in one transaction. Returns per-table deleted counts.
pub fn truncate_all(conn: &mut SqliteConnection) -> Result<Vec<(&'static str, usize)>, MaintenanceError> {
    let counts = conn.transaction::<_, diesel::result::Error, _>(|conn| {
        Ok(vec![
            (GatewayRow::TABLE, GatewayRow::truncate(conn)?),
            (ModbusEquipmentRow::TABLE, ModbusEquipmentRow::truncate(conn)?),
            (ModbusDatapointRow::TABLE, ModbusDatapointRow::truncate(conn)?),
            (Dnp3EquipmentRow::TABLE, Dnp3EquipmentRow::truncate(conn)?),
            (Dnp3DatapointRow::TABLE, Dnp3DatapointRow::truncate(conn)?),
            (EquipmentTagRow::TABLE, EquipmentTagRow::truncate(conn)?),
            (DatapointTagRow::TABLE, DatapointTagRow::truncate(conn)?),
        ])
    })?;
    for (table, deleted) in &counts {
        info!("Truncated {}: {} rows deleted", table, deleted);
    }
    Ok(counts)
}

fn write_rows<R: SyncTable>(conn: &mut SqliteConnection, out: &mut dyn Write) -> Result<usize, MaintenanceError> {
    let rows = R::load_all(conn)?;
    for row in &rows {
        serde_json::to_writer(&mut *out, &row.to_record())?;
        out.write_all(b"\n")?;
    }
    Ok(rows.len())
}

/// Print every row of `table` as one JSON object per line, keyed by middleware column names.
pub fn show_table(conn: &mut SqliteConnection, table: TableKind, out: &mut dyn Write) -> Result<usize, MaintenanceError> {
    let count = match table {
        TableKind::Gateways => write_rows::<GatewayRow>(conn, out)?,
        TableKind::ModbusEquipment => write_rows::<ModbusEquipmentRow>(conn, out)?,
        TableKind::ModbusDatapoints => write_rows::<ModbusDatapointRow>(conn, out)?,
        TableKind::Dnp3Equipment => write_rows::<Dnp3EquipmentRow>(conn, out)?,
        TableKind::Dnp3Datapoints => write_rows::<Dnp3DatapointRow>(conn, out)?,
        TableKind::EquipmentTags => write_rows::<EquipmentTagRow>(conn, out)?,
        TableKind::DatapointTags => write_rows::<DatapointTagRow>(conn, out)?,
    };
    out.flush()?;
    info!("{}: {} rows", table.sql_name(), count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::test_connection;
    use crate::models::record::Record;
    use crate::services::reconcile::reconcile;
    use serde_json::json;

    fn gateways(conn: &mut SqliteConnection) {
        let records: Vec<Record> = ["GW-01", "GW-02"]
            .iter()
            .map(|name| serde_json::from_value(json!({"xid_gateway": name, "host": "10.0.0.1", "status": true})).unwrap())
            .collect();
        reconcile::<GatewayRow>(conn, &records, None, false).unwrap();
    }

    #[test]
    fn show_prints_json_lines() {
        let mut conn = test_connection();
        gateways(&mut conn);
        let mut out = Vec::new();
        assert_eq!(show_table(&mut conn, TableKind::Gateways, &mut out).unwrap(), 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["xid_gateway"], "GW-01");
        assert_eq!(lines[1]["status"], true);
    }

    #[test]
    fn truncate_empties_every_table() {
        let mut conn = test_connection();
        gateways(&mut conn);
        let counts = truncate_all(&mut conn).unwrap();
        assert_eq!(counts.len(), TableKind::ALL.len());
        assert_eq!(counts[0], ("CMA_GD", 2));
        assert!(counts[1..].iter().all(|(_, n)| *n == 0));
        assert!(GatewayRow::load_all(&mut conn).unwrap().is_empty());
    }
}

//! Typed rows of the middleware tables and the [`SyncTable`] contract the reconciliation engine
//! works against.
//!
//! Each row converts from a middleware-vocabulary [`Record`] (coercing cells to column types) and
//! back, and gets the same set of store operations generated by `store_ops!`.

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::models::record::Record;
use crate::schema;
use crate::services::scada::PayloadKind;

/// Upper bound of bound parameters per statement; well under SQLite's variable limit.
const KEY_CHUNK: usize = 500;
/// Rows per multi-row INSERT.
const INSERT_CHUNK: usize = 200;

/// A persisted table the reconciliation engine can diff and write.
pub trait SyncTable: Clone + PartialEq + Debug + Serialize + Sized {
    /// SQL table name.
    const TABLE: &'static str;
    /// Middleware column names, primary key first.
    const COLUMNS: &'static [&'static str];
    /// Text columns; these are backfilled with a blank string on schema drift.
    const TEXT_COLUMNS: &'static [&'static str];
    /// Payload kind forwarded downstream for this table, if any.
    const SCADA: Option<PayloadKind>;

    fn key(&self) -> &str;

    /// `None` when the record has no usable primary key.
    fn from_record(record: &Record) -> Option<Self>;

    fn to_record(&self) -> Record;

    fn load_all(conn: &mut SqliteConnection) -> QueryResult<Vec<Self>>;
    fn load_keys(conn: &mut SqliteConnection, keys: &[String]) -> QueryResult<Vec<Self>>;
    fn insert_rows(conn: &mut SqliteConnection, rows: &[Self]) -> QueryResult<usize>;
    fn update_row(conn: &mut SqliteConnection, row: &Self) -> QueryResult<usize>;
    fn delete_keys(conn: &mut SqliteConnection, keys: &[String]) -> QueryResult<usize>;
    fn truncate(conn: &mut SqliteConnection) -> QueryResult<usize>;
}

macro_rules! store_ops {
    ($table:ident, $key:ident) => {
        fn load_all(conn: &mut SqliteConnection) -> QueryResult<Vec<Self>> {
            schema::$table::table
                .select(Self::as_select())
                .order(schema::$table::$key)
                .load(conn)
        }

        fn load_keys(conn: &mut SqliteConnection, keys: &[String]) -> QueryResult<Vec<Self>> {
            let mut rows = Vec::with_capacity(keys.len());
            for chunk in keys.chunks(KEY_CHUNK) {
                let mut part = schema::$table::table
                    .filter(schema::$table::$key.eq_any(chunk))
                    .select(Self::as_select())
                    .load(conn)?;
                rows.append(&mut part);
            }
            Ok(rows)
        }

        fn insert_rows(conn: &mut SqliteConnection, rows: &[Self]) -> QueryResult<usize> {
            let mut inserted = 0;
            for chunk in rows.chunks(INSERT_CHUNK) {
                inserted += diesel::insert_into(schema::$table::table)
                    .values(chunk)
                    .execute(conn)?;
            }
            Ok(inserted)
        }

        fn update_row(conn: &mut SqliteConnection, row: &Self) -> QueryResult<usize> {
            diesel::update(schema::$table::table.find(&row.$key))
                .set(row)
                .execute(conn)
        }

        fn delete_keys(conn: &mut SqliteConnection, keys: &[String]) -> QueryResult<usize> {
            let mut deleted = 0;
            for chunk in keys.chunks(KEY_CHUNK) {
                deleted += diesel::delete(schema::$table::table.filter(schema::$table::$key.eq_any(chunk)))
                    .execute(conn)?;
            }
            Ok(deleted)
        }

        fn truncate(conn: &mut SqliteConnection) -> QueryResult<usize> {
            diesel::delete(schema::$table::table).execute(conn)
        }
    };
}

/// Tables known to the CLI, in reconciliation order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
pub enum TableKind {
    Gateways,
    ModbusEquipment,
    ModbusDatapoints,
    Dnp3Equipment,
    Dnp3Datapoints,
    EquipmentTags,
    DatapointTags,
}

impl TableKind {
    pub const ALL: [TableKind; 7] = [
        TableKind::Gateways,
        TableKind::ModbusEquipment,
        TableKind::ModbusDatapoints,
        TableKind::Dnp3Equipment,
        TableKind::Dnp3Datapoints,
        TableKind::EquipmentTags,
        TableKind::DatapointTags,
    ];

    pub fn sql_name(self) -> &'static str {
        match self {
            TableKind::Gateways => GatewayRow::TABLE,
            TableKind::ModbusEquipment => ModbusEquipmentRow::TABLE,
            TableKind::ModbusDatapoints => ModbusDatapointRow::TABLE,
            TableKind::Dnp3Equipment => Dnp3EquipmentRow::TABLE,
            TableKind::Dnp3Datapoints => Dnp3DatapointRow::TABLE,
            TableKind::EquipmentTags => EquipmentTagRow::TABLE,
            TableKind::DatapointTags => DatapointTagRow::TABLE,
        }
    }
}

// =====================
// CMA_GD
// =====================

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = schema::cma_gd, primary_key(xid_gateway), treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct GatewayRow {
    pub xid_gateway: String,
    pub subestacao: Option<String>,
    pub regional: Option<String>,
    pub host: Option<String>,
    pub status: Option<bool>,
}

impl SyncTable for GatewayRow {
    const TABLE: &'static str = "CMA_GD";
    const COLUMNS: &'static [&'static str] = &["xid_gateway", "subestacao", "regional", "host", "status"];
    const TEXT_COLUMNS: &'static [&'static str] = &["subestacao", "regional", "host"];
    const SCADA: Option<PayloadKind> = None;

    fn key(&self) -> &str {
        &self.xid_gateway
    }

    fn from_record(r: &Record) -> Option<Self> {
        Some(GatewayRow {
            xid_gateway: r.key_text("xid_gateway")?,
            subestacao: r.text("subestacao"),
            regional: r.text("regional"),
            host: r.text("host"),
            status: r.flag("status"),
        })
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("xid_gateway", self.xid_gateway.clone())
            .with("subestacao", self.subestacao.clone())
            .with("regional", self.regional.clone())
            .with("host", self.host.clone())
            .with("status", self.status)
    }

    store_ops!(cma_gd, xid_gateway);
}

// =====================
// EQP_MODBUS_IP
// =====================

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = schema::eqp_modbus_ip, primary_key(xid_equip), treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ModbusEquipmentRow {
    pub xid_equip: String,
    pub xid_gateway: Option<String>,
    pub fabricante: Option<String>,
    pub modelo: Option<String>,
    pub equipment_type: Option<String>,
    pub sap_id: Option<String>,
    pub enabled: Option<bool>,
    pub update_period_type: Option<String>,
    pub max_read_bit_count: Option<i64>,
    pub max_read_register_count: Option<i64>,
    pub max_write_register_count: Option<i64>,
    pub host: Option<String>,
    pub port: Option<i64>,
    pub retries: Option<i64>,
    pub timeout: Option<i64>,
    pub update_periods: Option<i64>,
}

impl SyncTable for ModbusEquipmentRow {
    const TABLE: &'static str = "EQP_MODBUS_IP";
    const COLUMNS: &'static [&'static str] = &[
        "xid_equip",
        "xid_gateway",
        "fabricante",
        "modelo",
        "type",
        "sap_id",
        "enabled",
        "updatePeriodType",
        "maxReadBitCount",
        "maxReadRegisterCount",
        "maxWriteRegisterCount",
        "host",
        "port",
        "retries",
        "timeout",
        "updatePeriods",
    ];
    const TEXT_COLUMNS: &'static [&'static str] =
        &["xid_gateway", "fabricante", "modelo", "type", "sap_id", "updatePeriodType", "host"];
    const SCADA: Option<PayloadKind> = Some(PayloadKind::ModbusDatasource);

    fn key(&self) -> &str {
        &self.xid_equip
    }

    fn from_record(r: &Record) -> Option<Self> {
        Some(ModbusEquipmentRow {
            xid_equip: r.key_text("xid_equip")?,
            xid_gateway: r.text("xid_gateway"),
            fabricante: r.text("fabricante"),
            modelo: r.text("modelo"),
            equipment_type: r.text("type"),
            sap_id: r.text("sap_id"),
            enabled: r.flag("enabled"),
            update_period_type: r.text("updatePeriodType"),
            max_read_bit_count: r.int("maxReadBitCount"),
            max_read_register_count: r.int("maxReadRegisterCount"),
            max_write_register_count: r.int("maxWriteRegisterCount"),
            host: r.text("host"),
            port: r.int("port"),
            retries: r.int("retries"),
            timeout: r.int("timeout"),
            update_periods: r.int("updatePeriods"),
        })
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("xid_equip", self.xid_equip.clone())
            .with("xid_gateway", self.xid_gateway.clone())
            .with("fabricante", self.fabricante.clone())
            .with("modelo", self.modelo.clone())
            .with("type", self.equipment_type.clone())
            .with("sap_id", self.sap_id.clone())
            .with("enabled", self.enabled)
            .with("updatePeriodType", self.update_period_type.clone())
            .with("maxReadBitCount", self.max_read_bit_count)
            .with("maxReadRegisterCount", self.max_read_register_count)
            .with("maxWriteRegisterCount", self.max_write_register_count)
            .with("host", self.host.clone())
            .with("port", self.port)
            .with("retries", self.retries)
            .with("timeout", self.timeout)
            .with("updatePeriods", self.update_periods)
    }

    store_ops!(eqp_modbus_ip, xid_equip);
}

// =====================
// DP_MODBUS_IP
// =====================

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = schema::dp_modbus_ip, primary_key(xid_sensor), treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ModbusDatapointRow {
    pub xid_sensor: String,
    pub xid_equip: Option<String>,
    pub register_range: Option<String>,
    pub modbus_data_type: Option<String>,
    pub additive: Option<f64>,
    pub register_offset: Option<i64>,
    pub bit: Option<i64>,
    pub multiplier: Option<f64>,
    pub slave_id: Option<i64>,
    pub enabled: Option<bool>,
    pub nome: Option<String>,
    pub tipo: Option<String>,
    pub classificacao: Option<String>,
}

impl SyncTable for ModbusDatapointRow {
    const TABLE: &'static str = "DP_MODBUS_IP";
    const COLUMNS: &'static [&'static str] = &[
        "xid_sensor",
        "xid_equip",
        "range",
        "modbusDataType",
        "additive",
        "offset",
        "bit",
        "multiplier",
        "slaveId",
        "enabled",
        "nome",
        "tipo",
        "classificacao",
    ];
    const TEXT_COLUMNS: &'static [&'static str] =
        &["xid_equip", "range", "modbusDataType", "nome", "tipo", "classificacao"];
    const SCADA: Option<PayloadKind> = Some(PayloadKind::ModbusDatapoint);

    fn key(&self) -> &str {
        &self.xid_sensor
    }

    fn from_record(r: &Record) -> Option<Self> {
        Some(ModbusDatapointRow {
            xid_sensor: r.key_text("xid_sensor")?,
            xid_equip: r.text("xid_equip"),
            register_range: r.text("range"),
            modbus_data_type: r.text("modbusDataType"),
            additive: r.float("additive"),
            register_offset: r.int("offset"),
            bit: r.int("bit"),
            multiplier: r.float("multiplier"),
            slave_id: r.int("slaveId"),
            enabled: r.flag("enabled"),
            nome: r.text("nome"),
            tipo: r.text("tipo"),
            classificacao: r.text("classificacao"),
        })
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("xid_sensor", self.xid_sensor.clone())
            .with("xid_equip", self.xid_equip.clone())
            .with("range", self.register_range.clone())
            .with("modbusDataType", self.modbus_data_type.clone())
            .with("additive", self.additive)
            .with("offset", self.register_offset)
            .with("bit", self.bit)
            .with("multiplier", self.multiplier)
            .with("slaveId", self.slave_id)
            .with("enabled", self.enabled)
            .with("nome", self.nome.clone())
            .with("tipo", self.tipo.clone())
            .with("classificacao", self.classificacao.clone())
    }

    store_ops!(dp_modbus_ip, xid_sensor);
}

// =====================
// EQP_DNP3
// =====================

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = schema::eqp_dnp3, primary_key(xid_equip), treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Dnp3EquipmentRow {
    pub xid_equip: String,
    pub xid_gateway: Option<String>,
    pub fabricante: Option<String>,
    pub modelo: Option<String>,
    pub equipment_type: Option<String>,
    pub sap_id: Option<String>,
    pub enabled: Option<bool>,
    pub events_period_type: Option<String>,
    pub host: Option<String>,
    pub port: Option<i64>,
    pub rbe_poll_periods: Option<i64>,
    pub retries: Option<i64>,
    pub slave_address: Option<i64>,
    pub source_address: Option<i64>,
    pub static_poll_periods: Option<i64>,
    pub timeout: Option<i64>,
}

impl SyncTable for Dnp3EquipmentRow {
    const TABLE: &'static str = "EQP_DNP3";
    const COLUMNS: &'static [&'static str] = &[
        "xid_equip",
        "xid_gateway",
        "fabricante",
        "modelo",
        "type",
        "sap_id",
        "enabled",
        "eventsPeriodType",
        "host",
        "port",
        "rbePollPeriods",
        "retries",
        "slaveAddress",
        "sourceAddress",
        "staticPollPeriods",
        "timeout",
    ];
    const TEXT_COLUMNS: &'static [&'static str] =
        &["xid_gateway", "fabricante", "modelo", "type", "sap_id", "eventsPeriodType", "host"];
    const SCADA: Option<PayloadKind> = Some(PayloadKind::Dnp3Datasource);

    fn key(&self) -> &str {
        &self.xid_equip
    }

    fn from_record(r: &Record) -> Option<Self> {
        Some(Dnp3EquipmentRow {
            xid_equip: r.key_text("xid_equip")?,
            xid_gateway: r.text("xid_gateway"),
            fabricante: r.text("fabricante"),
            modelo: r.text("modelo"),
            equipment_type: r.text("type"),
            sap_id: r.text("sap_id"),
            enabled: r.flag("enabled"),
            events_period_type: r.text("eventsPeriodType"),
            host: r.text("host"),
            port: r.int("port"),
            rbe_poll_periods: r.int("rbePollPeriods"),
            retries: r.int("retries"),
            slave_address: r.int("slaveAddress"),
            source_address: r.int("sourceAddress"),
            static_poll_periods: r.int("staticPollPeriods"),
            timeout: r.int("timeout"),
        })
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("xid_equip", self.xid_equip.clone())
            .with("xid_gateway", self.xid_gateway.clone())
            .with("fabricante", self.fabricante.clone())
            .with("modelo", self.modelo.clone())
            .with("type", self.equipment_type.clone())
            .with("sap_id", self.sap_id.clone())
            .with("enabled", self.enabled)
            .with("eventsPeriodType", self.events_period_type.clone())
            .with("host", self.host.clone())
            .with("port", self.port)
            .with("rbePollPeriods", self.rbe_poll_periods)
            .with("retries", self.retries)
            .with("slaveAddress", self.slave_address)
            .with("sourceAddress", self.source_address)
            .with("staticPollPeriods", self.static_poll_periods)
            .with("timeout", self.timeout)
    }

    store_ops!(eqp_dnp3, xid_equip);
}

// =====================
// DP_DNP3
// =====================

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = schema::dp_dnp3, primary_key(xid_sensor), treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Dnp3DatapointRow {
    pub xid_sensor: String,
    pub xid_equip: Option<String>,
    pub point_index: Option<i64>,
    pub timeon: Option<i64>,
    pub timeoff: Option<i64>,
    pub dnp3_data_type: Option<i64>,
    pub control_command: Option<i64>,
    pub enabled: Option<bool>,
    pub nome: Option<String>,
    pub tipo: Option<String>,
    pub classificacao: Option<String>,
}

impl SyncTable for Dnp3DatapointRow {
    const TABLE: &'static str = "DP_DNP3";
    const COLUMNS: &'static [&'static str] = &[
        "xid_sensor",
        "xid_equip",
        "index",
        "timeon",
        "timeoff",
        "dnp3DataType",
        "controlCommand",
        "enabled",
        "nome",
        "tipo",
        "classificacao",
    ];
    const TEXT_COLUMNS: &'static [&'static str] = &["xid_equip", "nome", "tipo", "classificacao"];
    const SCADA: Option<PayloadKind> = Some(PayloadKind::Dnp3Datapoint);

    fn key(&self) -> &str {
        &self.xid_sensor
    }

    fn from_record(r: &Record) -> Option<Self> {
        Some(Dnp3DatapointRow {
            xid_sensor: r.key_text("xid_sensor")?,
            xid_equip: r.text("xid_equip"),
            point_index: r.int("index"),
            timeon: r.int("timeon"),
            timeoff: r.int("timeoff"),
            dnp3_data_type: r.int("dnp3DataType"),
            control_command: r.int("controlCommand"),
            enabled: r.flag("enabled"),
            nome: r.text("nome"),
            tipo: r.text("tipo"),
            classificacao: r.text("classificacao"),
        })
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("xid_sensor", self.xid_sensor.clone())
            .with("xid_equip", self.xid_equip.clone())
            .with("index", self.point_index)
            .with("timeon", self.timeon)
            .with("timeoff", self.timeoff)
            .with("dnp3DataType", self.dnp3_data_type)
            .with("controlCommand", self.control_command)
            .with("enabled", self.enabled)
            .with("nome", self.nome.clone())
            .with("tipo", self.tipo.clone())
            .with("classificacao", self.classificacao.clone())
    }

    store_ops!(dp_dnp3, xid_sensor);
}

// =====================
// EQP_TAGS / DP_TAGS
// =====================

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = schema::eqp_tags, primary_key(id), treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EquipmentTagRow {
    pub id: String,
    pub xid_equip: Option<String>,
    pub nome: Option<String>,
    pub valor: Option<String>,
}

impl SyncTable for EquipmentTagRow {
    const TABLE: &'static str = "EQP_TAGS";
    const COLUMNS: &'static [&'static str] = &["id", "xid_equip", "nome", "valor"];
    const TEXT_COLUMNS: &'static [&'static str] = &["xid_equip", "nome", "valor"];
    const SCADA: Option<PayloadKind> = None;

    fn key(&self) -> &str {
        &self.id
    }

    fn from_record(r: &Record) -> Option<Self> {
        Some(EquipmentTagRow {
            id: r.key_text("id")?,
            xid_equip: r.text("xid_equip"),
            nome: r.text("nome"),
            valor: r.text("valor"),
        })
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id.clone())
            .with("xid_equip", self.xid_equip.clone())
            .with("nome", self.nome.clone())
            .with("valor", self.valor.clone())
    }

    store_ops!(eqp_tags, id);
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = schema::dp_tags, primary_key(id), treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DatapointTagRow {
    pub id: String,
    pub xid_sensor: Option<String>,
    pub nome: Option<String>,
    pub valor: Option<String>,
}

impl SyncTable for DatapointTagRow {
    const TABLE: &'static str = "DP_TAGS";
    const COLUMNS: &'static [&'static str] = &["id", "xid_sensor", "nome", "valor"];
    const TEXT_COLUMNS: &'static [&'static str] = &["xid_sensor", "nome", "valor"];
    const SCADA: Option<PayloadKind> = None;

    fn key(&self) -> &str {
        &self.id
    }

    fn from_record(r: &Record) -> Option<Self> {
        Some(DatapointTagRow {
            id: r.key_text("id")?,
            xid_sensor: r.text("xid_sensor"),
            nome: r.text("nome"),
            valor: r.text("valor"),
        })
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id.clone())
            .with("xid_sensor", self.xid_sensor.clone())
            .with("nome", self.nome.clone())
            .with("valor", self.valor.clone())
    }

    store_ops!(dp_tags, id);
}

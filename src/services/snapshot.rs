//! Walks the inventory hierarchy (gateway → hardware → sensor → register) and flattens it into one
//! record per leaf.
//!
//! Gateway and hardware failures abort the walk; a partial snapshot at those levels would make the
//! reconciliation delete everything underneath. Sensor and register failures are skipped and
//! reported.

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::client::{ClientError, InventoryClient, SensorFilter};
use crate::models::inventory::{
    Gateway, GatewayId, Hardware, HardwareId, ListItem, Protocol, RegisterDnp, RegisterId, RegisterModbus,
    SensorDnp, SensorId, SensorModbus,
};
use crate::models::record::{Record, combine};
use crate::utils::{FetchPool, write_json_file};

pub const FLAT_SNAPSHOT_FILE: &str = "data.json";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    SensorModbus,
    SensorDnp3,
    RegisterModbus,
    RegisterDnp3,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::SensorModbus => "modbus sensor",
            EntityKind::SensorDnp3 => "dnp3 sensor",
            EntityKind::RegisterModbus => "modbus register",
            EntityKind::RegisterDnp3 => "dnp3 register",
        };
        f.write_str(name)
    }
}

/// Failure of one leaf entity; contained by the walk.
#[derive(Debug, Error)]
#[error("{kind} {id}: {source}")]
pub struct FetchError {
    pub kind: EntityKind,
    pub id: String,
    #[source]
    pub source: ClientError,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("listing gateways failed: {0}")]
    Gateways(#[source] ClientError),
    #[error("no gateway named {name:?}; available: {available}")]
    GatewayNotFound { name: String, available: String },
    #[error("gateway {id}: {source}")]
    Gateway {
        id: GatewayId,
        #[source]
        source: ClientError,
    },
    #[error("hardware {id}: {source}")]
    Hardware {
        id: HardwareId,
        #[source]
        source: ClientError,
    },
    #[error("listing {protocol} sensors of hardware {id}: {source}")]
    Sensors {
        protocol: Protocol,
        id: HardwareId,
        #[source]
        source: ClientError,
    },
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: invalid snapshot at {at}: {message}", path.display())]
    Parse { path: PathBuf, at: String, message: String },
}

/// Which gateways a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewaySelector {
    All,
    Named(String),
}

impl GatewaySelector {
    /// Empty names and `*` select every gateway.
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            None | Some("") | Some("*") => GatewaySelector::All,
            Some(n) => GatewaySelector::Named(n.to_string()),
        }
    }
}

impl fmt::Display for GatewaySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewaySelector::All => f.write_str("all gateways"),
            GatewaySelector::Named(n) => write!(f, "gateway {:?}", n),
        }
    }
}

/// Leaf records in the assembly vocabulary, ready for translation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlatSnapshot {
    #[serde(default)]
    pub gateways: Vec<Record>,
    #[serde(default)]
    pub modbus: Vec<Record>,
    #[serde(default)]
    pub dnp3: Vec<Record>,
}

impl FlatSnapshot {
    /// Read a dumped `data.json` (or a directory holding one).
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let path = if path.is_dir() {
            path.join(FLAT_SNAPSHOT_FILE)
        } else {
            path.to_path_buf()
        };
        let file = File::open(&path).map_err(|source| SnapshotError::Io {
            path: path.clone(),
            source,
        })?;
        let mut de = serde_json::Deserializer::from_reader(BufReader::new(file));
        let flat: FlatSnapshot = serde_path_to_error::deserialize(&mut de).map_err(|e| SnapshotError::Parse {
            path: path.clone(),
            at: e.path().to_string(),
            message: e.inner().to_string(),
        })?;
        info!(
            "Loaded snapshot {}: {} gateways, {} modbus records, {} dnp3 records",
            path.display(),
            flat.gateways.len(),
            flat.modbus.len(),
            flat.dnp3.len()
        );
        Ok(flat)
    }
}

/// Typed upstream entities as fetched, kept for audit dumps.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RawSnapshot {
    pub gateways: Vec<Gateway>,
    pub hardware: Vec<Hardware>,
    pub sensors_modbus: Vec<SensorModbus>,
    pub registers_modbus: Vec<RegisterModbus>,
    pub sensors_dnp3: Vec<SensorDnp>,
    pub registers_dnp3: Vec<RegisterDnp>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntity {
    pub kind: EntityKind,
    pub id: String,
    pub reason: String,
}

impl From<FetchError> for SkippedEntity {
    fn from(e: FetchError) -> Self {
        SkippedEntity {
            kind: e.kind,
            id: e.id,
            reason: e.source.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchReport {
    pub gateways: usize,
    pub hardware: usize,
    pub sensors_modbus: usize,
    pub registers_modbus: usize,
    pub sensors_dnp3: usize,
    pub registers_dnp3: usize,
    pub skipped: Vec<SkippedEntity>,
}

impl FetchReport {
    fn skip(&mut self, e: FetchError) {
        error!("Skipping {}", e);
        self.skipped.push(e.into());
    }
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub flat: FlatSnapshot,
    pub raw: RawSnapshot,
    pub report: FetchReport,
}

impl Snapshot {
    /// Write the raw entity lists and the flat `data.json` into `dir`.
    pub fn dump(&self, dir: &Path) -> Result<(), SnapshotError> {
        fs::create_dir_all(dir).map_err(|source| SnapshotError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        write_dump(dir, "cma_gateways.json", &self.raw.gateways)?;
        write_dump(dir, "cma_hardwares.json", &self.raw.hardware)?;
        write_dump(dir, "cma_sensors_modbus.json", &self.raw.sensors_modbus)?;
        write_dump(dir, "cma_registers_modbus.json", &self.raw.registers_modbus)?;
        write_dump(dir, "cma_sensors_dnp3.json", &self.raw.sensors_dnp3)?;
        write_dump(dir, "cma_registers_dnp3.json", &self.raw.registers_dnp3)?;
        write_dump(dir, FLAT_SNAPSHOT_FILE, &self.flat)?;
        info!("Dumped snapshot to {}", dir.display());
        Ok(())
    }
}

fn write_dump<T: Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> Result<(), SnapshotError> {
    let path = dir.join(name);
    write_json_file(&path, value).map_err(|source| SnapshotError::Io { path, source })
}

/// Fetch every id on the shared pool. Results come back in input order.
pub fn fan_out<T, F>(pool: &FetchPool, ids: &[String], fetch: F) -> Vec<(String, Result<T, ClientError>)>
where
    T: Send,
    F: Fn(&str) -> Result<T, ClientError> + Sync + Send,
{
    pool.map(ids, fetch)
}

/// Pick the gateways a run covers from the inventory list.
pub fn select_gateways(gateways: Vec<Gateway>, selector: &GatewaySelector) -> Result<Vec<Gateway>, SnapshotError> {
    match selector {
        GatewaySelector::All => Ok(gateways),
        GatewaySelector::Named(name) => {
            let (selected, others): (Vec<Gateway>, Vec<Gateway>) =
                gateways.into_iter().partition(|g| g.display_name() == name.as_str());
            if selected.is_empty() {
                let available = others.iter().map(|g| g.display_name()).collect::<Vec<_>>().join(", ");
                return Err(SnapshotError::GatewayNotFound {
                    name: name.clone(),
                    available,
                });
            }
            Ok(selected)
        }
    }
}

/// Leaf records of one sensor: `parent ∪ sensor ∪ register` per register, lower levels winning.
pub fn flatten_sensor(parent: &Record, sensor: &Record, registers: Vec<Record>) -> Vec<Record> {
    let mut upper = parent.clone();
    upper.merge_from(sensor);
    combine(&upper, registers)
}

fn item_ids(items: Vec<ListItem>) -> Vec<String> {
    items.into_iter().map(|i| i.id).collect()
}

struct SensorFetch<S, R> {
    sensor: S,
    registers: Vec<R>,
    skipped: Vec<FetchError>,
}

pub struct SnapshotBuilder<'a> {
    client: &'a InventoryClient,
    pool: &'a FetchPool,
    page_size: NonZeroU32,
    debug: bool,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(client: &'a InventoryClient, pool: &'a FetchPool, page_size: NonZeroU32, debug: bool) -> Self {
        SnapshotBuilder {
            client,
            pool,
            page_size,
            debug,
        }
    }

    pub fn build(&self, selector: &GatewaySelector) -> Result<Snapshot, SnapshotError> {
        if self.debug {
            warn!("DEBUG is set: visiting only the first hardware unit and sensor; reconciling this snapshot removes rows");
        }
        let listed = self.client.list_gateways().map_err(SnapshotError::Gateways)?;
        info!("Inventory lists {} gateways", listed.len());
        let gateways = select_gateways(listed, selector)?;
        info!("Collecting {} ({} matching)", selector, gateways.len());

        let mut snapshot = Snapshot::default();
        for gw in gateways {
            self.collect_gateway(&gw.id, &mut snapshot)?;
        }

        let r = &snapshot.report;
        info!(
            "Collected {} gateways, {} hardware units, {} modbus sensors / {} registers, {} dnp3 sensors / {} registers, {} skipped",
            r.gateways,
            r.hardware,
            r.sensors_modbus,
            r.registers_modbus,
            r.sensors_dnp3,
            r.registers_dnp3,
            r.skipped.len()
        );
        Ok(snapshot)
    }

    fn collect_gateway(&self, id: &GatewayId, snapshot: &mut Snapshot) -> Result<(), SnapshotError> {
        let gateway = self.client.get_gateway(id).map_err(|source| SnapshotError::Gateway {
            id: id.clone(),
            source,
        })?;
        let gw_record = gateway.assembly_record();
        snapshot.flat.gateways.push(gw_record.clone());
        snapshot.raw.gateways.push(gateway);
        snapshot.report.gateways += 1;

        let mut hardware = self.client.list_hardware(id).map_err(|source| SnapshotError::Gateway {
            id: id.clone(),
            source,
        })?;
        info!("Gateway {}: {} hardware units", id, hardware.len());
        if self.debug {
            hardware.truncate(1);
        }

        for hw in hardware {
            let detail = self.client.get_hardware(&hw.id).map_err(|source| SnapshotError::Hardware {
                id: hw.id.clone(),
                source,
            })?;
            let mut parent = gw_record.clone();
            parent.merge_from(&detail.assembly_record());
            snapshot.raw.hardware.push(detail);
            snapshot.report.hardware += 1;

            self.collect_modbus(&hw.id, &parent, snapshot)?;
            self.collect_dnp3(&hw.id, &parent, snapshot)?;
        }
        Ok(())
    }

    fn sensor_ids(&self, protocol: Protocol, hardware: &HardwareId, filter: SensorFilter) -> Result<Vec<String>, SnapshotError> {
        let mut ids = self
            .client
            .list_sensors(protocol, &filter, self.page_size)
            .map(item_ids)
            .map_err(|source| SnapshotError::Sensors {
                protocol,
                id: hardware.clone(),
                source,
            })?;
        info!("Hardware {}: {} {} sensors", hardware, ids.len(), protocol);
        if self.debug {
            ids.truncate(1);
        }
        Ok(ids)
    }

    fn collect_modbus(&self, hardware: &HardwareId, parent: &Record, snapshot: &mut Snapshot) -> Result<(), SnapshotError> {
        let filter = SensorFilter::for_hardware(hardware);
        for id in self.sensor_ids(Protocol::Modbus, hardware, filter)? {
            match self.modbus_sensor(&id) {
                Ok(fetched) => {
                    let registers = fetched.registers.iter().map(RegisterModbus::assembly_record).collect();
                    let records = flatten_sensor(parent, &fetched.sensor.assembly_record(), registers);
                    info!("Modbus sensor {}: {} registers", id, fetched.registers.len());
                    snapshot.flat.modbus.extend(records);
                    snapshot.report.sensors_modbus += 1;
                    snapshot.report.registers_modbus += fetched.registers.len();
                    snapshot.raw.sensors_modbus.push(fetched.sensor);
                    snapshot.raw.registers_modbus.extend(fetched.registers);
                    fetched.skipped.into_iter().for_each(|e| snapshot.report.skip(e));
                }
                Err(e) => snapshot.report.skip(e),
            }
        }
        Ok(())
    }

    fn collect_dnp3(&self, hardware: &HardwareId, parent: &Record, snapshot: &mut Snapshot) -> Result<(), SnapshotError> {
        let filter = SensorFilter {
            active: Some(true),
            ..SensorFilter::for_hardware(hardware)
        };
        for id in self.sensor_ids(Protocol::Dnp3, hardware, filter)? {
            match self.dnp3_sensor(&id) {
                Ok(fetched) => {
                    let registers = fetched.registers.iter().map(RegisterDnp::assembly_record).collect();
                    let records = flatten_sensor(parent, &fetched.sensor.assembly_record(), registers);
                    info!("DNP3 sensor {}: {} registers", id, fetched.registers.len());
                    snapshot.flat.dnp3.extend(records);
                    snapshot.report.sensors_dnp3 += 1;
                    snapshot.report.registers_dnp3 += fetched.registers.len();
                    snapshot.raw.sensors_dnp3.push(fetched.sensor);
                    snapshot.raw.registers_dnp3.extend(fetched.registers);
                    fetched.skipped.into_iter().for_each(|e| snapshot.report.skip(e));
                }
                Err(e) => snapshot.report.skip(e),
            }
        }
        Ok(())
    }

    fn modbus_sensor(&self, id: &str) -> Result<SensorFetch<SensorModbus, RegisterModbus>, FetchError> {
        let sensor_id = SensorId(id.to_string());
        let leaf_error = |source| FetchError {
            kind: EntityKind::SensorModbus,
            id: id.to_string(),
            source,
        };
        let sensor = self.client.get_sensor_modbus(&sensor_id).map_err(leaf_error)?;
        let register_ids = self
            .client
            .list_registers(Protocol::Modbus, &sensor_id, self.page_size)
            .map(item_ids)
            .map_err(leaf_error)?;

        let mut registers = Vec::with_capacity(register_ids.len());
        let mut skipped = Vec::new();
        let fetched = fan_out(self.pool, &register_ids, |rid| {
            self.client.get_register_modbus(&RegisterId(rid.to_string()))
        });
        for (rid, result) in fetched {
            match result {
                Ok(r) => registers.push(r),
                Err(source) => skipped.push(FetchError {
                    kind: EntityKind::RegisterModbus,
                    id: rid,
                    source,
                }),
            }
        }
        Ok(SensorFetch {
            sensor,
            registers,
            skipped,
        })
    }

    fn dnp3_sensor(&self, id: &str) -> Result<SensorFetch<SensorDnp, RegisterDnp>, FetchError> {
        let sensor_id = SensorId(id.to_string());
        let leaf_error = |source| FetchError {
            kind: EntityKind::SensorDnp3,
            id: id.to_string(),
            source,
        };
        let sensor = self.client.get_sensor_dnp(&sensor_id).map_err(leaf_error)?;
        let register_ids = self
            .client
            .list_registers(Protocol::Dnp3, &sensor_id, self.page_size)
            .map(item_ids)
            .map_err(leaf_error)?;

        let mut registers = Vec::with_capacity(register_ids.len());
        let mut skipped = Vec::new();
        let fetched = fan_out(self.pool, &register_ids, |rid| {
            self.client.get_register_dnp(&RegisterId(rid.to_string()))
        });
        for (rid, result) in fetched {
            match result {
                Ok(r) => registers.push(r),
                Err(source) => skipped.push(FetchError {
                    kind: EntityKind::RegisterDnp3,
                    id: rid,
                    source,
                }),
            }
        }
        Ok(SensorFetch {
            sensor,
            registers,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn gateway(id: &str, name: &str) -> Gateway {
        serde_json::from_value(json!({"id": id, "name": name, "active": true})).unwrap()
    }

    fn record(value: serde_json::Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn selector_treats_blank_and_star_as_all() {
        assert_eq!(GatewaySelector::from_name(None), GatewaySelector::All);
        assert_eq!(GatewaySelector::from_name(Some(" ")), GatewaySelector::All);
        assert_eq!(GatewaySelector::from_name(Some("*")), GatewaySelector::All);
        assert_eq!(
            GatewaySelector::from_name(Some("GW-01")),
            GatewaySelector::Named("GW-01".into())
        );
    }

    #[test]
    fn named_gateway_must_exist() {
        let listed = vec![gateway("1", "GW-01"), gateway("2", "GW-02")];
        let picked = select_gateways(listed.clone(), &GatewaySelector::Named("GW-02".into())).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, GatewayId("2".into()));

        match select_gateways(listed, &GatewaySelector::Named("GW-09".into())) {
            Err(SnapshotError::GatewayNotFound { name, available }) => {
                assert_eq!(name, "GW-09");
                assert_eq!(available, "GW-01, GW-02");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn flatten_sensor_lets_lower_levels_win() {
        let parent = record(json!({"name_gtw": "GW", "active": "gateway"}));
        let sensor = record(json!({"id_sen": "s1", "active": "sensor"}));
        let rows = flatten_sensor(
            &parent,
            &sensor,
            vec![
                record(json!({"id_reg_mod": "r1", "active": "register"})),
                record(json!({"id_reg_mod": "r2"})),
            ],
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text("active").as_deref(), Some("register"));
        assert_eq!(rows[1].text("active").as_deref(), Some("sensor"));
        assert_eq!(rows[1].text("name_gtw").as_deref(), Some("GW"));

        assert!(flatten_sensor(&parent, &sensor, Vec::new()).is_empty());
    }

    #[test]
    fn fan_out_keeps_order_and_bounds_concurrency() {
        let pool = FetchPool::new(NonZeroUsize::new(4).unwrap()).unwrap();
        let ids: Vec<String> = (0..25).map(|i| i.to_string()).collect();
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let results = fan_out(&pool, &ids, |id| {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            in_flight.fetch_sub(1, Ordering::SeqCst);
            if id == "7" {
                Err(ClientError::Http {
                    status: 404,
                    url: format!("/registers-modbus/{id}"),
                    message: "not found".into(),
                })
            } else {
                Ok(id.parse::<u32>().unwrap() * 2)
            }
        });

        assert_eq!(results.len(), 25);
        assert!(peak.load(Ordering::SeqCst) <= 4);
        for (i, (id, result)) in results.iter().enumerate() {
            assert_eq!(id, &i.to_string());
            if i == 7 {
                assert!(result.is_err());
            } else {
                assert_eq!(*result.as_ref().unwrap(), i as u32 * 2);
            }
        }
    }

    #[test]
    fn fan_out_of_nothing_fetches_nothing() {
        let pool = FetchPool::new(NonZeroUsize::MIN).unwrap();
        let results: Vec<(String, Result<(), ClientError>)> = fan_out(&pool, &[], |_| Ok(()));
        assert!(results.is_empty());
    }

    #[test]
    fn dump_then_load_flat_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot {
            flat: FlatSnapshot {
                gateways: vec![record(json!({"id_gtw": "1", "name_gtw": "GW-01"}))],
                modbus: vec![record(json!({"id_sen": "s1", "id_reg_mod": "r1", "multiplier_reg_mod": 0.5}))],
                dnp3: Vec::new(),
            },
            raw: RawSnapshot {
                gateways: vec![gateway("1", "GW-01")],
                ..Default::default()
            },
            report: FetchReport::default(),
        };
        snapshot.dump(dir.path()).unwrap();

        for name in ["cma_gateways.json", "cma_hardwares.json", "cma_registers_dnp3.json", "data.json"] {
            assert!(dir.path().join(name).is_file(), "{name}");
        }
        assert_eq!(FlatSnapshot::load(dir.path()).unwrap(), snapshot.flat);
        assert_eq!(FlatSnapshot::load(&dir.path().join("data.json")).unwrap(), snapshot.flat);
    }

    #[test]
    fn malformed_snapshot_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, r#"{"gateways": [{"id_gtw": "1"}], "modbus": 3}"#).unwrap();
        match FlatSnapshot::load(&path) {
            Err(SnapshotError::Parse { at, .. }) => assert_eq!(at, "modbus"),
            other => panic!("unexpected {other:?}"),
        }
    }
}

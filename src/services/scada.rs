//! SCADA-LTS import forwarding.
//!
//! Rows leave the reconciliation engine in the middleware vocabulary, are renamed into the import
//! vocabulary, rendered into one of four DWR `EmportDwr.importData` bodies and posted one at a time
//! over a session-cookie login. Delivery is best-effort: failures are counted and reported, never
//! retried.

use log::{debug, info, warn};
use serde_json::{Value, json};
use std::fmt;
use std::thread;
use std::time::Duration;
use thiserror::Error;

use crate::models::record::Record;
use crate::translate::{Mapping, Translator, Vocabulary};

const LOGIN_PATH: &str = "/Scada-LTS/login.htm";
const IMPORT_PATH: &str = "/Scada-LTS/dwr/call/plaincall/EmportDwr.importData.dwr";
const IMPORT_PAGE: &str = "/Scada-LTS/import_project.htm";
const SCRIPT_SESSION_ID: &str = "D15BC242A0E69D4251D5585A07806324697";

/// The four import payload shapes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    ModbusDatasource,
    ModbusDatapoint,
    Dnp3Datasource,
    Dnp3Datapoint,
}

impl PayloadKind {
    /// Templated fields; a row missing any of them is rejected.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            PayloadKind::ModbusDatasource => &[
                "xid_equip",
                "updatePeriodType",
                "enabled",
                "host",
                "maxReadBitCount",
                "maxReadRegisterCount",
                "maxWriteRegisterCount",
                "port",
                "retries",
                "timeout",
                "updatePeriods",
            ],
            PayloadKind::Dnp3Datasource => &[
                "xid_equip",
                "eventsPeriodType",
                "enabled",
                "host",
                "port",
                "rbePollPeriods",
                "retries",
                "slaveAddress",
                "sourceAddress",
                "staticPollPeriods",
            ],
            PayloadKind::ModbusDatapoint => &[
                "xid_sensor",
                "range",
                "modbusDataType",
                "additive",
                "bit",
                "multiplier",
                "offset",
                "slaveId",
                "xid_equip",
                "enabled",
                "nome",
            ],
            PayloadKind::Dnp3Datapoint => &[
                "xid_sensor",
                "controlCommand",
                "dnp3DataType",
                "index",
                "timeoff",
                "timeon",
                "xid_equip",
                "enabled",
            ],
        }
    }

    /// Field holding the xid the payload is about.
    pub fn key_field(self) -> &'static str {
        match self {
            PayloadKind::ModbusDatasource | PayloadKind::Dnp3Datasource => "xid_equip",
            PayloadKind::ModbusDatapoint | PayloadKind::Dnp3Datapoint => "xid_sensor",
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayloadKind::ModbusDatasource => "modbus datasource",
            PayloadKind::ModbusDatapoint => "modbus datapoint",
            PayloadKind::Dnp3Datasource => "dnp3 datasource",
            PayloadKind::Dnp3Datapoint => "dnp3 datapoint",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("{kind}: required field `{field}` is missing")]
    MissingField { kind: PayloadKind, field: &'static str },
    #[error("{kind}: field `{field}` is not numeric ({value})")]
    NotNumeric {
        kind: PayloadKind,
        field: &'static str,
        value: String,
    },
}

#[derive(Debug, Error)]
pub enum ScadaError {
    #[error("SCADA login failed: {0}")]
    Login(String),
    #[error("SCADA transport error: {0}")]
    Transport(String),
    #[error("SCADA http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("SCADA rejected the import: {0}")]
    Import(String),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

struct Fields<'a> {
    kind: PayloadKind,
    record: &'a Record,
}

impl Fields<'_> {
    fn value(&self, field: &'static str) -> Result<&Value, PayloadError> {
        match self.record.get(field) {
            None | Some(Value::Null) => Err(PayloadError::MissingField { kind: self.kind, field }),
            Some(v) => Ok(v),
        }
    }

    fn text(&self, field: &'static str) -> Result<Value, PayloadError> {
        self.value(field)?;
        Ok(Value::String(self.record.text(field).unwrap_or_default()))
    }

    fn number(&self, field: &'static str) -> Result<Value, PayloadError> {
        let value = self.value(field)?;
        let parsed = match value {
            Value::Number(_) => Some(value.clone()),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .map(Value::from)
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(Value::from))
            }
            _ => None,
        };
        parsed.ok_or_else(|| PayloadError::NotNumeric {
            kind: self.kind,
            field,
            value: value.to_string(),
        })
    }

    fn flag(&self, field: &'static str) -> Result<Value, PayloadError> {
        self.value(field)?;
        Ok(Value::Bool(self.record.flag(field).unwrap_or(false)))
    }
}

/// Render the DWR body for one row in the import vocabulary.
pub fn build_payload(kind: PayloadKind, record: &Record) -> Result<String, PayloadError> {
    for &field in kind.required_fields() {
        if record.is_null(field) {
            return Err(PayloadError::MissingField { kind, field });
        }
    }
    let f = Fields { kind, record };

    let param = match kind {
        PayloadKind::ModbusDatasource => json!({"dataSources": [{
            "xid": f.text("xid_equip")?,
            "type": "MODBUS_IP",
            "alarmLevels": {
                "POINT_WRITE_EXCEPTION": "URGENT",
                "DATA_SOURCE_EXCEPTION": "URGENT",
                "POINT_READ_EXCEPTION": "URGENT",
            },
            "updatePeriodType": f.text("updatePeriodType")?,
            "transportType": "TCP",
            "contiguousBatches": false,
            "createSlaveMonitorPoints": false,
            "createSocketMonitorPoint": false,
            "enabled": f.flag("enabled")?,
            "encapsulated": false,
            "host": f.text("host")?,
            "maxReadBitCount": f.number("maxReadBitCount")?,
            "maxReadRegisterCount": f.number("maxReadRegisterCount")?,
            "maxWriteRegisterCount": f.number("maxWriteRegisterCount")?,
            "name": f.text("xid_equip")?,
            "port": f.number("port")?,
            "quantize": false,
            "retries": f.number("retries")?,
            "timeout": f.number("timeout")?,
            "updatePeriods": f.number("updatePeriods")?,
        }]}),
        PayloadKind::Dnp3Datasource => json!({"dataSources": [{
            "xid": f.text("xid_equip")?,
            "type": "DNP3_IP",
            "alarmLevels": {
                "DATA_SOURCE_EXCEPTION": "URGENT",
                "POINT_READ_EXCEPTION": "URGENT",
            },
            "eventsPeriodType": f.text("eventsPeriodType")?,
            "enabled": f.flag("enabled")?,
            "host": f.text("host")?,
            "name": f.text("xid_equip")?,
            "port": f.number("port")?,
            "quantize": false,
            "rbePollPeriods": f.number("rbePollPeriods")?,
            "retries": f.number("retries")?,
            "slaveAddress": f.number("slaveAddress")?,
            "sourceAddress": f.number("sourceAddress")?,
            "staticPollPeriods": f.number("staticPollPeriods")?,
            "synchPeriods": 30,
            "timeout": 800,
        }]}),
        PayloadKind::ModbusDatapoint => {
            let mut point = datapoint_common(&f)?;
            point["pointLocator"] = json!({
                "range": f.text("range")?,
                "modbusDataType": f.text("modbusDataType")?,
                "additive": f.number("additive")?,
                "bit": f.number("bit")?,
                "charset": "ASCII",
                "multiplier": f.number("multiplier")?,
                "offset": f.number("offset")?,
                "registerCount": 0,
                "settableOverride": false,
                "slaveId": f.number("slaveId")?,
                "slaveMonitor": false,
                "socketMonitor": false,
            });
            point["name"] = f.text("nome")?;
            point["tolerance"] = json!(0);
            json!({"dataPoints": [point]})
        }
        PayloadKind::Dnp3Datapoint => {
            let mut point = datapoint_common(&f)?;
            point["pointLocator"] = json!({
                "additive": 0.0,
                "controlCommand": f.number("controlCommand")?,
                "dnp3DataType": f.number("dnp3DataType")?,
                "index": f.number("index")?,
                "multiplier": 1.0,
                "operateMode": 2,
                "settable": false,
                "timeOff": f.number("timeoff")?,
                "timeOn": f.number("timeon")?,
            });
            point["name"] = f.text("xid_sensor")?;
            point["tolerance"] = json!(0.0);
            json!({"dataPoints": [point]})
        }
    };

    Ok(format!(
        "callCount=1\npage={IMPORT_PAGE}\nhttpSessionId=\nscriptSessionId={SCRIPT_SESSION_ID}\n\
         c0-scriptName=EmportDwr\nc0-methodName=importData\nc0-id=0\nc0-param0=string:{param}\nbatchId=8\n"
    ))
}

fn datapoint_common(f: &Fields<'_>) -> Result<Value, PayloadError> {
    Ok(json!({
        "xid": f.text("xid_sensor")?,
        "loggingType": "ON_CHANGE",
        "intervalLoggingPeriodType": "MINUTES",
        "intervalLoggingType": "INSTANT",
        "purgeType": "YEARS",
        "eventDetectors": [],
        "engineeringUnits": "",
        "purgeStrategy": "PERIOD",
        "chartColour": null,
        "chartRenderer": null,
        "dataSourceXid": f.text("xid_equip")?,
        "defaultCacheSize": 1,
        "description": null,
        "deviceName": f.text("xid_sensor")?,
        "discardExtremeValues": false,
        "discardHighLimit": 1.7976931348623157,
        "discardLowLimit": -1.7976931348623157,
        "enabled": f.flag("enabled")?,
        "eventTextRenderer": {"type": "EVENT_NONE"},
        "intervalLoggingPeriod": 15,
        "purgePeriod": 1,
        "purgeValuesLimit": 100,
        "textRenderer": {"type": "PLAIN", "suffix": ""},
    }))
}

/// Delivers rendered import bodies.
pub trait ImportTransport {
    fn import(&mut self, body: &str) -> Result<(), ScadaError>;
}

/// Session-cookie client for the SCADA-LTS DWR import endpoint.
pub struct ScadaClient {
    agent: ureq::Agent,
    base_url: String,
    session: String,
}

impl ScadaClient {
    /// Log in with the form credentials and keep the session cookie.
    pub fn login(base_url: &str, username: &str, password: &str, timeout: Duration) -> Result<Self, ScadaError> {
        // the login answers with a redirect that carries the session cookie
        let agent = ureq::AgentBuilder::new().timeout(timeout).redirects(0).build();
        let base_url = base_url.trim_end_matches('/').to_string();
        let url = format!("{}{}", base_url, LOGIN_PATH);

        let resp = agent
            .post(&url)
            .send_form(&[("username", username), ("password", password), ("submit", "Login")]);
        let resp = match resp {
            Ok(r) => r,
            Err(ureq::Error::Status(status, r)) => {
                let body = r.into_string().unwrap_or_else(|_| String::from("<no body>"));
                return Err(ScadaError::Login(format!("http {}: {}", status, body)));
            }
            Err(ureq::Error::Transport(t)) => return Err(ScadaError::Login(t.to_string())),
        };

        let session = resp
            .all("set-cookie")
            .into_iter()
            .find_map(session_cookie)
            .ok_or_else(|| ScadaError::Login(format!("no session cookie in the response of {}", url)))?;
        info!("Logged in to SCADA-LTS at {}", base_url);
        Ok(ScadaClient {
            agent,
            base_url,
            session,
        })
    }
}

impl ImportTransport for ScadaClient {
    fn import(&mut self, body: &str) -> Result<(), ScadaError> {
        let url = format!("{}{}", self.base_url, IMPORT_PATH);
        let resp = self
            .agent
            .post(&url)
            .set("Content-Type", "text/plain")
            .set("Cookie", &self.session)
            .send_string(body);
        match resp {
            Ok(r) => {
                let text = r.into_string().map_err(|e| ScadaError::Transport(e.to_string()))?;
                debug!("SCADA import response: {}", text);
                check_dwr_response(&text)
            }
            Err(ureq::Error::Status(status, r)) => {
                let message = r.into_string().unwrap_or_else(|_| String::from("<no body>"));
                Err(ScadaError::Http { status, message })
            }
            Err(ureq::Error::Transport(t)) => Err(ScadaError::Transport(t.to_string())),
        }
    }
}

/// `NAME=value` part of a `Set-Cookie` header.
fn session_cookie(header: &str) -> Option<String> {
    let pair = header.split(';').next()?.trim();
    match pair.split_once('=') {
        Some((name, value)) if !name.is_empty() && !value.is_empty() => Some(pair.to_string()),
        _ => None,
    }
}

fn check_dwr_response(body: &str) -> Result<(), ScadaError> {
    if body.contains("_remoteHandleException") || body.contains("_remoteHandleBatchException") {
        let snippet: String = body.chars().take(300).collect();
        return Err(ScadaError::Import(snippet));
    }
    Ok(())
}

/// Where the reconciliation engine sends rows it inserted, updated or is about to delete.
pub trait DownstreamSink {
    /// `row` is in the middleware vocabulary.
    fn push(&mut self, kind: PayloadKind, row: &Record) -> Result<(), ScadaError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub sent: usize,
    pub rejected: usize,
    pub failed: usize,
}

/// Renames, validates, renders and posts rows sequentially with a fixed pause after each post.
pub struct Forwarder {
    transport: Box<dyn ImportTransport>,
    mapping: Mapping,
    pause: Duration,
    stats: ForwardStats,
}

impl Forwarder {
    pub fn new(transport: Box<dyn ImportTransport>, translator: &Translator, pause: Duration) -> Self {
        Forwarder {
            transport,
            mapping: translator.full_mapping(Vocabulary::Middleware, Vocabulary::ScadaImport),
            pause,
            stats: ForwardStats::default(),
        }
    }

    pub fn stats(&self) -> ForwardStats {
        self.stats
    }
}

impl DownstreamSink for Forwarder {
    fn push(&mut self, kind: PayloadKind, row: &Record) -> Result<(), ScadaError> {
        let record = self.mapping.apply(row);
        let body = match build_payload(kind, &record) {
            Ok(b) => b,
            Err(e) => {
                self.stats.rejected += 1;
                return Err(e.into());
            }
        };
        let result = self.transport.import(&body);
        match &result {
            Ok(()) => {
                self.stats.sent += 1;
                debug!("Pushed {} {}", kind, record.text(kind.key_field()).unwrap_or_default());
            }
            Err(e) => {
                self.stats.failed += 1;
                warn!("Push of {} {} failed: {}", kind, record.text(kind.key_field()).unwrap_or_default(), e);
            }
        }
        if !self.pause.is_zero() {
            thread::sleep(self.pause);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn param_json(body: &str) -> Value {
        let line = body
            .lines()
            .find_map(|l| l.strip_prefix("c0-param0=string:"))
            .unwrap();
        serde_json::from_str(line).unwrap()
    }

    fn modbus_equipment() -> Record {
        record(json!({
            "xid_equip": "s1",
            "updatePeriodType": "SECONDS",
            "enabled": true,
            "host": "10.0.0.9",
            "maxReadBitCount": 2000,
            "maxReadRegisterCount": 125,
            "maxWriteRegisterCount": 120,
            "port": 502,
            "retries": 2,
            "timeout": 500,
            "updatePeriods": 5,
        }))
    }

    #[derive(Clone, Default)]
    struct Recorder {
        bodies: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl ImportTransport for Recorder {
        fn import(&mut self, body: &str) -> Result<(), ScadaError> {
            self.bodies.lock().unwrap().push(body.to_string());
            if self.fail {
                Err(ScadaError::Transport("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn modbus_datasource_body_has_dwr_envelope() {
        let body = build_payload(PayloadKind::ModbusDatasource, &modbus_equipment()).unwrap();
        assert!(body.starts_with("callCount=1\npage=/Scada-LTS/import_project.htm\n"));
        assert!(body.contains("c0-scriptName=EmportDwr\nc0-methodName=importData\nc0-id=0\n"));
        assert!(body.ends_with("batchId=8\n"));

        let param = param_json(&body);
        let ds = &param["dataSources"][0];
        assert_eq!(ds["xid"], "s1");
        assert_eq!(ds["name"], "s1");
        assert_eq!(ds["type"], "MODBUS_IP");
        assert_eq!(ds["transportType"], "TCP");
        assert_eq!(ds["port"], 502);
        assert_eq!(ds["enabled"], true);
    }

    #[test]
    fn missing_required_field_rejects_the_row() {
        let mut rec = modbus_equipment();
        rec.insert("host", Value::Null);
        assert_eq!(
            build_payload(PayloadKind::ModbusDatasource, &rec).unwrap_err(),
            PayloadError::MissingField {
                kind: PayloadKind::ModbusDatasource,
                field: "host"
            }
        );
    }

    #[test]
    fn non_numeric_field_is_rejected() {
        let mut rec = modbus_equipment();
        rec.insert("port", "modbus");
        assert!(matches!(
            build_payload(PayloadKind::ModbusDatasource, &rec),
            Err(PayloadError::NotNumeric { field: "port", .. })
        ));
    }

    #[test]
    fn dnp3_datapoint_uses_fixed_locator_constants() {
        let rec = record(json!({
            "xid_sensor": "r9",
            "controlCommand": 1,
            "dnp3DataType": 3,
            "index": 12,
            "timeoff": 0,
            "timeon": 100,
            "xid_equip": "s9",
            "enabled": false,
        }));
        let param = param_json(&build_payload(PayloadKind::Dnp3Datapoint, &rec).unwrap());
        let dp = &param["dataPoints"][0];
        assert_eq!(dp["name"], "r9");
        assert_eq!(dp["dataSourceXid"], "s9");
        assert_eq!(dp["enabled"], false);
        assert_eq!(dp["pointLocator"]["operateMode"], 2);
        assert_eq!(dp["pointLocator"]["timeOn"], 100);
        assert_eq!(dp["pointLocator"]["index"], 12);
    }

    #[test]
    fn modbus_datapoint_is_named_after_nome() {
        let rec = record(json!({
            "xid_sensor": "r1",
            "range": "HOLDING_REGISTER",
            "modbusDataType": "TWO_BYTE_INT_UNSIGNED",
            "additive": 0.0,
            "bit": 0,
            "multiplier": 0.1,
            "offset": 40001,
            "slaveId": 1,
            "xid_equip": "s1",
            "enabled": true,
            "nome": "Tensao A",
        }));
        let param = param_json(&build_payload(PayloadKind::ModbusDatapoint, &rec).unwrap());
        let dp = &param["dataPoints"][0];
        assert_eq!(dp["name"], "Tensao A");
        assert_eq!(dp["deviceName"], "r1");
        assert_eq!(dp["pointLocator"]["range"], "HOLDING_REGISTER");
        assert_eq!(dp["pointLocator"]["offset"], 40001);
    }

    #[test]
    fn forwarder_counts_sent_rejected_and_failed() {
        let translator = Translator::load().unwrap();
        let ok = Recorder::default();
        let bodies = ok.bodies.clone();
        let mut forwarder = Forwarder::new(Box::new(ok), &translator, Duration::ZERO);

        forwarder.push(PayloadKind::ModbusDatasource, &modbus_equipment()).unwrap();
        let mut incomplete = modbus_equipment();
        incomplete.remove("port");
        assert!(matches!(
            forwarder.push(PayloadKind::ModbusDatasource, &incomplete),
            Err(ScadaError::Payload(_))
        ));
        assert_eq!(bodies.lock().unwrap().len(), 1);
        assert_eq!(
            forwarder.stats(),
            ForwardStats {
                sent: 1,
                rejected: 1,
                failed: 0
            }
        );

        let failing = Recorder {
            fail: true,
            ..Default::default()
        };
        let mut forwarder = Forwarder::new(Box::new(failing), &translator, Duration::ZERO);
        assert!(forwarder.push(PayloadKind::ModbusDatasource, &modbus_equipment()).is_err());
        assert!(forwarder.push(PayloadKind::ModbusDatasource, &modbus_equipment()).is_err());
        assert_eq!(forwarder.stats().failed, 2);
    }

    #[test]
    fn session_cookie_takes_the_name_value_pair() {
        assert_eq!(
            session_cookie("JSESSIONID=abc123; Path=/Scada-LTS; HttpOnly").as_deref(),
            Some("JSESSIONID=abc123")
        );
        assert_eq!(session_cookie("; Path=/"), None);
    }

    #[test]
    fn dwr_exception_is_an_import_error() {
        assert!(check_dwr_response("dwr.engine._remoteHandleCallback('8','0',{});").is_ok());
        assert!(matches!(
            check_dwr_response("dwr.engine._remoteHandleException('8','0',{message:'x'});"),
            Err(ScadaError::Import(_))
        ));
    }
}

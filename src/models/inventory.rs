//! Models for the CMA inventory REST API.
//!
//! Notes
//! - Wire names are camelCase; every optional upstream field is an `Option`.
//! - Each entity renders itself into the assembly vocabulary (`*_record` methods), which is the
//!   field naming the translation table starts from.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::models::record::Record;

// =====================
// Identifier newtypes
// =====================

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(GatewayId);
string_id!(HardwareId);
string_id!(SensorId);
string_id!(RegisterId);

/// Sensor protocol family. Selects the REST resources and the assembly field suffixes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Modbus,
    Dnp3,
}

impl Protocol {
    pub fn sensors_path(self) -> &'static str {
        match self {
            Protocol::Modbus => "/sensors-modbus",
            Protocol::Dnp3 => "/sensors-dnp",
        }
    }

    pub fn registers_path(self) -> &'static str {
        match self {
            Protocol::Modbus => "/registers-modbus",
            Protocol::Dnp3 => "/registers-dnp",
        }
    }

    /// Query parameter that filters registers by their parent sensor.
    pub fn register_parent_param(self) -> &'static str {
        match self {
            Protocol::Modbus => "sensorModbusId",
            Protocol::Dnp3 => "sensorDnpId",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Modbus => f.write_str("modbus"),
            Protocol::Dnp3 => f.write_str("dnp3"),
        }
    }
}

// =====================
// Envelopes and references
// =====================

/// Spring-style page envelope used by the paginated list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
    #[serde(default)]
    pub last: Option<bool>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub number: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstationRef {
    pub id: Option<String>,
    pub name: Option<String>,
    pub active: Option<bool>,
    pub sap_abbreviation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRef {
    pub id: Option<String>,
    pub name: Option<String>,
    pub ip: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManufacturerRef {
    pub id: Option<String>,
    pub name: Option<String>,
    pub active: Option<bool>,
}

/// Register type / sensor type classification reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}

// =====================
// Entities
// =====================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gateway {
    pub id: GatewayId,
    pub name: Option<String>,
    pub ip: Option<String>,
    pub active: Option<bool>,
    pub substation_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub substation: Option<SubstationRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hardware {
    pub id: HardwareId,
    pub name: Option<String>,
    pub sap_id: Option<String>,
    #[serde(rename = "type")]
    pub hardware_type: Option<String>,
    pub model: Option<String>,
    pub active: Option<bool>,
    pub cma_gateway_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub cma_gateway: Option<GatewayRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorModbus {
    pub id: SensorId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub model: Option<String>,
    pub ip: Option<String>,
    pub port: Option<i64>,
    #[serde(rename = "type")]
    pub sensor_type: Option<String>,
    pub attempts: Option<i64>,
    pub time_limit: Option<i64>,
    pub actualization_period: Option<String>,
    pub actualization_time: Option<i64>,
    pub max_register_read: Option<i64>,
    pub max_register_write: Option<i64>,
    pub max_register_bits_read: Option<i64>,
    pub active: Option<bool>,
    pub hardware_id: Option<String>,
    pub manufacturer: Option<ManufacturerRef>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorDnp {
    pub id: SensorId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub model: Option<String>,
    pub ip: Option<String>,
    pub port: Option<i64>,
    #[serde(rename = "type")]
    pub sensor_type: Option<String>,
    pub attempts: Option<i64>,
    pub time_limit: Option<i64>,
    pub actualization_period: Option<String>,
    pub poll_rbe_period: Option<i64>,
    pub poll_static_period: Option<i64>,
    pub address_source: Option<i64>,
    pub address_slave: Option<i64>,
    pub active: Option<bool>,
    pub hardware_id: Option<String>,
    pub manufacturer: Option<ManufacturerRef>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterModbus {
    pub id: RegisterId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub address_slave: Option<i64>,
    pub address_register: Option<i64>,
    pub register_modbus_type: Option<String>,
    pub register_data_format: Option<String>,
    pub bit: Option<i64>,
    pub multiplier: Option<f64>,
    pub additive: Option<f64>,
    pub active: Option<bool>,
    pub sensor_modbus_id: Option<String>,
    pub register_type: Option<TypeRef>,
    pub sensor_type: Option<TypeRef>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDnp {
    pub id: RegisterId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub index: Option<i64>,
    pub time_on: Option<i64>,
    pub time_off: Option<i64>,
    pub register_data_type: Option<i64>,
    pub register_control_command: Option<i64>,
    pub active: Option<bool>,
    pub sensor_dnp_id: Option<String>,
    pub register_type: Option<TypeRef>,
    pub sensor_type: Option<TypeRef>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// List item shape shared by the paginated sensor and register endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListItem {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

// =====================
// Assembly rendering
// =====================

fn timestamp(ts: &Option<DateTime<Utc>>) -> Value {
    ts.map(|t| Value::String(t.to_rfc3339_opts(SecondsFormat::Millis, true)))
        .unwrap_or(Value::Null)
}

/// Tags embedded as JSON text, the way they travel inside a flat record.
fn tags_text(tags: &[Tag]) -> Value {
    match serde_json::to_string(tags) {
        Ok(s) => Value::String(s),
        Err(_) => Value::Null,
    }
}

impl Gateway {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn assembly_record(&self) -> Record {
        let sub = self.substation.as_ref();
        Record::new()
            .with("id_gtw", self.id.0.clone())
            .with("name_gtw", self.name.clone())
            .with("ip_gtw", self.ip.clone())
            .with("active_gtw", self.active)
            .with("substationId_gtw", self.substation_id.clone())
            .with("createdAt_gtw", timestamp(&self.created_at))
            .with("updatedAt_gtw", timestamp(&self.updated_at))
            .with("id_sub", sub.and_then(|s| s.id.clone()))
            .with("name_sub", sub.and_then(|s| s.name.clone()))
            .with("active_sub", sub.and_then(|s| s.active))
            .with("sapAbbreviation_sub", sub.and_then(|s| s.sap_abbreviation.clone()))
    }
}

impl Hardware {
    pub fn assembly_record(&self) -> Record {
        let gw = self.cma_gateway.as_ref();
        Record::new()
            .with("id_hdw", self.id.0.clone())
            .with("name_hdw", self.name.clone())
            .with("sapId_hdw", self.sap_id.clone())
            .with("type_hdw", self.hardware_type.clone())
            .with("model_hdw", self.model.clone())
            .with("active_hdw", self.active)
            .with("cmaGatewayId_hdw", self.cma_gateway_id.clone())
            .with("createdAt_hdw", timestamp(&self.created_at))
            .with("updatedAt_hdw", timestamp(&self.updated_at))
            .with("id_cma", gw.and_then(|g| g.id.clone()))
            .with("name_cma", gw.and_then(|g| g.name.clone()))
            .with("ip_cma", gw.and_then(|g| g.ip.clone()))
            .with("active_cma", gw.and_then(|g| g.active))
    }
}

impl SensorModbus {
    pub fn assembly_record(&self) -> Record {
        let man = self.manufacturer.as_ref();
        Record::new()
            .with("id_sen", self.id.0.clone())
            .with("name_sen", self.name.clone())
            .with("description_sen", self.description.clone())
            .with("model_sen", self.model.clone())
            .with("ip_sen", self.ip.clone())
            .with("port_sen", self.port)
            .with("type_sen", self.sensor_type.clone())
            .with("attempts_sen", self.attempts)
            .with("timeLimit_sen", self.time_limit)
            .with("actualizationPeriod_sen", self.actualization_period.clone())
            .with("actualizationTime_sen", self.actualization_time)
            .with("maxRegisterRead_sen", self.max_register_read)
            .with("maxRegisterWrite_sen", self.max_register_write)
            .with("maxRegisterBitsRead_sen", self.max_register_bits_read)
            .with("active_sen", self.active)
            .with("hardwareId_sen", self.hardware_id.clone())
            .with("id_man", man.and_then(|m| m.id.clone()))
            .with("name_man", man.and_then(|m| m.name.clone()))
            .with("active_man", man.and_then(|m| m.active))
            .with("tags_sen", tags_text(&self.tags))
    }
}

impl SensorDnp {
    pub fn assembly_record(&self) -> Record {
        let man = self.manufacturer.as_ref();
        Record::new()
            .with("id_sen_dnp3", self.id.0.clone())
            .with("name_sen_dnp3", self.name.clone())
            .with("description_sen_dnp3", self.description.clone())
            .with("model_sen_dnp3", self.model.clone())
            .with("ip_sen_dnp3", self.ip.clone())
            .with("port_sen_dnp3", self.port)
            .with("type_sen_dnp3", self.sensor_type.clone())
            .with("attempts_sen_dnp3", self.attempts)
            .with("timeLimit_sen_dnp3", self.time_limit)
            .with("actualizationPeriod_sen_dnp3", self.actualization_period.clone())
            .with("pollRbePeriod_sen_dnp3", self.poll_rbe_period)
            .with("pollStaticPeriod_sen_dnp3", self.poll_static_period)
            .with("addressSource_sen_dnp3", self.address_source)
            .with("addressSlave_sen_dnp3", self.address_slave)
            .with("active_sen_dnp3", self.active)
            .with("hardwareId_sen_dnp3", self.hardware_id.clone())
            .with("id_man_dnp3", man.and_then(|m| m.id.clone()))
            .with("name_man_dnp3", man.and_then(|m| m.name.clone()))
            .with("tags_sen_dnp3", tags_text(&self.tags))
    }
}

impl RegisterModbus {
    pub fn assembly_record(&self) -> Record {
        let reg_type = self.register_type.as_ref();
        let sen_type = self.sensor_type.as_ref();
        Record::new()
            .with("id_reg_mod", self.id.0.clone())
            .with("name_reg_mod", self.name.clone())
            .with("description_reg_mod", self.description.clone())
            .with("addressSlave_reg_mod", self.address_slave)
            .with("addressRegister_reg_mod", self.address_register)
            .with("registerModbusType_reg_mod", self.register_modbus_type.clone())
            .with("registerDataFormat_reg_mod", self.register_data_format.clone())
            .with("bit_reg_mod", self.bit)
            .with("multiplier_reg_mod", self.multiplier)
            .with("additive_reg_mod", self.additive)
            .with("active_reg_mod", self.active)
            .with("sensorModbusId_reg_mod", self.sensor_modbus_id.clone())
            .with("id_reg_reg_mod", reg_type.and_then(|t| t.id.clone()))
            .with("name_reg_reg_mod", reg_type.and_then(|t| t.name.clone()))
            .with("id_sen_reg_mod", sen_type.and_then(|t| t.id.clone()))
            .with("name_sen_reg_mod", sen_type.and_then(|t| t.name.clone()))
            .with("tags_reg_mod", tags_text(&self.tags))
    }
}

impl RegisterDnp {
    pub fn assembly_record(&self) -> Record {
        let reg_type = self.register_type.as_ref();
        let sen_type = self.sensor_type.as_ref();
        Record::new()
            .with("id_reg_dnp3", self.id.0.clone())
            .with("name_reg_dnp3", self.name.clone())
            .with("description_reg_dnp3", self.description.clone())
            .with("index_reg_dnp3", self.index)
            .with("timeOn_reg_dnp3", self.time_on)
            .with("timeOff_reg_dnp3", self.time_off)
            .with("registerDataType_reg_dnp3", self.register_data_type)
            .with("registerControlCommand_reg_dnp3", self.register_control_command)
            .with("active_reg_dnp3", self.active)
            .with("sensorDnpId_reg_dnp3", self.sensor_dnp_id.clone())
            .with("id_reg_reg_dnp3", reg_type.and_then(|t| t.id.clone()))
            .with("name_reg_reg_dnp3", reg_type.and_then(|t| t.name.clone()))
            .with("id_sen_reg_dnp3", sen_type.and_then(|t| t.id.clone()))
            .with("name_sen_reg_dnp3", sen_type.and_then(|t| t.name.clone()))
            .with("tags_reg_dnp3", tags_text(&self.tags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gateway_decodes_and_renders_assembly_names() {
        let gw: Gateway = serde_json::from_value(json!({
            "id": "3f1c",
            "name": "GW-SE-01",
            "ip": "10.0.0.1",
            "active": true,
            "substationId": "sub-1",
            "createdAt": "2025-01-13T13:04:35.030Z",
            "substation": {"id": "sub-1", "name": "Subestacao Norte", "sapAbbreviation": "NRT"}
        }))
        .unwrap();

        let rec = gw.assembly_record();
        assert_eq!(rec.text("id_gtw").as_deref(), Some("3f1c"));
        assert_eq!(rec.text("name_gtw").as_deref(), Some("GW-SE-01"));
        assert_eq!(rec.flag("active_gtw"), Some(true));
        assert_eq!(rec.text("sapAbbreviation_sub").as_deref(), Some("NRT"));
        assert_eq!(rec.text("createdAt_gtw").as_deref(), Some("2025-01-13T13:04:35.030Z"));
        assert!(rec.is_null("updatedAt_gtw"));
    }

    #[test]
    fn register_tags_are_embedded_as_json_text() {
        let reg: RegisterModbus = serde_json::from_value(json!({
            "id": "r1",
            "name": "Tensao A",
            "addressSlave": 1,
            "addressRegister": 40001,
            "multiplier": 0.1,
            "tags": [{"id": "t1", "name": "fase", "value": "A"}]
        }))
        .unwrap();

        let rec = reg.assembly_record();
        let tags: Vec<Tag> = serde_json::from_str(&rec.text("tags_reg_mod").unwrap()).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].id, "t1");
        assert_eq!(rec.int("addressRegister_reg_mod"), Some(40001));
    }

    #[test]
    fn page_envelope_tolerates_missing_metadata() {
        let page: Page<ListItem> = serde_json::from_value(json!({"content": [{"id": "a"}]})).unwrap();
        assert_eq!(page.content.len(), 1);
        assert_eq!(page.last, None);
    }
}

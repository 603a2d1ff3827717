//! Field-name translation between the vocabularies a record passes through.
//!
//! A table is a list of rows, one per logical field, one cell per [`Vocabulary`]. An empty cell
//! means the field does not exist in that vocabulary. Tables are validated once when the
//! [`Translator`] is loaded; a mapping between two vocabularies is then a plain rename list.

mod tables;

use log::debug;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::models::record::Record;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranslateError {
    #[error("unknown vocabulary `{0}` (expected one of: label, api, assembly, middleware, scada_import)")]
    UnknownVocabulary(String),
    #[error("translation table {section}: row {row} has {width} cells, expected {expected}")]
    MalformedRow {
        section: Section,
        row: usize,
        width: usize,
        expected: usize,
    },
}

/// Naming schemes a field can have. The order matches the table columns.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Vocabulary {
    /// Human readable label.
    Label,
    /// Field name as served by the inventory API.
    Api,
    /// Flat record field names produced by the snapshot builder.
    Assembly,
    /// Column names of the middleware store.
    Middleware,
    /// Field names of the SCADA-LTS import payloads.
    ScadaImport,
}

impl Vocabulary {
    pub const ALL: [Vocabulary; 5] = [
        Vocabulary::Label,
        Vocabulary::Api,
        Vocabulary::Assembly,
        Vocabulary::Middleware,
        Vocabulary::ScadaImport,
    ];

    fn column(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Vocabulary::Label => "label",
            Vocabulary::Api => "api",
            Vocabulary::Assembly => "assembly",
            Vocabulary::Middleware => "middleware",
            Vocabulary::ScadaImport => "scada_import",
        }
    }
}

impl FromStr for Vocabulary {
    type Err = TranslateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Vocabulary::ALL
            .into_iter()
            .find(|v| v.name() == s.trim())
            .ok_or_else(|| TranslateError::UnknownVocabulary(s.to_string()))
    }
}

impl fmt::Display for Vocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Entity sections of the translation table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Section {
    Gateway,
    Hardware,
    SensorModbus,
    RegisterModbus,
    SensorDnp3,
    RegisterDnp3,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::Gateway,
        Section::Hardware,
        Section::SensorModbus,
        Section::RegisterModbus,
        Section::SensorDnp3,
        Section::RegisterDnp3,
    ];

    fn rows(self) -> &'static [&'static [&'static str]] {
        match self {
            Section::Gateway => tables::GATEWAY,
            Section::Hardware => tables::HARDWARE,
            Section::SensorModbus => tables::SENSOR_MODBUS,
            Section::RegisterModbus => tables::REGISTER_MODBUS,
            Section::SensorDnp3 => tables::SENSOR_DNP3,
            Section::RegisterDnp3 => tables::REGISTER_DNP3,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Section::Gateway => "gateway",
            Section::Hardware => "hardware",
            Section::SensorModbus => "sensor_modbus",
            Section::RegisterModbus => "register_modbus",
            Section::SensorDnp3 => "sensor_dnp3",
            Section::RegisterDnp3 => "register_dnp3",
        };
        f.write_str(name)
    }
}

/// One validated section of the translation table.
#[derive(Debug, Clone)]
pub struct TranslationTable {
    section: Section,
    rows: Vec<[String; 5]>,
}

impl TranslationTable {
    pub fn from_rows(section: Section, rows: &[&[&str]]) -> Result<Self, TranslateError> {
        let expected = Vocabulary::ALL.len();
        let mut validated = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let cells: [String; 5] = match row {
                [a, b, c, d, e] => [a, b, c, d, e].map(|cell| cell.trim().to_string()),
                _ => {
                    return Err(TranslateError::MalformedRow {
                        section,
                        row: index,
                        width: row.len(),
                        expected,
                    });
                }
            };
            validated.push(cells);
        }
        Ok(TranslationTable { section, rows: validated })
    }

    pub fn section(&self) -> Section {
        self.section
    }

    /// Every non-empty name of `vocab` in this table.
    pub fn names(&self, vocab: Vocabulary) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .map(move |row| row[vocab.column()].as_str())
            .filter(|name| !name.is_empty())
    }
}

/// Source → target rename list, in table row order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapping {
    pairs: Vec<(String, String)>,
}

impl Mapping {
    /// Append the rows of `table`; a source already present takes the later row's target in place.
    fn extend_from(&mut self, table: &TranslationTable, source: Vocabulary, target: Vocabulary) {
        for row in &table.rows {
            let (from, to) = (&row[source.column()], &row[target.column()]);
            if from.is_empty() || to.is_empty() {
                continue;
            }
            match self.pairs.iter_mut().find(|(s, _)| s == from) {
                Some(existing) => existing.1 = to.clone(),
                None => self.pairs.push((from.clone(), to.clone())),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn target(&self, source: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(s, _)| s == source)
            .map(|(_, t)| t.as_str())
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(s, _)| s.as_str())
    }

    /// Keep only mapped fields, renamed. When several sources share a target name, the one from
    /// the later row wins and no duplicate column survives.
    pub fn apply(&self, record: &Record) -> Record {
        let mut out: BTreeMap<String, Value> = BTreeMap::new();
        for (source, target) in &self.pairs {
            if let Some(value) = record.get(source) {
                out.insert(target.clone(), value.clone());
            }
        }
        out.into_iter().collect()
    }

    pub fn apply_all(&self, records: &[Record]) -> Vec<Record> {
        records.iter().map(|r| self.apply(r)).collect()
    }
}

/// Build the `source → target` mapping of one table.
pub fn build_mapping(table: &TranslationTable, source: &str, target: &str) -> Result<Mapping, TranslateError> {
    let source: Vocabulary = source.parse()?;
    let target: Vocabulary = target.parse()?;
    let mut mapping = Mapping::default();
    mapping.extend_from(table, source, target);
    Ok(mapping)
}

/// All sections, validated at load.
#[derive(Debug, Clone)]
pub struct Translator {
    tables: BTreeMap<Section, TranslationTable>,
}

impl Translator {
    pub fn load() -> Result<Self, TranslateError> {
        let mut tables = BTreeMap::new();
        for section in Section::ALL {
            let table = TranslationTable::from_rows(section, section.rows())?;
            debug!("Translation section {} loaded ({} rows)", section, table.rows.len());
            tables.insert(section, table);
        }
        Ok(Translator { tables })
    }

    pub fn table(&self, section: Section) -> Option<&TranslationTable> {
        self.tables.get(&section)
    }

    /// Mapping over several sections concatenated in the given order (later sections win).
    pub fn mapping(&self, sections: &[Section], source: Vocabulary, target: Vocabulary) -> Mapping {
        let mut mapping = Mapping::default();
        for section in sections {
            if let Some(table) = self.tables.get(section) {
                mapping.extend_from(table, source, target);
            }
        }
        mapping
    }

    /// Mapping over every section, in declaration order.
    pub fn full_mapping(&self, source: Vocabulary, target: Vocabulary) -> Mapping {
        self.mapping(&Section::ALL, source, target)
    }
}

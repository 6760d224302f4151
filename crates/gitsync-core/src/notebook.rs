//! Serde model of the ipynb document format.
//!
//! Only the fields the merge engine reasons about are typed; everything else
//! on a cell (outputs, execution_count, id, attachments) rides along in
//! `extra` so a load/save cycle does not lose data.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    #[serde(default)]
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default = "default_nbformat")]
    pub nbformat: u32,
    #[serde(default = "default_nbformat_minor")]
    pub nbformat_minor: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub cell_type: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(
        default,
        deserialize_with = "source_from_json",
        serialize_with = "source_to_json"
    )]
    pub source: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_nbformat() -> u32 {
    4
}
fn default_nbformat_minor() -> u32 {
    5
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSource {
    Joined(String),
    Lines(Vec<String>),
}

fn source_from_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawSource::deserialize(deserializer)? {
        RawSource::Joined(s) => s,
        RawSource::Lines(lines) => lines.concat(),
    })
}

fn source_to_json<S>(source: &str, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let lines: Vec<&str> = source.split_inclusive('\n').collect();
    lines.serialize(serializer)
}

impl Notebook {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self {
            cells,
            metadata: Map::new(),
            nbformat: default_nbformat(),
            nbformat_minor: default_nbformat_minor(),
        }
    }

    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Cell sources in order.
    pub fn sources(&self) -> Vec<&str> {
        self.cells.iter().map(|c| c.source.as_str()).collect()
    }
}

impl Cell {
    pub fn new(cell_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            cell_type: cell_type.into(),
            metadata: Map::new(),
            source: source.into(),
            extra: Map::new(),
        }
    }

    pub fn code(source: impl Into<String>) -> Self {
        let mut cell = Self::new("code", source);
        cell.extra.insert("outputs".into(), Value::Array(Vec::new()));
        cell.extra.insert("execution_count".into(), Value::Null);
        cell
    }

    pub fn markdown(source: impl Into<String>) -> Self {
        Self::new("markdown", source)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

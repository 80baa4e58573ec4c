//! Typed Wikidata records.
//!
//! A dump is a JSON array with one entity per line. Each line is decoded into
//! a [`Record`]; the raw serde structs below mirror the dump format and are
//! converted so the rest of the crate never sees untyped JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// Entity kinds present in a Wikidata dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// `Q` entities.
    Item,
    /// `P` entities; their labels name relationship types.
    Property,
    /// `M` entities from Wikimedia Commons.
    MediaInfo,
}

/// Dump `type` tag -> kind. Anything else is rejected.
const KIND_TAGS: [(&str, EntityKind); 3] = [
    ("item", EntityKind::Item),
    ("property", EntityKind::Property),
    ("mediainfo", EntityKind::MediaInfo),
];

impl EntityKind {
    /// Parses the dump `type` tag.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownEntityKind` for tags outside the known set.
    pub fn from_tag(tag: &str) -> Result<Self> {
        KIND_TAGS
            .iter()
            .find(|(known, _)| *known == tag)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| Error::UnknownEntityKind(tag.to_string()))
    }

    /// Graph node label for this kind.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            EntityKind::Item => "Item",
            EntityKind::Property => "Property",
            EntityKind::MediaInfo => "MediaInfo",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A reference to another entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Referenced entity id, e.g. `Q515`.
    pub id: String,
}

/// A single typed value (the `datavalue` of a snak).
///
/// `Display` gives the flat string stored on relationships: the referenced id
/// for entity references, the timestamp for times, the amount for quantities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypedValue {
    /// Reference to an item, property, lexeme, form or sense.
    EntityRef(EntityRef),
    /// Plain string, external id, URL, media file name...
    String(String),
    /// Point in time.
    Time {
        /// ISO-like timestamp, e.g. `+2020-01-01T00:00:00Z`.
        time: String,
        /// Precision code (11 = day, 9 = year...).
        precision: u8,
    },
    /// Decimal quantity with an optional unit entity URI.
    Quantity {
        /// Signed decimal amount, e.g. `+42`.
        amount: String,
        /// Unit URI, `1` for unitless.
        unit: String,
    },
    /// Text in a given language.
    MonolingualText {
        /// The text.
        text: String,
        /// Language code.
        language: String,
    },
    /// Coordinates on a globe.
    GlobeCoordinate {
        /// Latitude in degrees.
        latitude: f64,
        /// Longitude in degrees.
        longitude: f64,
    },
    /// Any value type this crate does not model.
    Other {
        /// The dump's `type` tag.
        kind: String,
        /// Raw JSON value.
        raw: Value,
    },
}

impl TypedValue {
    /// Returns the referenced entity id for entity references.
    #[must_use]
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            TypedValue::EntityRef(r) => Some(&r.id),
            _ => None,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::EntityRef(r) => f.write_str(&r.id),
            TypedValue::String(s) => f.write_str(s),
            TypedValue::Time { time, .. } => f.write_str(time),
            TypedValue::Quantity { amount, .. } => f.write_str(amount),
            TypedValue::MonolingualText { text, .. } => f.write_str(text),
            TypedValue::GlobeCoordinate {
                latitude,
                longitude,
            } => write!(f, "{latitude},{longitude}"),
            TypedValue::Other { raw, .. } => write!(f, "{raw}"),
        }
    }
}

/// A property/value pair. `value` is `None` for `somevalue` and `novalue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snak {
    /// Property id, e.g. `P580`.
    pub property: String,
    /// Dump data type, e.g. `wikibase-item`.
    pub datatype: Option<String>,
    /// The value, when the snak has one.
    pub value: Option<TypedValue>,
}

/// A claim attached to an entity under one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// The main snak.
    pub main: Snak,
    /// Qualifier snaks keyed by qualifier property id.
    pub qualifiers: HashMap<String, Vec<Snak>>,
}

impl Statement {
    /// Value of the main snak.
    #[must_use]
    pub fn main_value(&self) -> Option<&TypedValue> {
        self.main.value.as_ref()
    }

    /// Appends a qualifier value under `property` (builder pattern).
    #[must_use]
    pub fn with_qualifier(mut self, property: &str, value: TypedValue) -> Self {
        self.qualifiers
            .entry(property.to_string())
            .or_default()
            .push(Snak {
                property: property.to_string(),
                datatype: None,
                value: Some(value),
            });
        self
    }
}

/// One entity from the dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Entity id, e.g. `Q5`.
    pub id: String,
    /// Entity kind.
    pub kind: EntityKind,
    /// MediaWiki page id.
    pub page_id: Option<u64>,
    /// Labels keyed by language code.
    pub labels: HashMap<String, String>,
    /// Descriptions keyed by language code.
    pub descriptions: HashMap<String, String>,
    /// Statements keyed by property id.
    pub claims: HashMap<String, Vec<Statement>>,
}

impl Record {
    /// Creates a record with no labels and no claims.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            kind,
            page_id: None,
            labels: HashMap::new(),
            descriptions: HashMap::new(),
            claims: HashMap::new(),
        }
    }

    /// Sets the label for `locale` (builder pattern).
    #[must_use]
    pub fn with_label(mut self, locale: &str, label: impl Into<String>) -> Self {
        self.labels.insert(locale.to_string(), label.into());
        self
    }

    /// Appends a statement under `property` (builder pattern).
    #[must_use]
    pub fn with_statement(mut self, property: &str, statement: Statement) -> Self {
        self.claims
            .entry(property.to_string())
            .or_default()
            .push(statement);
        self
    }

    /// Label in `locale`, if present.
    #[must_use]
    pub fn label(&self, locale: &str) -> Option<&str> {
        self.labels.get(locale).map(String::as_str)
    }

    /// Description in `locale`, if present.
    #[must_use]
    pub fn description(&self, locale: &str) -> Option<&str> {
        self.descriptions.get(locale).map(String::as_str)
    }

    /// Decodes one line of a JSON-array dump.
    ///
    /// Returns `Ok(None)` for the array brackets and blank lines. A trailing
    /// comma is tolerated.
    ///
    /// # Errors
    ///
    /// Returns `Error::Record` if the line is not a valid entity and
    /// `Error::UnknownEntityKind` for an unrecognized `type` tag.
    pub fn from_dump_line(line: &str, line_no: u64) -> Result<Option<Self>> {
        let trimmed = line.trim();
        let trimmed = trimmed.strip_suffix(',').unwrap_or(trimmed);
        if trimmed.is_empty() || trimmed == "[" || trimmed == "]" {
            return Ok(None);
        }

        let raw: RawEntity = serde_json::from_str(trimmed).map_err(|e| Error::Record {
            line: line_no,
            reason: e.to_string(),
        })?;
        raw.into_record().map(Some)
    }
}

/// Builds a statement whose main snak references `target` (mostly for tests
/// and benchmarks).
#[must_use]
pub fn entity_statement(property: &str, target: &str) -> Statement {
    Statement {
        main: Snak {
            property: property.to_string(),
            datatype: Some("wikibase-item".to_string()),
            value: Some(TypedValue::EntityRef(EntityRef {
                id: target.to_string(),
            })),
        },
        qualifiers: HashMap::new(),
    }
}

// =============================================================================
// Raw dump format
// =============================================================================

#[derive(Deserialize)]
struct RawEntity {
    #[serde(rename = "type")]
    kind: String,
    id: String,
    #[serde(default)]
    pageid: Option<u64>,
    #[serde(default, deserialize_with = "lenient_map")]
    labels: HashMap<String, RawTerm>,
    #[serde(default, deserialize_with = "lenient_map")]
    descriptions: HashMap<String, RawTerm>,
    #[serde(default, deserialize_with = "lenient_map")]
    claims: HashMap<String, Vec<RawStatement>>,
    // MediaInfo entities carry their claims here.
    #[serde(default, deserialize_with = "lenient_map")]
    statements: HashMap<String, Vec<RawStatement>>,
}

#[derive(Deserialize)]
struct RawTerm {
    value: String,
}

#[derive(Deserialize)]
struct RawStatement {
    mainsnak: RawSnak,
    #[serde(default, deserialize_with = "lenient_map")]
    qualifiers: HashMap<String, Vec<RawSnak>>,
}

#[derive(Deserialize)]
struct RawSnak {
    property: String,
    #[serde(default)]
    datatype: Option<String>,
    #[serde(default)]
    datavalue: Option<RawDataValue>,
}

#[derive(Deserialize)]
struct RawDataValue {
    #[serde(rename = "type")]
    kind: String,
    value: Value,
}

#[derive(Deserialize)]
struct RawEntityId {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "entity-type", default)]
    entity_type: Option<String>,
    #[serde(rename = "numeric-id", default)]
    numeric_id: Option<u64>,
}

#[derive(Deserialize)]
struct RawTime {
    time: String,
    #[serde(default)]
    precision: u8,
}

#[derive(Deserialize)]
struct RawQuantity {
    amount: String,
    #[serde(default = "unitless")]
    unit: String,
}

#[derive(Deserialize)]
struct RawMonolingual {
    text: String,
    language: String,
}

#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

fn unitless() -> String {
    "1".to_string()
}

/// Empty maps are serialized as `[]` in Wikibase JSON.
fn lenient_map<'de, D, T>(deserializer: D) -> std::result::Result<HashMap<String, T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MapOrList<T> {
        Map(HashMap<String, T>),
        #[allow(dead_code)]
        List(Vec<serde::de::IgnoredAny>),
    }

    match MapOrList::<T>::deserialize(deserializer)? {
        MapOrList::Map(map) => Ok(map),
        MapOrList::List(_) => Ok(HashMap::new()),
    }
}

impl RawEntity {
    fn into_record(self) -> Result<Record> {
        let kind = EntityKind::from_tag(&self.kind)?;
        let claims = if self.claims.is_empty() {
            self.statements
        } else {
            self.claims
        };

        Ok(Record {
            id: self.id,
            kind,
            page_id: self.pageid,
            labels: terms(self.labels),
            descriptions: terms(self.descriptions),
            claims: claims
                .into_iter()
                .map(|(property, statements)| {
                    let statements = statements.into_iter().map(RawStatement::into_statement);
                    (property, statements.collect())
                })
                .collect(),
        })
    }
}

fn terms(raw: HashMap<String, RawTerm>) -> HashMap<String, String> {
    raw.into_iter().map(|(lang, term)| (lang, term.value)).collect()
}

impl RawStatement {
    fn into_statement(self) -> Statement {
        Statement {
            main: self.mainsnak.into_snak(),
            qualifiers: self
                .qualifiers
                .into_iter()
                .map(|(property, snaks)| {
                    (property, snaks.into_iter().map(RawSnak::into_snak).collect())
                })
                .collect(),
        }
    }
}

impl RawSnak {
    fn into_snak(self) -> Snak {
        Snak {
            property: self.property,
            datatype: self.datatype,
            value: self.datavalue.map(RawDataValue::into_typed),
        }
    }
}

impl RawDataValue {
    fn into_typed(self) -> TypedValue {
        let converted = match self.kind.as_str() {
            "wikibase-entityid" => serde_json::from_value::<RawEntityId>(self.value.clone())
                .ok()
                .and_then(RawEntityId::into_id)
                .map(|id| TypedValue::EntityRef(EntityRef { id })),
            "string" => self
                .value
                .as_str()
                .map(|s| TypedValue::String(s.to_string())),
            "time" => serde_json::from_value::<RawTime>(self.value.clone())
                .ok()
                .map(|t| TypedValue::Time {
                    time: t.time,
                    precision: t.precision,
                }),
            "quantity" => serde_json::from_value::<RawQuantity>(self.value.clone())
                .ok()
                .map(|q| TypedValue::Quantity {
                    amount: q.amount,
                    unit: q.unit,
                }),
            "monolingualtext" => serde_json::from_value::<RawMonolingual>(self.value.clone())
                .ok()
                .map(|m| TypedValue::MonolingualText {
                    text: m.text,
                    language: m.language,
                }),
            "globecoordinate" => serde_json::from_value::<RawCoordinate>(self.value.clone())
                .ok()
                .map(|c| TypedValue::GlobeCoordinate {
                    latitude: c.latitude,
                    longitude: c.longitude,
                }),
            _ => None,
        };

        converted.unwrap_or(TypedValue::Other {
            kind: self.kind,
            raw: self.value,
        })
    }
}

impl RawEntityId {
    /// Older dumps omit `id`; rebuild it from the numeric id.
    fn into_id(self) -> Option<String> {
        if let Some(id) = self.id {
            return Some(id);
        }
        let prefix = match self.entity_type.as_deref()? {
            "item" => 'Q',
            "property" => 'P',
            "lexeme" => 'L',
            _ => return None,
        };
        self.numeric_id.map(|n| format!("{prefix}{n}"))
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;

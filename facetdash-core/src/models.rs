use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::tokens::{parse_tokens, Token};

/// Stable identifier of one entity (organization).
///
/// The backend sends IDs as either JSON numbers or strings; both are kept as
/// their string form so that `7` and `"7"` refer to the same entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A facet field value after boundary normalization.
///
/// Anything that is neither a string, a number nor an array of those is
/// dropped during deserialization and behaves like an absent field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FacetValue {
    /// A single delimited string, e.g. `"VFX, Animation, VFX"`.
    Text(String),
    /// An array of values; every element is itself parsed as a delimited string.
    List(Vec<String>),
}

impl FacetValue {
    /// Deduplicated, order-stable tokens carried by this value.
    pub fn tokens(&self) -> Vec<Token> {
        match self {
            FacetValue::Text(s) => parse_tokens(Some(s)),
            FacetValue::List(values) => {
                let joined = values.join(",");
                parse_tokens(Some(&joined))
            }
        }
    }

    fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(FacetValue::Text(s)),
            serde_json::Value::Number(n) => Some(FacetValue::Text(n.to_string())),
            serde_json::Value::Array(arr) => Some(FacetValue::List(
                arr.into_iter()
                    .filter_map(|v| match v {
                        serde_json::Value::String(s) => Some(s),
                        serde_json::Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect(),
            )),
            _ => None,
        }
    }
}

/// One record of the dataset with its raw facet fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEntity")]
pub struct Entity {
    pub id: EntityId,
    #[serde(flatten)]
    pub fields: BTreeMap<String, FacetValue>,
}

impl Entity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(id),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style helper for setting a delimited text field.
    pub fn with_field(mut self, facet: &str, value: &str) -> Self {
        self.fields
            .insert(facet.to_string(), FacetValue::Text(value.to_string()));
        self
    }

    /// Parsed tokens of `facet`; an absent field yields no tokens.
    pub fn tokens(&self, facet: &str) -> Vec<Token> {
        self.fields
            .get(facet)
            .map(FacetValue::tokens)
            .unwrap_or_default()
    }

    /// Name shown to users: the `name` field if present, otherwise the ID.
    pub fn display_name(&self) -> String {
        match self.fields.get("name") {
            Some(FacetValue::Text(name)) if !name.trim().is_empty() => name.trim().to_string(),
            _ => self.id.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(serde_json::Number),
    Text(String),
}

/// Wire shape of an entity before boundary normalization.
#[derive(Deserialize)]
struct RawEntity {
    id: RawId,
    #[serde(flatten)]
    fields: BTreeMap<String, serde_json::Value>,
}

impl From<RawEntity> for Entity {
    fn from(raw: RawEntity) -> Self {
        let id = match raw.id {
            RawId::Number(n) => EntityId(n.to_string()),
            RawId::Text(s) => EntityId(s),
        };

        let fields = raw
            .fields
            .into_iter()
            .filter_map(|(key, value)| FacetValue::from_json(value).map(|v| (key, v)))
            .collect();

        Entity { id, fields }
    }
}

/// Convert raw rows to entities, skipping rows without a scalar `id`.
///
/// One odd row must not make the whole page unreadable.
pub(crate) fn entities_from_rows(rows: Vec<serde_json::Value>) -> Vec<Entity> {
    let received = rows.len();
    let entities: Vec<Entity> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(idx, row)| match serde_json::from_value::<Entity>(row) {
            Ok(entity) => Some(entity),
            Err(err) => {
                tracing::warn!(row = idx, error = %err, "skipping entity row");
                None
            }
        })
        .collect();

    if entities.len() < received {
        tracing::debug!(received, kept = entities.len(), "dropped unusable entity rows");
    }
    entities
}

/// Multi-token match semantics for one facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// At least one selected token must be present.
    #[default]
    Any,
    /// Every selected token must be present.
    All,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Any => "any",
            MatchMode::All => "all",
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(MatchMode::Any),
            "all" => Ok(MatchMode::All),
            other => Err(format!("unknown match mode '{}', expected 'any' or 'all'", other)),
        }
    }
}

/// One row of the static taxonomy reference table.
///
/// Empty `L2`/`L3` cells mean the row stops at the previous level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyRow {
    #[serde(rename = "L1")]
    pub l1: String,
    #[serde(rename = "L2", default)]
    pub l2: Option<String>,
    #[serde(rename = "L3", default)]
    pub l3: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl TaxonomyRow {
    pub fn new(l1: &str, l2: &str, l3: &str) -> Self {
        let cell = |s: &str| (!s.trim().is_empty()).then(|| s.to_string());
        Self {
            l1: l1.to_string(),
            l2: cell(l2),
            l3: cell(l3),
            description: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// Response of `GET /entities`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "RawEntityPage")]
pub struct EntityPage {
    pub data: Vec<Entity>,
    pub total: usize,
    /// Rows the backend sent without a usable `id`.
    pub skipped: usize,
}

impl EntityPage {
    pub fn new(data: Vec<Entity>, total: usize) -> Self {
        Self {
            data,
            total,
            skipped: 0,
        }
    }

    /// Rows on the wire, skipped ones included; decides whether more pages follow.
    pub fn rows_sent(&self) -> usize {
        self.data.len() + self.skipped
    }
}

#[derive(Deserialize)]
struct RawEntityPage {
    #[serde(default)]
    data: Vec<serde_json::Value>,
    #[serde(default)]
    total: usize,
}

impl From<RawEntityPage> for EntityPage {
    fn from(raw: RawEntityPage) -> Self {
        let sent = raw.data.len();
        let data = entities_from_rows(raw.data);
        Self {
            skipped: sent - data.len(),
            data,
            total: raw.total,
        }
    }
}

/// Response of `GET /facet-counts`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetTotals {
    #[serde(default)]
    pub totals_by_token: BTreeMap<String, usize>,
    #[serde(default)]
    pub total_entities: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_deserializes_mixed_field_shapes() {
        let entity: Entity = serde_json::from_value(json!({
            "id": 42,
            "name": "Pixel Forge",
            "services": "VFX, Animation",
            "regions": ["EMEA", "APAC, EMEA"],
            "countries": null,
            "verified": true,
            "employees": 120
        }))
        .unwrap();

        assert_eq!(entity.id, EntityId::new("42"));
        assert_eq!(entity.display_name(), "Pixel Forge");
        assert_eq!(entity.tokens("services").len(), 2);

        let regions: Vec<_> = entity.tokens("regions").into_iter().map(|t| t.label).collect();
        assert_eq!(regions, vec!["EMEA", "APAC"]);

        assert!(!entity.fields.contains_key("countries"));
        assert!(!entity.fields.contains_key("verified"));
        assert_eq!(
            entity.fields.get("employees"),
            Some(&FacetValue::Text("120".to_string()))
        );
    }

    #[test]
    fn test_page_keeps_odd_ids_and_skips_rows_without_id() {
        let page: EntityPage = serde_json::from_value(json!({
            "data": [
                {"id": 1, "services": "VFX"},
                {"id": 2.5, "services": "Games"},
                {"id": 18446744073709551615u64},
                {"services": "Rigging"},
                {"id": null},
                {"id": {"nested": true}},
                {"id": "abc"}
            ],
            "total": 7
        }))
        .unwrap();

        let ids: Vec<&str> = page.data.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2.5", "18446744073709551615", "abc"]);
        assert_eq!(page.total, 7);
        assert_eq!(page.skipped, 3);
        assert_eq!(page.rows_sent(), 7);
        assert_eq!(page.data[1].tokens("services")[0].label, "Games");
    }

    #[test]
    fn test_missing_facet_yields_no_tokens() {
        let entity = Entity::new("a");
        assert!(entity.tokens("services").is_empty());
        assert_eq!(entity.display_name(), "a");
    }

    #[test]
    fn test_match_mode_parsing() {
        assert_eq!("ALL".parse::<MatchMode>(), Ok(MatchMode::All));
        assert_eq!(" any ".parse::<MatchMode>(), Ok(MatchMode::Any));
        assert!("some".parse::<MatchMode>().is_err());
    }

    #[test]
    fn test_taxonomy_row_from_json() {
        let row: TaxonomyRow = serde_json::from_value(json!({
            "L1": "Animation",
            "L2": "2D Animation",
            "description": "Hand drawn and vector work"
        }))
        .unwrap();

        assert_eq!(row.l1, "Animation");
        assert_eq!(row.l2.as_deref(), Some("2D Animation"));
        assert!(row.l3.is_none());
    }

    #[test]
    fn test_facet_totals_from_json() {
        let totals: FacetTotals = serde_json::from_value(json!({
            "totalsByToken": {"vfx": 12, "animation": 9},
            "totalEntities": 30
        }))
        .unwrap();

        assert_eq!(totals.totals_by_token.get("vfx"), Some(&12));
        assert_eq!(totals.total_entities, 30);
    }
}

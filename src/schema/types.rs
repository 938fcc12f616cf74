//! Definition types
//!
//! A definition document looks like:
//!
//! ```json
//! {
//!   "name": "Post",
//!   "properties": {
//!     "title": {"type": "string", "required": true, "max": 120},
//!     "status": {"type": "string", "choices": ["draft", "live"], "deleteKeyIfValueIn": ["draft"]}
//!   },
//!   "relations": {
//!     "tags": {"type": "embedsMany", "model": "Tag", "default": []},
//!     "byId": {"type": "embedsManyAsObject", "model": "Entry",
//!              "key": {"autoclean": true, "type": "model", "model": "Thing"}}
//!   }
//! }
//! ```
//!
//! Supported property types:
//! - string, int, float, number, bool, object, array, any
//! - GeoPoint: `{"lat": <number>, "lng": <number>}`
//! - date, datetime, time: ISO-8601 strings
//! - any other name: reference to another definition, validated as an
//!   embedded document
//!
//! Supported relation types: embedsOne, embedsMany, embedsManyAsObject and
//! the storage-only belongsTo, hasOne, hasMany.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::choices::{normalize, Choice};
use super::errors::{SchemaError, SchemaResult};

/// Property value types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    /// Integral numbers only
    Int,
    /// Any number
    Float,
    /// Any number
    Number,
    Bool,
    Object,
    Array,
    GeoPoint,
    Date,
    DateTime,
    Time,
    /// No type predicate at all
    Any,
    /// Name of another definition, resolved at compile time
    Reference(String),
}

impl FieldType {
    /// Parses a declared type name. Unknown names become references.
    pub fn parse(declared: &str) -> Self {
        match declared {
            "string" => FieldType::String,
            "int" => FieldType::Int,
            "float" => FieldType::Float,
            "number" => FieldType::Number,
            "bool" => FieldType::Bool,
            "object" => FieldType::Object,
            "array" => FieldType::Array,
            "GeoPoint" => FieldType::GeoPoint,
            "date" => FieldType::Date,
            "datetime" => FieldType::DateTime,
            "time" => FieldType::Time,
            "any" => FieldType::Any,
            other => FieldType::Reference(other.to_string()),
        }
    }

    /// Returns the type name for error messages
    pub fn type_name(&self) -> &str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Number => "number",
            FieldType::Bool => "bool",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::GeoPoint => "GeoPoint",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Time => "time",
            FieldType::Any => "any",
            FieldType::Reference(name) => name,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Int | FieldType::Float | FieldType::Number)
    }
}

/// Relation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    EmbedsOne,
    EmbedsMany,
    EmbedsManyAsObject,
    BelongsTo,
    HasOne,
    HasMany,
}

impl RelationKind {
    pub fn parse(declared: &str) -> Option<Self> {
        match declared {
            "embedsOne" => Some(RelationKind::EmbedsOne),
            "embedsMany" => Some(RelationKind::EmbedsMany),
            "embedsManyAsObject" => Some(RelationKind::EmbedsManyAsObject),
            "belongsTo" => Some(RelationKind::BelongsTo),
            "hasOne" => Some(RelationKind::HasOne),
            "hasMany" => Some(RelationKind::HasMany),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::EmbedsOne => "embedsOne",
            RelationKind::EmbedsMany => "embedsMany",
            RelationKind::EmbedsManyAsObject => "embedsManyAsObject",
            RelationKind::BelongsTo => "belongsTo",
            RelationKind::HasOne => "hasOne",
            RelationKind::HasMany => "hasMany",
        }
    }

    /// Embedded relations carry a nested validator; the others belong to the
    /// storage layer.
    pub fn is_embedded(&self) -> bool {
        matches!(
            self,
            RelationKind::EmbedsOne | RelationKind::EmbedsMany | RelationKind::EmbedsManyAsObject
        )
    }
}

/// Key policy of an `embedsManyAsObject` relation
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct KeySpec {
    #[serde(default)]
    pub autoclean: bool,
    #[serde(rename = "type", default)]
    pub key_type: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl KeySpec {
    /// Model whose ids the map keys reference, when autoclean is fully configured.
    pub fn autoclean_model(&self) -> Option<&str> {
        if self.autoclean && self.key_type.as_deref() == Some("model") {
            self.model.as_deref()
        } else {
            None
        }
    }
}

/// Declarative rules for one property
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub field_type: FieldType,
    pub required: bool,
    /// Non-null default; a `null` default is treated as absent
    pub default: Option<Value>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub choices: Option<Vec<Choice>>,
    pub delete_key_if_value_in: Vec<Value>,
    pub description: Option<String>,
}

impl FieldSpec {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            default: None,
            min: None,
            max: None,
            choices: None,
            delete_key_if_value_in: Vec::new(),
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = if default.is_null() { None } else { Some(default) };
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_choices(mut self, choices: Vec<Choice>) -> Self {
        self.choices = Some(choices);
        self
    }

    pub fn delete_if_value_in(mut self, blacklist: Vec<Value>) -> Self {
        self.delete_key_if_value_in = blacklist;
        self
    }
}

/// Declarative rules for one relation
#[derive(Debug, Clone, PartialEq)]
pub struct RelationSpec {
    pub kind: RelationKind,
    pub model: String,
    pub required: bool,
    pub default: Option<Value>,
    pub key: Option<KeySpec>,
    pub description: Option<String>,
}

impl RelationSpec {
    pub fn new(kind: RelationKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            required: false,
            default: None,
            key: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = if default.is_null() { None } else { Some(default) };
        self
    }

    pub fn with_key(mut self, key: KeySpec) -> Self {
        self.key = Some(key);
        self
    }
}

/// On-disk shape of a single field entry before it is checked.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawField {
    #[serde(rename = "type")]
    field_type: Option<String>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    default: Option<Value>,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
    #[serde(default)]
    choices: Option<Vec<Value>>,
    #[serde(default)]
    delete_key_if_value_in: Option<Vec<Value>>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    key: Option<KeySpec>,
    #[serde(default)]
    description: Option<String>,
}

/// A named document-type definition
///
/// Field order is the order of the source document: properties first, then
/// relations. Field names are unique across both.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    name: String,
    properties: Vec<(String, FieldSpec)>,
    relations: Vec<(String, RelationSpec)>,
}

impl Definition {
    /// Create an empty definition
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Appends a property, rejecting duplicate field names.
    pub fn with_property(mut self, field: impl Into<String>, spec: FieldSpec) -> SchemaResult<Self> {
        let field = field.into();
        self.ensure_unique(&field)?;
        self.properties.push((field, spec));
        Ok(self)
    }

    /// Appends a relation, rejecting duplicate field names.
    pub fn with_relation(mut self, field: impl Into<String>, spec: RelationSpec) -> SchemaResult<Self> {
        let field = field.into();
        self.ensure_unique(&field)?;
        self.relations.push((field, spec));
        Ok(self)
    }

    fn ensure_unique(&self, field: &str) -> SchemaResult<()> {
        if self.property(field).is_some() || self.relation(field).is_some() {
            return Err(SchemaError::malformed_field(
                &self.name,
                field,
                "field declared more than once across properties and relations",
            ));
        }
        Ok(())
    }

    /// Parses a definition document fetched under `type_name`.
    pub fn from_value(type_name: &str, document: &Value) -> SchemaResult<Self> {
        let root = document.as_object().ok_or_else(|| {
            SchemaError::malformed_definition(type_name, "definition document must be an object")
        })?;

        if let Some(name) = root.get("name") {
            if !name.is_string() {
                return Err(SchemaError::malformed_definition(
                    type_name,
                    "'name' must be a string",
                ));
            }
        }

        let mut definition = Definition::new(type_name);

        for (field, raw) in section(type_name, root, "properties")? {
            let spec = parse_property(type_name, field, raw)?;
            definition = definition.with_property(field.as_str(), spec)?;
        }
        for (field, raw) in section(type_name, root, "relations")? {
            let spec = parse_relation(type_name, field, raw)?;
            definition = definition.with_relation(field.as_str(), spec)?;
        }

        Ok(definition)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.properties.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn relations(&self) -> impl Iterator<Item = (&str, &RelationSpec)> {
        self.relations.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn property(&self, field: &str) -> Option<&FieldSpec> {
        self.properties.iter().find(|(n, _)| n == field).map(|(_, s)| s)
    }

    pub fn relation(&self, field: &str) -> Option<&RelationSpec> {
        self.relations.iter().find(|(n, _)| n == field).map(|(_, s)| s)
    }

    /// All field names in declared order (properties, then relations)
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.properties
            .iter()
            .map(|(n, _)| n.as_str())
            .chain(self.relations.iter().map(|(n, _)| n.as_str()))
    }

    /// Relations that embed another definition
    pub fn embedded_relations(&self) -> impl Iterator<Item = (&str, &RelationSpec)> {
        self.relations().filter(|(_, r)| r.kind.is_embedded())
    }

    /// Fields that must be present and have no default to fill them
    pub fn required_fields(&self) -> Vec<&str> {
        let props = self
            .properties()
            .filter(|(_, s)| s.required && s.default.is_none())
            .map(|(n, _)| n);
        let rels = self
            .relations()
            .filter(|(_, r)| r.required && r.default.is_none())
            .map(|(n, _)| n);
        props.chain(rels).collect()
    }

    /// Normalized choices per property, for display metadata
    pub fn choice_fields(&self) -> Vec<(&str, &[Choice])> {
        self.properties()
            .filter_map(|(n, s)| s.choices.as_deref().map(|c| (n, c)))
            .collect()
    }
}

fn section<'a>(
    type_name: &str,
    root: &'a Map<String, Value>,
    key: &str,
) -> SchemaResult<Vec<(&'a String, &'a Value)>> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(map)) => Ok(map.iter().collect()),
        Some(_) => Err(SchemaError::malformed_definition(
            type_name,
            format!("'{}' must be an object", key),
        )),
    }
}

fn parse_raw(type_name: &str, field: &str, raw: &Value) -> SchemaResult<(RawField, String)> {
    if !raw.is_object() {
        return Err(SchemaError::malformed_field(
            type_name,
            field,
            "field rules must be an object",
        ));
    }
    let parsed: RawField = serde_json::from_value(raw.clone())
        .map_err(|e| SchemaError::malformed_field(type_name, field, e.to_string()))?;
    let declared = match parsed.field_type.as_deref() {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => {
            return Err(SchemaError::malformed_field(
                type_name,
                field,
                "missing 'type'",
            ))
        }
    };
    Ok((parsed, declared))
}

fn parse_property(type_name: &str, field: &str, raw: &Value) -> SchemaResult<FieldSpec> {
    let (raw, declared) = parse_raw(type_name, field, raw)?;

    if RelationKind::parse(&declared).is_some() {
        return Err(SchemaError::unknown_field_type(type_name, field, declared));
    }

    let choices = match raw.choices {
        Some(list) => Some(
            normalize(&list).map_err(|e| SchemaError::malformed_field(type_name, field, e))?,
        ),
        None => None,
    };

    if let (Some(min), Some(max)) = (raw.min, raw.max) {
        if min > max {
            return Err(SchemaError::malformed_field(
                type_name,
                field,
                format!("min {} is greater than max {}", min, max),
            ));
        }
    }

    Ok(FieldSpec {
        field_type: FieldType::parse(&declared),
        required: raw.required,
        default: raw.default.filter(|d| !d.is_null()),
        min: raw.min,
        max: raw.max,
        choices,
        delete_key_if_value_in: raw.delete_key_if_value_in.unwrap_or_default(),
        description: raw.description,
    })
}

fn parse_relation(type_name: &str, field: &str, raw: &Value) -> SchemaResult<RelationSpec> {
    let (raw, declared) = parse_raw(type_name, field, raw)?;

    let kind = RelationKind::parse(&declared)
        .ok_or_else(|| SchemaError::unknown_field_type(type_name, field, &declared))?;

    let model = raw
        .model
        .filter(|m| !m.is_empty())
        .ok_or_else(|| SchemaError::malformed_field(type_name, field, "relation needs a 'model'"))?;

    if raw.key.is_some() && kind != RelationKind::EmbedsManyAsObject {
        return Err(SchemaError::malformed_field(
            type_name,
            field,
            "'key' is only allowed on embedsManyAsObject relations",
        ));
    }

    Ok(RelationSpec {
        kind,
        model,
        required: raw.required,
        default: raw.default.filter(|d| !d.is_null()),
        key: raw.key,
        description: raw.description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::errors::SchemaErrorCode;
    use serde_json::json;

    #[test]
    fn test_parse_keeps_declared_order() {
        let doc = json!({
            "name": "Post",
            "properties": {
                "title": {"type": "string", "required": true},
                "views": {"type": "int", "default": 0},
                "body": {"type": "string"}
            },
            "relations": {
                "tags": {"type": "embedsMany", "model": "Tag"}
            }
        });
        let def = Definition::from_value("Post", &doc).unwrap();
        let names: Vec<&str> = def.field_names().collect();
        assert_eq!(names, vec!["title", "views", "body", "tags"]);
        assert_eq!(def.required_fields(), vec!["title"]);
    }

    #[test]
    fn test_null_default_is_no_default() {
        let doc = json!({"properties": {"a": {"type": "string", "default": null}}});
        let def = Definition::from_value("T", &doc).unwrap();
        assert_eq!(def.property("a").unwrap().default, None);
    }

    #[test]
    fn test_missing_type_is_malformed() {
        let doc = json!({"properties": {"a": {"required": true}}});
        let err = Definition::from_value("T", &doc).unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::MalformedDefinition);
        assert_eq!(err.field_name(), Some("a"));
    }

    #[test]
    fn test_unknown_relation_kind() {
        let doc = json!({"relations": {"a": {"type": "embedsSome", "model": "X"}}});
        let err = Definition::from_value("T", &doc).unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::UnknownFieldType);
        assert_eq!(err.declared_type(), Some("embedsSome"));
    }

    #[test]
    fn test_relation_kind_in_properties_rejected() {
        let doc = json!({"properties": {"a": {"type": "embedsOne", "model": "X"}}});
        let err = Definition::from_value("T", &doc).unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::UnknownFieldType);
    }

    #[test]
    fn test_duplicate_field_across_sections() {
        let doc = json!({
            "properties": {"a": {"type": "string"}},
            "relations": {"a": {"type": "embedsOne", "model": "X"}}
        });
        let err = Definition::from_value("T", &doc).unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::MalformedDefinition);
    }

    #[test]
    fn test_unknown_property_type_becomes_reference() {
        let doc = json!({"properties": {"addr": {"type": "Address"}}});
        let def = Definition::from_value("T", &doc).unwrap();
        assert_eq!(
            def.property("addr").unwrap().field_type,
            FieldType::Reference("Address".into())
        );
    }

    #[test]
    fn test_key_spec_autoclean_model() {
        let doc = json!({"relations": {"byId": {
            "type": "embedsManyAsObject",
            "model": "Entry",
            "key": {"autoclean": true, "type": "model", "model": "Thing"}
        }}});
        let def = Definition::from_value("T", &doc).unwrap();
        let key = def.relation("byId").unwrap().key.as_ref().unwrap();
        assert_eq!(key.autoclean_model(), Some("Thing"));

        let off = KeySpec {
            autoclean: false,
            key_type: Some("model".into()),
            model: Some("Thing".into()),
        };
        assert_eq!(off.autoclean_model(), None);
    }

    #[test]
    fn test_key_only_on_map_relations() {
        let doc = json!({"relations": {"one": {
            "type": "embedsOne", "model": "Entry", "key": {"autoclean": true}
        }}});
        assert!(Definition::from_value("T", &doc).is_err());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let doc = json!({"properties": {"n": {"type": "int", "min": 5, "max": 1}}});
        assert!(Definition::from_value("T", &doc).is_err());
    }

    #[test]
    fn test_choice_fields_are_normalized() {
        let doc = json!({"properties": {"s": {"type": "string", "choices": ["a", "b"]}}});
        let def = Definition::from_value("T", &doc).unwrap();
        let fields = def.choice_fields();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].1[1].label, json!("b"));
    }
}

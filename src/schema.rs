//! Field-mapping schema for log indices.
//!
//! The mapping is described by typed constants so it is built once at
//! compile time; only the request body is rendered when an index has to be
//! created.

use serde_json::{json, Map, Value};

/// Bumped whenever the field layout below changes. Stored in the index
/// mapping `_meta` so existing indices can be told apart.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Date,
    Keyword,
    Text,
    Integer,
    Object,
}

impl FieldType {
    fn as_str(&self) -> &'static str {
        match self {
            FieldType::Date => "date",
            FieldType::Keyword => "keyword",
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Object => "object",
        }
    }
}

/// One mapped field. Objects carry their sub-fields in `properties`; an
/// object that is not indexed is stored as an opaque blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub name: &'static str,
    pub kind: FieldType,
    pub indexed: bool,
    pub properties: &'static [FieldMapping],
}

impl FieldMapping {
    pub const fn new(name: &'static str, kind: FieldType, indexed: bool) -> Self {
        FieldMapping {
            name,
            kind,
            indexed,
            properties: &[],
        }
    }

    pub const fn object(name: &'static str, properties: &'static [FieldMapping]) -> Self {
        FieldMapping {
            name,
            kind: FieldType::Object,
            indexed: true,
            properties,
        }
    }

    fn to_value(&self) -> Value {
        let mut body = Map::new();
        body.insert("type".into(), Value::from(self.kind.as_str()));
        match self.kind {
            FieldType::Object if !self.indexed => {
                body.insert("enabled".into(), Value::Bool(false));
            }
            FieldType::Object => {
                body.insert("properties".into(), properties_value(self.properties));
            }
            _ if !self.indexed => {
                body.insert("index".into(), Value::Bool(false));
            }
            _ => {}
        }
        Value::Object(body)
    }
}

fn properties_value(fields: &[FieldMapping]) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|f| (f.name.to_string(), f.to_value()))
            .collect(),
    )
}

/// Complete index description: settings plus field mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSchema {
    pub version: u32,
    pub shards: u32,
    pub fields: &'static [FieldMapping],
}

impl IndexSchema {
    /// Pick the schema variant matching the `index_message` option.
    pub fn for_options(index_message: bool) -> &'static IndexSchema {
        if index_message {
            &LOG_SCHEMA_V1_INDEXED_MESSAGE
        } else {
            &LOG_SCHEMA_V1
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Render the create-index request body.
    pub fn to_body(&self) -> Value {
        json!({
            "settings": {
                "number_of_shards": self.shards,
            },
            "mappings": {
                "_meta": { "schema_version": self.version },
                "properties": properties_value(self.fields),
            }
        })
    }
}

const ERROR_FIELDS: &[FieldMapping] = &[
    FieldMapping::new("type", FieldType::Keyword, true),
    FieldMapping::new("category", FieldType::Keyword, true),
    FieldMapping::new("status", FieldType::Integer, false),
    FieldMapping::new("code", FieldType::Keyword, true),
    FieldMapping::new("message", FieldType::Text, false),
    FieldMapping::new("details", FieldType::Object, false),
    FieldMapping::new("cause", FieldType::Object, false),
    FieldMapping::new("stack_trace", FieldType::Text, false),
];

pub const LOG_SCHEMA_V1: IndexSchema = IndexSchema {
    version: SCHEMA_VERSION,
    shards: 1,
    fields: &[
        FieldMapping::new("time", FieldType::Date, true),
        FieldMapping::new("source", FieldType::Keyword, true),
        FieldMapping::new("level", FieldType::Keyword, true),
        FieldMapping::new("correlation_id", FieldType::Text, true),
        FieldMapping::new("message", FieldType::Text, false),
        FieldMapping::object("error", ERROR_FIELDS),
    ],
};

/// Same as [`LOG_SCHEMA_V1`] with the message text searchable.
pub const LOG_SCHEMA_V1_INDEXED_MESSAGE: IndexSchema = IndexSchema {
    version: SCHEMA_VERSION,
    shards: 1,
    fields: &[
        FieldMapping::new("time", FieldType::Date, true),
        FieldMapping::new("source", FieldType::Keyword, true),
        FieldMapping::new("level", FieldType::Keyword, true),
        FieldMapping::new("correlation_id", FieldType::Text, true),
        FieldMapping::new("message", FieldType::Text, true),
        FieldMapping::object("error", ERROR_FIELDS),
    ],
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All models declared by one application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationSchema {
    models: BTreeMap<String, ModelDefinition>,
}

impl ApplicationSchema {
    /// An application with no models.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a model definition.
    #[must_use]
    pub fn with_model(mut self, name: impl Into<String>, definition: ModelDefinition) -> Self {
        self.models.insert(name.into(), definition);
        self
    }

    /// Looks up a model by name.
    pub fn model(&self, name: &str) -> Option<&ModelDefinition> {
        self.models.get(name)
    }

    /// Storage namespace for a model. Falls back to the model name when the
    /// definition leaves it empty.
    pub fn namespace_of<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.models.get(name).map(|def| {
            if def.namespace.is_empty() {
                name
            } else {
                def.namespace.as_str()
            }
        })
    }

    /// Declared model names.
    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Size of the JSON encoding, used for cache accounting.
    pub fn serialized_size(&self) -> usize {
        serde_json::to_vec(self).map(|bytes| bytes.len()).unwrap_or(0)
    }
}

/// One model's definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    #[serde(default)]
    pub namespace: String,
    #[serde(default, alias = "belongsTo", skip_serializing_if = "Vec::is_empty")]
    pub belongs_to: Vec<BelongsTo>,
    /// Free-form properties the gateway never interprets.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl ModelDefinition {
    /// A root model stored under `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Declares a parent relation.
    #[must_use]
    pub fn belongs_to(mut self, parent_model: impl Into<String>) -> Self {
        self.belongs_to.push(BelongsTo {
            parent_model: parent_model.into(),
        });
        self
    }

    /// Whether this model is a child of any other model.
    pub fn has_parent(&self) -> bool {
        !self.belongs_to.is_empty()
    }

    /// The relation to `parent_model`, if declared.
    pub fn parent_relation(&self, parent_model: &str) -> Option<&BelongsTo> {
        self.belongs_to
            .iter()
            .find(|rel| rel.parent_model == parent_model)
    }

    /// The first declared relation; creation requires its foreign key.
    pub fn primary_parent(&self) -> Option<&BelongsTo> {
        self.belongs_to.first()
    }
}

/// A parent relation declared on a child model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BelongsTo {
    #[serde(alias = "parentModel")]
    pub parent_model: String,
}

impl BelongsTo {
    /// Field carrying the parent id on child objects and in filters
    /// (`event` → `event_id`).
    pub fn foreign_key(&self) -> String {
        format!("{}_id", self.parent_model)
    }
}

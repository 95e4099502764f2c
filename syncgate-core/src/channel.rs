//! Channel resolution.
//!
//! A request's `id`, `model` and `filters` fields are turned into a
//! [`ResolvedChannel`] exactly once. The resolution strategy is a closed
//! [`ChannelTarget`] picked by priority: id, then query, then parent
//! relation, then the whole collection. Everything downstream (registry
//! calls, snapshots, counts) works from that value instead of re-probing the
//! raw filters.

use crate::error::{GatewayError, GatewayResult, PortError};
use crate::ports::{ObjectMap, ObjectStore, QueryTranslator, SearchIndex, SearchQuery};
use crate::request::ObjectRequest;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use syncgate_model::{ApplicationSchema, ModelDefinition};
use syncgate_types::{ApplicationId, ContextId, ObjectId, UserId};
use tracing::debug;

/// A subscription target, expressed in storage namespaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Channel {
    /// One object.
    Object { model: String, id: ObjectId },
    /// A collection, optionally narrowed.
    Collection {
        model: String,
        context: ContextId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<ParentFilter>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<UserId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<Value>,
    },
}

/// A `(parent model, parent id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentFilter {
    pub model: String,
    pub id: ObjectId,
}

/// How the initial contents of a channel are fetched.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelTarget {
    ById(ObjectId),
    /// Raw client query, translated at snapshot time.
    ByQuery(Value),
    /// Parent expressed by model name, as the store expects it.
    ByParent {
        parent: ParentFilter,
        owner: Option<UserId>,
    },
    ByCollection { owner: Option<UserId> },
}

/// Parsed `filters` object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    pub user: Option<UserId>,
    /// Explicit `{name, id}` parent.
    pub parent: Option<ParentFilter>,
    pub query: Option<Value>,
    /// `<parent>_id` keys, validated against the model's relations.
    pub relations: BTreeMap<String, ObjectId>,
}

#[derive(Deserialize)]
struct ParentRef {
    name: String,
    id: ObjectId,
}

impl Filters {
    /// Parses `value` against a model definition. Unknown keys are rejected.
    pub fn parse(value: &Value, definition: &ModelDefinition) -> GatewayResult<Self> {
        let Value::Object(map) = value else {
            return Err(GatewayError::InvalidRequest("Filters must be an object.".into()));
        };

        let mut filters = Filters::default();
        for (key, value) in map.iter().filter(|(_, v)| !v.is_null()) {
            match key.as_str() {
                "user" => filters.user = Some(parse_field(key, value)?),
                "parent" => {
                    let parent: ParentRef = parse_field(key, value)?;
                    filters.parent = Some(ParentFilter {
                        model: parent.name,
                        id: parent.id,
                    });
                }
                "query" => filters.query = Some(value.clone()),
                other => {
                    if !definition.belongs_to.iter().any(|rel| rel.foreign_key() == other) {
                        return Err(GatewayError::InvalidRequest(format!(
                            "unknown filter '{other}'"
                        )));
                    }
                    filters.relations.insert(other.to_string(), parse_field(key, value)?);
                }
            }
        }
        Ok(filters)
    }
}

fn parse_field<T: DeserializeOwned>(key: &str, value: &Value) -> GatewayResult<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid filter '{key}': {e}")))
}

/// A channel resolved against the application schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChannel {
    pub model: String,
    pub context: ContextId,
    pub target: ChannelTarget,
    /// The registry-facing channel.
    pub channel: Channel,
}

/// The initial payload delivered to a subscriber.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub objects: ObjectMap,
    /// Total objects matching the channel; can exceed `objects.len()`.
    pub count: u64,
}

/// Resolves channels and fetches their snapshots.
pub struct ChannelResolver {
    store: Arc<dyn ObjectStore>,
    translator: Arc<dyn QueryTranslator>,
    search: Arc<dyn SearchIndex>,
    parent_snapshot_limit: usize,
    collection_snapshot_limit: Option<usize>,
}

impl ChannelResolver {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        translator: Arc<dyn QueryTranslator>,
        search: Arc<dyn SearchIndex>,
        parent_snapshot_limit: usize,
        collection_snapshot_limit: Option<usize>,
    ) -> Self {
        Self {
            store,
            translator,
            search,
            parent_snapshot_limit,
            collection_snapshot_limit,
        }
    }

    /// Builds the channel targeted by `request`. Pure: no collaborator is
    /// contacted, and every failure is a client error.
    pub fn resolve(
        &self,
        schema: &ApplicationSchema,
        request: &ObjectRequest,
    ) -> GatewayResult<ResolvedChannel> {
        let model = request.model()?;
        let context = request.context()?;
        let definition = schema
            .model(model)
            .ok_or_else(|| GatewayError::InvalidRequest(format!("unknown model '{model}'")))?;
        let model_namespace = namespace_for(schema, model)?;

        let filters = match &request.filters {
            Some(value) if !value.is_null() => Filters::parse(value, definition)?,
            _ => Filters::default(),
        };
        let parent = select_parent(model, definition, &filters)?;

        let target = if let Some(id) = request.optional_id() {
            ChannelTarget::ById(id.clone())
        } else if let Some(query) = &filters.query {
            ChannelTarget::ByQuery(query.clone())
        } else if let Some(parent) = &parent {
            ChannelTarget::ByParent {
                parent: parent.clone(),
                owner: filters.user.clone(),
            }
        } else {
            ChannelTarget::ByCollection {
                owner: filters.user.clone(),
            }
        };

        let channel = match &target {
            ChannelTarget::ById(id) => Channel::Object {
                model: model_namespace,
                id: id.clone(),
            },
            _ => Channel::Collection {
                model: model_namespace,
                context: context.clone(),
                parent: parent
                    .map(|p| {
                        Ok::<_, GatewayError>(ParentFilter {
                            model: namespace_for(schema, &p.model)?,
                            id: p.id,
                        })
                    })
                    .transpose()?,
                user: filters.user,
                query: filters.query,
            },
        };

        Ok(ResolvedChannel {
            model: model.to_string(),
            context: context.clone(),
            target,
            channel,
        })
    }

    /// Fetches the initial contents of `resolved` and counts its matches.
    pub async fn snapshot(
        &self,
        application_id: &ApplicationId,
        resolved: &ResolvedChannel,
    ) -> GatewayResult<Snapshot> {
        let model = resolved.model.as_str();
        let context = &resolved.context;

        match &resolved.target {
            ChannelTarget::ById(id) => {
                let object = self
                    .store
                    .get_by_id(application_id, model, id, context)
                    .await
                    .map_err(|e| match e {
                        PortError::NotFound(_) => GatewayError::ObjectNotFound(id.to_string()),
                        other => GatewayError::collaborator(other),
                    })?;
                debug!(model, %id, "snapshot by id");
                Ok(Snapshot {
                    objects: ObjectMap::from([(id.clone(), object)]),
                    count: 1,
                })
            }
            ChannelTarget::ByQuery(query) => {
                let filter = self.translator.translate(query).await?;
                let search = SearchQuery {
                    model: model.to_string(),
                    context: context.clone(),
                    filter,
                };
                let page = self
                    .search
                    .search(&search)
                    .await
                    .map_err(GatewayError::collaborator)?;
                debug!(model, total = page.total, hits = page.hits.len(), "snapshot by query");
                Ok(Snapshot {
                    objects: page.hits.into_iter().map(|hit| (hit.id, hit.doc)).collect(),
                    count: page.total,
                })
            }
            ChannelTarget::ByParent { parent, owner } => {
                let ids = self
                    .store
                    .lookup_by_parent(application_id, model, context, parent, owner.as_ref())
                    .await
                    .map_err(GatewayError::collaborator)?;
                let head = &ids[..ids.len().min(self.parent_snapshot_limit)];
                let objects = if head.is_empty() {
                    ObjectMap::new()
                } else {
                    self.store
                        .multi_get(application_id, model, head, context)
                        .await
                        .map_err(GatewayError::collaborator)?
                };
                debug!(
                    model,
                    parent = %parent.model,
                    matched = ids.len(),
                    delivered = objects.len(),
                    "snapshot by parent"
                );
                Ok(Snapshot {
                    objects,
                    count: ids.len() as u64,
                })
            }
            ChannelTarget::ByCollection { owner } => {
                let all = self
                    .store
                    .get_all(application_id, model, context, owner.as_ref())
                    .await
                    .map_err(GatewayError::collaborator)?;
                let count = all.len() as u64;
                let objects = match self.collection_snapshot_limit {
                    Some(limit) => all.into_iter().take(limit).collect(),
                    None => all,
                };
                debug!(model, count, delivered = objects.len(), "snapshot of collection");
                Ok(Snapshot { objects, count })
            }
        }
    }
}

fn namespace_for(schema: &ApplicationSchema, model: &str) -> GatewayResult<String> {
    schema
        .namespace_of(model)
        .map(str::to_string)
        .ok_or_else(|| GatewayError::InvalidRequest(format!("unknown model '{model}'")))
}

/// Picks the parent relation narrowing the channel: an explicit
/// `filters.parent`, else the first declared relation whose `<parent>_id`
/// key is present.
fn select_parent(
    model: &str,
    definition: &ModelDefinition,
    filters: &Filters,
) -> GatewayResult<Option<ParentFilter>> {
    if let Some(parent) = &filters.parent {
        if definition.parent_relation(&parent.model).is_none() {
            return Err(GatewayError::InvalidRequest(format!(
                "model '{model}' has no parent relation '{}'",
                parent.model
            )));
        }
        return Ok(Some(parent.clone()));
    }

    Ok(definition.belongs_to.iter().find_map(|rel| {
        filters.relations.get(&rel.foreign_key()).map(|id| ParentFilter {
            model: rel.parent_model.clone(),
            id: id.clone(),
        })
    }))
}

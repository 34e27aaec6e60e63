//! Sample `docs` and `tags` services served by the `actionhub` binary and
//! exercised by the transport tests.

use std::sync::Arc;

use actionhub_core::{entity_id, Entity, HttpMethod, InvocationError, PopulationSchema, StorageValue};
use serde_json::{json, Value};

use crate::service::actions::fetch_model;
use crate::service::{
    ActionMeta, ActionOutput, ActionSpec, InvocationContext, Permission, ServiceDescriptor,
    ServiceFactory, ServiceOptions, ServiceRegistry,
};
use crate::storage::MemoryStore;
use crate::traits::DocumentStore;

/// Documents owned by a user, each referencing tags by id.
///
/// # Errors
///
/// Returns an error if the declaration is invalid.
pub fn docs_service() -> anyhow::Result<ServiceDescriptor> {
    ServiceDescriptor::builder("docs")
        .options(ServiceOptions {
            default_fields: Some(vec!["id".to_string(), "title".to_string()]),
            populate: PopulationSchema::new().with("tags", "tags.getByIds"),
            ..ServiceOptions::default()
        })
        .action(
            "get",
            ActionSpec::full(fetch_model(), ActionMeta::new().need_model().query("doc")),
        )
        .action(
            "rename",
            ActionSpec::full(
                rename,
                ActionMeta::new()
                    .permission(Permission::Owner)
                    .default_method(HttpMethod::Put)
                    .need_model()
                    .mutation("renameDoc"),
            ),
        )
        .action(
            "whoami",
            ActionSpec::full(
                |ctx: Arc<InvocationContext>| async move {
                    Ok::<_, InvocationError>(ActionOutput::Final(json!({
                        "id": ctx.caller.id,
                        "roles": ctx.caller.roles,
                    })))
                },
                ActionMeta::new().permission(Permission::Authenticated),
            ),
        )
        .build()
}

/// Tags, only reachable through population and the versioned `get`.
///
/// # Errors
///
/// Returns an error if the declaration is invalid.
pub fn tags_service() -> anyhow::Result<ServiceDescriptor> {
    ServiceDescriptor::builder("tags")
        .version(2)
        .options(ServiceOptions {
            default_fields: Some(vec!["id".to_string(), "label".to_string()]),
            ..ServiceOptions::default()
        })
        .action(
            "get",
            ActionSpec::full(fetch_model(), ActionMeta::new().need_model()),
        )
        .action(
            "getByIds",
            ActionSpec::full(fetch_model(), ActionMeta::new().need_model().unpublished()),
        )
        .build()
}

async fn rename(ctx: Arc<InvocationContext>) -> Result<ActionOutput, InvocationError> {
    let Some(mut entity) = ctx.entity().cloned() else {
        return Err(InvocationError::invalid_identifier(
            "rename takes a single document",
        ));
    };
    let Some(title) = ctx.param("title").and_then(Value::as_str) else {
        return Err(InvocationError::ActionFailed {
            status: 422,
            message: "title is required".to_string(),
        });
    };
    entity.insert("title".to_string(), Value::String(title.to_string()));

    let store = ctx
        .service
        .store()
        .ok_or_else(|| anyhow::anyhow!("no store bound to {}", ctx.service.name()))?;
    let key = entity_id(&entity)
        .ok_or_else(|| anyhow::anyhow!("resolved document has no identifier"))?;
    store
        .store(ctx.service.collection(), &key, &StorageValue::from_entity(&entity)?)
        .await?;

    Ok(ActionOutput::Raw(Value::Object(entity)))
}

/// Factories for every sample service, in registration order.
#[must_use]
pub fn factories() -> Vec<ServiceFactory> {
    vec![Box::new(docs_service), Box::new(tags_service)]
}

/// Store holding two documents and three tags.
///
/// # Errors
///
/// Returns an error if a seed row cannot be encoded.
pub fn seeded_store() -> anyhow::Result<MemoryStore> {
    let store = MemoryStore::new();
    let rows = [
        (
            "docs",
            json!({"id": "a", "owner": "u1", "title": "A", "body": "alpha", "tags": ["t1", "t2"]}),
        ),
        (
            "docs",
            json!({"id": "b", "owner": "u2", "title": "B", "body": "beta", "tags": ["t2", "t3"]}),
        ),
        ("tags", json!({"id": "t1", "label": "one", "weight": 1})),
        ("tags", json!({"id": "t2", "label": "two", "weight": 2})),
        ("tags", json!({"id": "t3", "label": "three", "weight": 3})),
    ];
    for (collection, row) in rows {
        let entity: Entity = serde_json::from_value(row)?;
        store.insert_entity(collection, &entity)?;
    }
    Ok(store)
}

/// Registry of the sample services over a freshly seeded store.
///
/// # Errors
///
/// Returns an error if seeding or loading fails.
pub fn registry() -> anyhow::Result<ServiceRegistry> {
    let store: Arc<dyn DocumentStore> = Arc::new(seeded_store()?);
    Ok(ServiceRegistry::load(factories(), store)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_services_build() {
        let docs = docs_service().unwrap();
        assert_eq!(docs.actions().count(), 3);
        assert!(docs.action("rename").unwrap().need_model);

        let tags = tags_service().unwrap();
        assert_eq!(tags.version(), Some(2));
        assert!(!tags.action("getByIds").unwrap().publish);
    }

    #[test]
    fn seeded_store_has_rows() {
        let store = seeded_store().unwrap();
        assert_eq!(store.len("docs"), 2);
        assert_eq!(store.len("tags"), 3);
    }

    #[test]
    fn registry_loads_in_order() {
        let registry = registry().unwrap();
        let names: Vec<String> = registry
            .services()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["docs", "tags"]);
    }
}

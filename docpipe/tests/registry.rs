use async_trait::async_trait;
use bson::{Bson, doc};
use docpipe::{
    memory::{InMemoryCache, InMemoryStore, InMemoryStoreBuilder},
    prelude::*,
};
use std::sync::Arc;

/// Writes an audit record into the `audit` peer after every create.
struct AuditTrail;

#[async_trait]
impl<B: StoreBackend + 'static> Hooks<B> for AuditTrail {
    async fn after_create(&self, doc: &bson::Document, ctx: &HookContext<'_, B>) -> CollectionResult<()> {
        if let Some(audit) = ctx.collection.peer("audit").await {
            let target = doc.get("_id").cloned().unwrap_or(Bson::Null);
            let cache_key = ctx.collection.cache_key(&target);

            ctx.collection.cache().set(&cache_key, doc.clone()).await;
            audit
                .create(doc! { "event": "create", "target": target }, ctx.context)
                .await?;
        }

        Ok(())
    }
}

#[tokio::test]
async fn registered_collections_reach_each_other() {
    let mut collections = Collections::connect(InMemoryStoreBuilder::default())
        .await
        .unwrap();

    let cache = InMemoryCache::new();
    let contacts = collections
        .builder("contacts")
        .with_hooks(AuditTrail)
        .with_cache(cache.clone())
        .build()
        .unwrap();
    collections.register(contacts.clone());
    collections
        .register_config(CollectionConfig::from_json(r#"{ "name": "audit", "logging": false }"#).unwrap())
        .unwrap();
    collections.wire().await;

    assert_eq!(collections.names().collect::<Vec<_>>(), vec!["audit", "contacts"]);
    assert_eq!(contacts.peer_names().await, vec!["audit".to_string()]);

    let jane = contacts
        .create(doc! { "name": "Jane" }, &Context::new().with_user(doc! { "_id": "u1" }))
        .await
        .unwrap()
        .unwrap();
    let id = jane.get("_id").cloned().unwrap();

    let audit = collections.get("audit").unwrap();
    assert!(!audit.is_logging());
    audit.enable_log();
    assert!(collections.get("audit").unwrap().is_logging());
    audit.disable_log();

    let entries = audit.search(doc! { "target": id.clone() }, doc! {}, &Context::new()).await.unwrap();
    assert_eq!(entries.count, 1);
    assert_eq!(entries.data[0].get_str("owner").unwrap(), "u1");

    let cached = cache.get(&contacts.cache_key(&id)).await.unwrap();
    assert_eq!(cached.get_str("name").unwrap(), "Jane");
}

#[tokio::test]
async fn configurations_are_validated() {
    let mut collections = Collections::new(Arc::new(InMemoryStore::new()));

    assert!(matches!(
        CollectionConfig::from_json(r#"{ "name": "contacts", "schema": [{ "name": "a", "cast": "nickname" }] }"#),
        Err(CollectionError::InvalidSchema(_))
    ));

    let duplicate = CollectionConfig::from_json(
        r#"{ "name": "contacts", "schema": [{ "name": "email" }, { "name": "email" }] }"#,
    )
    .unwrap();
    assert!(matches!(collections.register_config(duplicate), Err(CollectionError::InvalidSchema(_))));

    assert!(matches!(
        collections.register_config(CollectionConfig::new("")),
        Err(CollectionError::InvalidSchema(_))
    ));
    assert!(collections.is_empty());
}

#[tokio::test]
async fn configured_schema_applies_on_create() {
    let backend = Arc::new(InMemoryStore::new());
    let config = CollectionConfig::from_json(
        r#"{
            "name": "people",
            "schema": [
                { "name": "email", "required": true, "requiredException": "phone" },
                { "name": "phone", "cast": "phone" },
                { "name": "birthday", "type": "date" }
            ]
        }"#,
    )
    .unwrap();

    let people = CollectionBuilder::from_config(config, Arc::clone(&backend))
        .build()
        .unwrap();

    let created = people
        .create(doc! { "phone": "+44 20 7946 0958", "birthday": "1990-04-01" }, &Context::new())
        .await
        .unwrap()
        .unwrap();

    assert!(!created.contains_key("email"));
    assert_eq!(created.get_str("phone").unwrap(), "+442079460958");
    assert_eq!(
        created.get_datetime("birthday").unwrap().timestamp_millis(),
        638_928_000_000
    );
}

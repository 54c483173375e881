use async_trait::async_trait;
use bson::{Bson, Document, doc};
use docpipe::{memory::InMemoryStore, prelude::*};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn contacts(backend: &Arc<InMemoryStore>) -> Collection<InMemoryStore> {
    Collection::builder("contacts", Arc::clone(backend))
        .with_field(FieldSpec::new("firstName").required().cast(Cast::FirstName))
        .with_field(FieldSpec::new("lastName").required().cast(Cast::LastName))
        .with_field(FieldSpec::new("phone").cast(Cast::Phone))
        .build()
        .unwrap()
}

fn principal() -> Context {
    Context::new().with_user(doc! { "_id": "u1" })
}

#[tokio::test]
async fn create_coerces_stamps_and_aliases() {
    init_tracing();

    let backend = Arc::new(InMemoryStore::new());
    let contacts = contacts(&backend);

    let jane = contacts
        .create(doc! { "name": "Jane Doe", "phone": "(415) 555-2671" }, &principal())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(jane.get_str("firstName").unwrap(), "Jane");
    assert_eq!(jane.get_str("lastName").unwrap(), "Doe");
    assert_eq!(jane.get_str("phone").unwrap(), "+14155552671");
    assert_eq!(jane.get_str("owner").unwrap(), "u1");
    assert!(jane.get_datetime("createdAt").is_ok());
    assert!(jane.get("_id").is_some());
    assert_eq!(jane.get("id"), jane.get("_id"));
    assert_eq!(backend.write_count(), 1);

    let stored = backend
        .find_one("contacts", doc! {}, None)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.contains_key("id"));
}

#[tokio::test]
async fn create_without_principal_has_no_owner() {
    let backend = Arc::new(InMemoryStore::new());
    let contacts = contacts(&backend);

    let created = contacts
        .create(doc! { "firstName": "Ada", "lastName": "Lovelace" }, &Context::new())
        .await
        .unwrap()
        .unwrap();

    assert!(!created.contains_key("owner"));
}

#[tokio::test]
async fn save_writes_only_the_diff() {
    init_tracing();

    let backend = Arc::new(InMemoryStore::new());
    let contacts = contacts(&backend);
    let context = principal();

    let jane = contacts
        .create(doc! { "name": "Jane Doe", "tags": ["a", "b"] }, &context)
        .await
        .unwrap()
        .unwrap();
    let id = jane.get("_id").cloned().unwrap();

    let saved = contacts
        .save(
            id.clone(),
            doc! { "address": { "city": "Oslo" }, "tags": ["c"], "nickname": "", "id": "ignored" },
            &context,
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(saved.get_document("address").unwrap(), &doc! { "city": "Oslo" });
    assert_eq!(saved.get_array("tags").unwrap(), &vec![Bson::String("c".into())]);
    assert_eq!(saved.get_str("firstName").unwrap(), "Jane");
    assert!(saved.get_datetime("updatedAt").is_ok());
    assert!(!saved.contains_key("nickname"));
    assert_eq!(saved.get("_id"), Some(&id));
}

#[tokio::test]
async fn save_without_changes_touches_nothing() {
    let backend = Arc::new(InMemoryStore::new());
    let contacts = contacts(&backend);
    let context = principal();

    let jane = contacts
        .create(doc! { "name": "Jane Doe" }, &context)
        .await
        .unwrap()
        .unwrap();
    let id = jane.get("_id").cloned().unwrap();
    let writes = backend.write_count();

    assert_eq!(contacts.save(id.clone(), doc! {}, &context).await.unwrap(), None);
    assert_eq!(
        contacts
            .save(id.clone(), doc! { "_id": "other", "id": "other" }, &context)
            .await
            .unwrap(),
        None
    );
    assert_eq!(contacts.save(doc! {}, doc! { "a": 1 }, &context).await.unwrap(), None);
    assert_eq!(
        contacts
            .save(id, doc! { "nickname": "" }, &context)
            .await
            .unwrap(),
        None
    );
    assert_eq!(backend.write_count(), writes);
}

#[tokio::test]
async fn remove_returns_the_deleted_document() {
    let backend = Arc::new(InMemoryStore::new());
    let contacts = contacts(&backend);
    let context = principal();

    let writes = backend.write_count();
    assert_eq!(contacts.remove("missing", &context).await.unwrap(), None);
    assert_eq!(contacts.remove(doc! {}, &context).await.unwrap(), None);
    assert_eq!(backend.write_count(), writes);

    let jane = contacts
        .create(doc! { "name": "Jane Doe", "email": "jane@example.com" }, &context)
        .await
        .unwrap()
        .unwrap();

    let removed = contacts
        .remove(doc! { "email": "jane@example.com" }, &context)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(removed.get("_id"), jane.get("_id"));
    assert_eq!(contacts.get(jane.get("_id").cloned().unwrap(), &context).await.unwrap(), None);
}

#[tokio::test]
async fn remove_many_skips_hooks_and_counts() {
    let backend = Arc::new(InMemoryStore::new());
    let contacts = contacts(&backend);

    backend
        .insert_many(
            "contacts",
            vec![doc! { "team": "red" }, doc! { "team": "red" }, doc! { "team": "blue" }],
        )
        .await
        .unwrap();

    assert_eq!(contacts.remove_many(doc! { "team": "red" }).await.unwrap(), 2);
    assert_eq!(backend.estimated_document_count("contacts").await.unwrap(), 1);
}

#[tokio::test]
async fn search_normalizes_and_pages() {
    let backend = Arc::new(InMemoryStore::new());
    let contacts = contacts(&backend);

    backend
        .insert_many("contacts", (0..25).map(|n| doc! { "n": n }).collect())
        .await
        .unwrap();

    let page = contacts
        .search(doc! { "limit": 10, "skip": "20", "sort": ["n", 1] }, doc! {}, &Context::new())
        .await
        .unwrap();

    assert_eq!(page.count, 25);
    assert_eq!(page.pages, 3);
    assert_eq!(page.limit, 10);
    assert_eq!(page.skip, 20);
    assert_eq!(page.sort, doc! { "n": 1 });
    assert_eq!(page.data.len(), 5);
    assert_eq!(page.data[0].get_i32("n").unwrap(), 20);
    assert_eq!(page.data[0].get("id"), page.data[0].get("_id"));
    assert!(!page.has_next());

    let filtered = contacts
        .search(doc! { "n": { "gte": 10, "$lt": 12 } }, doc! {}, &Context::new())
        .await
        .unwrap();

    assert_eq!(filtered.count, 2);
    assert_eq!(filtered.pages, 0);

    let scoped = contacts
        .search(doc! { "n": 1 }, doc! { "n": 5 }, &Context::new())
        .await
        .unwrap();

    assert_eq!(scoped.count, 1);
    assert_eq!(scoped.data[0].get_i32("n").unwrap(), 5);
}

#[tokio::test]
async fn search_can_target_another_collection() {
    let backend = Arc::new(InMemoryStore::new());
    let contacts = contacts(&backend);

    backend
        .insert_one("archive", doc! { "name": "Old" })
        .await
        .unwrap();

    let page = contacts
        .search(doc! {}, doc! {}, &Context::new().with_collection("archive"))
        .await
        .unwrap();

    assert_eq!(page.count, 1);
    assert_eq!(page.data[0].get_str("name").unwrap(), "Old");
}

#[tokio::test]
async fn copy_drops_identity_and_stamps() {
    let backend = Arc::new(InMemoryStore::new());
    let contacts = contacts(&backend);

    let jane = contacts
        .create(doc! { "name": "Jane Doe" }, &principal())
        .await
        .unwrap()
        .unwrap();

    let copied = contacts.copy(jane.get("_id").cloned().unwrap()).await.unwrap();
    assert_eq!(copied, doc! { "firstName": "Jane", "lastName": "Doe", "name": "Jane Doe" });

    match contacts.copy("missing").await {
        Err(CollectionError::CopySourceNotFound(id, collection)) => {
            assert_eq!(id, "missing");
            assert_eq!(collection, "contacts");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[derive(Default, Clone)]
struct Recorder {
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl Recorder {
    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn take(&self) -> Vec<&'static str> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

#[async_trait]
impl<B: StoreBackend + 'static> Hooks<B> for Recorder {
    async fn before(&self, data: Document, _ctx: &HookContext<'_, B>) -> CollectionResult<Document> {
        self.record("before");
        Ok(data)
    }

    async fn before_create(&self, mut data: Document, _ctx: &HookContext<'_, B>) -> CollectionResult<Document> {
        self.record("before_create");
        data.insert("slug", "from-hook");
        Ok(data)
    }

    async fn before_save(&self, data: Document, ctx: &HookContext<'_, B>) -> CollectionResult<Document> {
        self.record("before_save");
        assert!(ctx.doc.is_some());
        assert!(ctx.selector.is_some());
        Ok(data)
    }

    async fn before_remove(&self, _doc: Document, _ctx: &HookContext<'_, B>) -> CollectionResult<Document> {
        self.record("before_remove");
        Ok(doc! { "_id": "not-the-target" })
    }

    async fn after(&self, _doc: Option<&Document>, ctx: &HookContext<'_, B>) -> CollectionResult<()> {
        self.record("after");
        assert!(ctx.data.is_some());
        Ok(())
    }

    async fn after_create(&self, doc: &Document, _ctx: &HookContext<'_, B>) -> CollectionResult<()> {
        self.record("after_create");
        assert_eq!(doc.get_str("slug").unwrap(), "from-hook");
        Ok(())
    }

    async fn after_save(&self, _doc: Option<&Document>, _ctx: &HookContext<'_, B>) -> CollectionResult<()> {
        self.record("after_save");
        Ok(())
    }

    async fn after_remove(&self, doc: Option<&Document>, _ctx: &HookContext<'_, B>) -> CollectionResult<()> {
        self.record("after_remove");
        assert!(doc.is_some());
        Ok(())
    }
}

#[tokio::test]
async fn hooks_run_in_pipeline_order() {
    init_tracing();

    let backend = Arc::new(InMemoryStore::new());
    let recorder = Recorder::default();
    let notes = Collection::builder("notes", Arc::clone(&backend))
        .with_hooks(recorder.clone())
        .build()
        .unwrap();
    let context = Context::new();

    let note = notes
        .create(doc! { "text": "hello" }, &context)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recorder.take(), vec!["before", "before_create", "after", "after_create"]);

    let id = note.get("_id").cloned().unwrap();
    notes
        .save(id.clone(), doc! { "text": "bye" }, &context)
        .await
        .unwrap();
    assert_eq!(recorder.take(), vec!["before", "before_save", "after", "after_save"]);

    let removed = notes.remove(id, &context).await.unwrap();
    assert_eq!(recorder.take(), vec!["before_remove", "after_remove"]);
    assert_eq!(removed.unwrap().get_str("text").unwrap(), "bye");
}

struct Reject;

#[async_trait]
impl<B: StoreBackend + 'static> Hooks<B> for Reject {
    async fn before_create(&self, _data: Document, _ctx: &HookContext<'_, B>) -> CollectionResult<Document> {
        Err(CollectionError::InvalidDocument("rejected".into()))
    }
}

#[tokio::test]
async fn hook_errors_abort_the_write() {
    let backend = Arc::new(InMemoryStore::new());
    let notes = Collection::builder("notes", Arc::clone(&backend))
        .with_hooks(Reject)
        .build()
        .unwrap();

    let result = notes.create(doc! { "text": "hello" }, &Context::new()).await;

    assert!(matches!(result, Err(CollectionError::InvalidDocument(_))));
    assert_eq!(backend.write_count(), 0);
}

struct Summary;

#[async_trait]
impl Resolver for Summary {
    async fn resolve(&self, document: Document, _context: &Context) -> CollectionResult<Document> {
        let n = document.get_i32("n").unwrap_or_default();

        // later documents finish first
        for _ in 0..(10 - n) {
            tokio::task::yield_now().await;
        }

        Ok(doc! { "n": n, "aliased": document.contains_key("id") })
    }
}

#[tokio::test]
async fn resolvers_replace_aliasing_and_keep_order() {
    let backend = Arc::new(InMemoryStore::new());
    let counters = Collection::builder("counters", Arc::clone(&backend))
        .build()
        .unwrap();

    backend
        .insert_many("counters", (0..10).map(|n| doc! { "_id": n, "n": n }).collect())
        .await
        .unwrap();

    let context = Context::new().with_resolver(Summary);

    let page = counters
        .search(doc! { "sort": { "n": 1 } }, doc! {}, &context)
        .await
        .unwrap();
    let order = page
        .data
        .iter()
        .map(|document| document.get_i32("n").unwrap())
        .collect::<Vec<_>>();
    assert_eq!(order, (0..10).collect::<Vec<_>>());

    let one = counters.get(Bson::Int32(3), &context).await.unwrap().unwrap();
    assert_eq!(one, doc! { "n": 3, "aliased": true });
}

#[tokio::test]
async fn get_applies_the_context_projection() {
    let backend = Arc::new(InMemoryStore::new());
    let contacts = contacts(&backend);

    let jane = contacts
        .create(doc! { "name": "Jane Doe" }, &principal())
        .await
        .unwrap()
        .unwrap();

    let context = Context::new().with_options(OperationOptions {
        projection: Some(QueryNormalizer::format_fields("firstName")),
        ..Default::default()
    });
    let projected = contacts
        .get(jane.get("_id").cloned().unwrap(), &context)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(projected.keys().collect::<Vec<_>>(), vec!["_id", "firstName", "id"]);
}

#[tokio::test]
async fn peers_are_held_weakly() {
    let backend = Arc::new(InMemoryStore::new());
    let first = Collection::builder("first", Arc::clone(&backend)).build().unwrap();
    let second = Collection::builder("second", Arc::clone(&backend)).build().unwrap();

    first.use_collections([second.clone()]).await;
    assert_eq!(first.peer("second").await.unwrap().name(), "second");
    assert_eq!(first.peer_names().await, vec!["second".to_string()]);

    drop(second);
    assert!(first.peer("second").await.is_none());
    assert!(first.peer_names().await.is_empty());
}

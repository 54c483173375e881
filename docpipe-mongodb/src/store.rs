use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection, Database, IndexModel,
    options::{
        ClientOptions, FindOneOptions, FindOptions as MongoFindOptions, IndexOptions,
        ReturnDocument,
    },
};
use tracing::debug;

use docpipe_core::{
    backend::{FindOptions, IndexSpec, StoreBackend, StoreBackendBuilder, UpdateOutcome},
    error::{CollectionError, CollectionResult},
};

fn backend(error: mongodb::error::Error) -> CollectionError {
    CollectionError::Backend(error.to_string())
}

#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    pub fn database(&self) -> Database {
        self.client.database(&self.database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.database().collection(collection_name)
    }

    async fn collection_exists(&self, collection: &str) -> CollectionResult<bool> {
        Ok(!self
            .database()
            .list_collection_names()
            .filter(doc! { "name": collection })
            .await
            .map_err(backend)?
            .is_empty())
    }

    fn outcome(result: mongodb::results::UpdateResult) -> UpdateOutcome {
        UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        }
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn find(&self, collection: &str, selector: Document, options: FindOptions) -> CollectionResult<Vec<Document>> {
        let mut find_options = MongoFindOptions::default();

        find_options.sort = options.sort.filter(|sort| !sort.is_empty());
        find_options.skip = options.skip.filter(|skip| *skip > 0);
        find_options.limit = options
            .limit
            .filter(|limit| *limit > 0)
            .and_then(|limit| i64::try_from(limit).ok());
        find_options.projection = options.projection;

        self.get_collection(collection)
            .find(selector)
            .with_options(find_options)
            .await
            .map_err(backend)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend)
    }

    async fn find_one(
        &self,
        collection: &str,
        selector: Document,
        projection: Option<Document>,
    ) -> CollectionResult<Option<Document>> {
        let mut options = FindOneOptions::default();
        options.projection = projection;

        self.get_collection(collection)
            .find_one(selector)
            .with_options(options)
            .await
            .map_err(backend)
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        selector: Document,
        update: Document,
    ) -> CollectionResult<Option<Document>> {
        self.get_collection(collection)
            .find_one_and_update(selector, update)
            .return_document(ReturnDocument::After)
            .await
            .map_err(backend)
    }

    async fn find_one_and_delete(&self, collection: &str, selector: Document) -> CollectionResult<Option<Document>> {
        self.get_collection(collection)
            .find_one_and_delete(selector)
            .await
            .map_err(backend)
    }

    async fn find_one_and_replace(
        &self,
        collection: &str,
        selector: Document,
        replacement: Document,
    ) -> CollectionResult<Option<Document>> {
        self.get_collection(collection)
            .find_one_and_replace(selector, replacement)
            .return_document(ReturnDocument::After)
            .await
            .map_err(backend)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> CollectionResult<Bson> {
        Ok(self
            .get_collection(collection)
            .insert_one(document)
            .await
            .map_err(backend)?
            .inserted_id)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> CollectionResult<Vec<Bson>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut inserted = self
            .get_collection(collection)
            .insert_many(documents)
            .await
            .map_err(backend)?
            .inserted_ids
            .into_iter()
            .collect::<Vec<_>>();

        inserted.sort_by_key(|(position, _)| *position);

        Ok(inserted.into_iter().map(|(_, id)| id).collect())
    }

    async fn replace_one(
        &self,
        collection: &str,
        selector: Document,
        replacement: Document,
    ) -> CollectionResult<UpdateOutcome> {
        self.get_collection(collection)
            .replace_one(selector, replacement)
            .await
            .map(Self::outcome)
            .map_err(backend)
    }

    async fn update_one(&self, collection: &str, selector: Document, update: Document) -> CollectionResult<UpdateOutcome> {
        self.get_collection(collection)
            .update_one(selector, update)
            .await
            .map(Self::outcome)
            .map_err(backend)
    }

    async fn update_many(&self, collection: &str, selector: Document, update: Document) -> CollectionResult<UpdateOutcome> {
        self.get_collection(collection)
            .update_many(selector, update)
            .await
            .map(Self::outcome)
            .map_err(backend)
    }

    async fn delete_one(&self, collection: &str, selector: Document) -> CollectionResult<u64> {
        Ok(self
            .get_collection(collection)
            .delete_one(selector)
            .await
            .map_err(backend)?
            .deleted_count)
    }

    async fn delete_many(&self, collection: &str, selector: Document) -> CollectionResult<u64> {
        Ok(self
            .get_collection(collection)
            .delete_many(selector)
            .await
            .map_err(backend)?
            .deleted_count)
    }

    async fn count_documents(&self, collection: &str, selector: Document) -> CollectionResult<u64> {
        self.get_collection(collection)
            .count_documents(selector)
            .await
            .map_err(backend)
    }

    async fn estimated_document_count(&self, collection: &str) -> CollectionResult<u64> {
        self.get_collection(collection)
            .estimated_document_count()
            .await
            .map_err(backend)
    }

    async fn distinct(&self, collection: &str, field: &str, selector: Document) -> CollectionResult<Vec<Bson>> {
        self.get_collection(collection)
            .distinct(field, selector)
            .await
            .map_err(backend)
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> CollectionResult<Vec<Document>> {
        self.get_collection(collection)
            .aggregate(pipeline)
            .await
            .map_err(backend)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend)
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> CollectionResult<String> {
        let name = index.resolved_name();

        Ok(self
            .get_collection(collection)
            .create_index(
                IndexModel::builder()
                .keys(index.keys)
                .options(
                    IndexOptions::builder()
                    .name(name)
                    .unique(index.unique)
                    .build()
                )
                .build()
            )
            .await
            .map_err(backend)?
            .index_name)
    }

    async fn list_indexes(&self, collection: &str) -> CollectionResult<Vec<Document>> {
        Ok(self
            .get_collection(collection)
            .list_indexes()
            .await
            .map_err(backend)?
            .try_collect::<Vec<IndexModel>>()
            .await
            .map_err(backend)?
            .into_iter()
            .map(|model| {
                let options = model.options.unwrap_or_default();
                let mut description = doc! {
                    "name": options.name.unwrap_or_default(),
                    "key": model.keys,
                };
                if options.unique == Some(true) {
                    description.insert("unique", true);
                }
                description
            })
            .collect())
    }

    async fn drop_index(&self, collection: &str, name: &str) -> CollectionResult<()> {
        self.get_collection(collection)
            .drop_index(name)
            .await
            .map_err(backend)
    }

    async fn drop_indexes(&self, collection: &str) -> CollectionResult<()> {
        self.get_collection(collection)
            .drop_indexes()
            .await
            .map_err(backend)
    }

    async fn re_index(&self, collection: &str) -> CollectionResult<Document> {
        self.database()
            .run_command(doc! { "reIndex": collection })
            .await
            .map_err(backend)
    }

    async fn rename(&self, collection: &str, new_name: &str) -> CollectionResult<()> {
        self.client
            .database("admin")
            .run_command(doc! {
                "renameCollection": format!("{}.{collection}", self.database),
                "to": format!("{}.{new_name}", self.database),
            })
            .await
            .map_err(backend)?;

        Ok(())
    }

    async fn stats(&self, collection: &str) -> CollectionResult<Document> {
        self.database()
            .run_command(doc! { "collStats": collection })
            .await
            .map_err(backend)
    }

    async fn options(&self, collection: &str) -> CollectionResult<Document> {
        let listing = self
            .database()
            .run_command(doc! { "listCollections": 1, "filter": { "name": collection } })
            .await
            .map_err(backend)?;

        Ok(listing
            .get_document("cursor")
            .ok()
            .and_then(|cursor| cursor.get_array("firstBatch").ok())
            .and_then(|batch| batch.first())
            .and_then(Bson::as_document)
            .and_then(|spec| spec.get_document("options").ok())
            .cloned()
            .unwrap_or_default())
    }

    async fn drop(&self, collection: &str) -> CollectionResult<bool> {
        if !self.collection_exists(collection).await? {
            return Ok(false);
        }

        self.get_collection(collection)
            .drop()
            .await
            .map_err(backend)?;

        Ok(true)
    }

    async fn shutdown(self) -> CollectionResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> CollectionResult<Self::Backend> {
        let options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| CollectionError::Initialization(e.to_string()))?;

        debug!(database = %self.database, hosts = options.hosts.len(), "connecting to mongodb");

        Ok(MongoDbStore::new(
            Client::with_options(options)
                .map_err(|e| CollectionError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}

use bson::{Bson, doc};
use docpipe::{memory::InMemoryStore, prelude::*};
use std::sync::Arc;

fn users() -> DocumentStore<InMemoryStore> {
    DocumentStore::new(Arc::new(InMemoryStore::new()), "users")
}

#[tokio::test]
async fn every_read_is_aliased() {
    let users = users();

    let jane = users.insert_one(doc! { "name": "Jane" }).await.unwrap();
    assert_eq!(jane.get("id"), jane.get("_id"));
    assert_eq!(jane.keys().next().map(String::as_str), Some("_id"));

    let many = users
        .insert_many(vec![doc! { "_id": "b", "name": "Bob" }, doc! { "_id": "c", "name": "Cid" }])
        .await
        .unwrap();
    assert_eq!(many[0].get_str("id").unwrap(), "b");

    let found = users.find(doc! {}, FindOptions::default()).await.unwrap();
    assert_eq!(found.len(), 3);
    assert!(found.iter().all(|document| document.get("id") == document.get("_id")));

    let updated = users
        .find_one_and_update(doc! { "_id": "b" }, doc! { "$set": { "age": 30 } })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.get_str("id").unwrap(), "b");
    assert_eq!(updated.get_i32("age").unwrap(), 30);
}

#[tokio::test]
async fn identity_lookups() {
    let users = users();
    users
        .insert_many(vec![doc! { "_id": "a" }, doc! { "_id": "b" }])
        .await
        .unwrap();

    assert_eq!(users.find_by_id(Bson::Null).await.unwrap(), None);
    assert!(users.find_by_id("a").await.unwrap().is_some());

    let found = users.find_all_by_id(["b", "missing", "a"]).await.unwrap();
    let ids = found
        .iter()
        .map(|document| document.get_str("_id").unwrap())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["b", "a"]);
}

#[tokio::test]
async fn update_one_rereads_by_selector() {
    let users = users();
    users
        .insert_one(doc! { "_id": "a", "email": "a@example.com", "visits": 1 })
        .await
        .unwrap();

    let updated = users
        .update_one(doc! { "email": "a@example.com" }, doc! { "$inc": { "visits": 1 } })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.get_i32("visits").unwrap(), 2);

    let moved = users
        .update_one(doc! { "email": "a@example.com" }, doc! { "$set": { "email": "b@example.com" } })
        .await
        .unwrap();
    assert_eq!(moved, None);
}

#[tokio::test]
async fn bulk_writes_report_totals() {
    let users = users();

    let result = users
        .bulk_write(vec![
            WriteModel::InsertOne { document: doc! { "_id": 1, "team": "red" } },
            WriteModel::InsertOne { document: doc! { "_id": 2, "team": "red" } },
            WriteModel::UpdateMany {
                selector: doc! { "team": "red" },
                update: doc! { "$set": { "active": true } },
            },
            WriteModel::ReplaceOne {
                selector: doc! { "_id": 2 },
                replacement: doc! { "team": "blue" },
            },
            WriteModel::DeleteOne { selector: doc! { "_id": 1 } },
        ])
        .await
        .unwrap();

    assert_eq!(result.inserted_ids, vec![Bson::Int32(1), Bson::Int32(2)]);
    assert_eq!(result.matched, 3);
    assert_eq!(result.modified, 3);
    assert_eq!(result.deleted, 1);

    assert_eq!(
        users.find_by_id(2).await.unwrap(),
        Some(doc! { "_id": 2, "team": "blue", "id": 2 })
    );
    assert_eq!(users.distinct("team", doc! {}).await.unwrap(), vec![Bson::String("blue".into())]);
}

#[tokio::test]
async fn index_and_collection_administration() {
    let users = users();
    users.insert_one(doc! { "email": "a@example.com" }).await.unwrap();

    let names = users
        .create_indexes(vec![
            IndexSpec::new(doc! { "email": 1 }).unique(),
            IndexSpec::new(doc! { "createdAt": -1 }).named("by_created"),
        ])
        .await
        .unwrap();
    assert_eq!(names, vec!["email_1".to_string(), "by_created".to_string()]);
    assert!(users.index_exists(&names).await.unwrap());
    assert_eq!(users.indexes().await.unwrap().len(), 3);

    users.drop_index("by_created").await.unwrap();
    assert!(!users.index_exists(&names).await.unwrap());
    assert!(users.drop_index("_id_").await.is_err());

    let report = users.re_index().await.unwrap();
    assert_eq!(report.get_i64("nIndexes").unwrap(), 2);

    assert_eq!(users.stats().await.unwrap().get_i64("count").unwrap(), 1);
    assert!(!users.is_capped().await.unwrap());
    assert_eq!(users.estimated_document_count().await.unwrap(), 1);

    users.rename("people").await.unwrap();
    let people = users.sibling("people");
    assert_eq!(people.count_documents(doc! {}).await.unwrap(), 1);
    assert!(!users.drop().await.unwrap());
    assert!(people.drop().await.unwrap());
}

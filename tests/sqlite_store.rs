//! SQLite store behavior against a real database file.

use std::sync::Arc;
use std::time::Duration;

use brainstore::brains;
use brainstore::config::Config;
use brainstore::context::AppContext;
use brainstore::db;
use brainstore::embedding::DisabledEmbedder;
use brainstore::migrate;
use brainstore::reaper;
use brainstore::sqlite_store::SqliteStore;
use brainstore::upload::{upload_file, UploadOptions, UploadedFile};
use brainstore_core::models::{
    BrainUpdate, BrainUser, BrainVector, MessageType, NewBrain, NewVector, Role, SegmentMetadata,
};
use brainstore_core::store::Store;
use brainstore_core::Error;
use tempfile::TempDir;
use uuid::Uuid;

async fn open_store() -> (TempDir, SqliteStore) {
    let tmp = TempDir::new().unwrap();
    let config = Config::minimal(tmp.path().join("data").join("brainstore.sqlite"));
    let pool = db::connect(&config).await.unwrap();
    migrate::migrate_pool(&pool).await.unwrap();
    (tmp, SqliteStore::new(pool))
}

fn metadata(name: &str, sha: &str, size: u64) -> SegmentMetadata {
    SegmentMetadata {
        file_sha1: sha.to_string(),
        file_size: size,
        file_name: name.to_string(),
        file_extension: ".txt".to_string(),
        chunk_size: 500,
        chunk_overlap: 0,
        date: "20240101".to_string(),
        summarization: false,
        file_url: None,
    }
}

fn vector(name: &str, sha: &str, size: u64, content: &str) -> NewVector {
    NewVector {
        id: Uuid::new_v4(),
        content: content.to_string(),
        metadata: metadata(name, sha, size),
        embedding: Some(vec![0.5, -1.0]),
    }
}

async fn brain(store: &SqliteStore, name: &str) -> Uuid {
    store
        .insert_brain(&NewBrain {
            name: name.to_string(),
            ..NewBrain::default()
        })
        .await
        .unwrap()
        .id
}

fn links(brain_id: Uuid, rows: &[NewVector]) -> Vec<BrainVector> {
    rows.iter()
        .map(|v| BrainVector {
            brain_id,
            vector_id: v.id,
            file_sha1: v.metadata.file_sha1.clone(),
        })
        .collect()
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let (_tmp, store) = open_store().await;
    migrate::migrate_pool(store.pool()).await.unwrap();
    migrate::migrate_pool(store.pool()).await.unwrap();
}

#[tokio::test]
async fn test_brain_round_trip_and_update() {
    let (_tmp, store) = open_store().await;
    let created = store
        .insert_brain(&NewBrain {
            name: "research".into(),
            openai_api_key: Some("sk-brain".into()),
            ..NewBrain::default()
        })
        .await
        .unwrap();

    let loaded = store.get_brain(created.id).await.unwrap().unwrap();
    assert_eq!(loaded.name, "research");
    assert_eq!(loaded.openai_api_key.as_deref(), Some("sk-brain"));

    let update = BrainUpdate {
        description: Some("papers".into()),
        max_tokens: Some(1024),
        ..BrainUpdate::default()
    };
    assert!(store.update_brain(created.id, &update).await.unwrap());
    let loaded = store.get_brain(created.id).await.unwrap().unwrap();
    assert_eq!(loaded.description, "papers");
    assert_eq!(loaded.max_tokens, 1024);
    assert_eq!(loaded.name, "research");

    assert!(!store.update_brain(Uuid::new_v4(), &update).await.unwrap());
    assert!(store.delete_brain(created.id).await.unwrap());
    assert!(store.get_brain(created.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_single_default_membership() {
    let (_tmp, store) = open_store().await;
    let user = Uuid::new_v4();
    let a = brain(&store, "a").await;
    let b = brain(&store, "b").await;

    for (brain_id, default_brain) in [(a, true), (b, true)] {
        store
            .insert_brain_user(&BrainUser {
                brain_id,
                user_id: user,
                rights: Role::Owner,
                default_brain,
            })
            .await
            .unwrap();
    }
    assert_eq!(store.default_brain_id(user).await.unwrap(), Some(b));

    assert!(store.set_default_brain(user, a).await.unwrap());
    assert_eq!(store.default_brain_id(user).await.unwrap(), Some(a));
    let defaults = store
        .user_memberships(user)
        .await
        .unwrap()
        .into_iter()
        .filter(|(m, _)| m.default_brain)
        .count();
    assert_eq!(defaults, 1);

    assert!(!store.set_default_brain(user, Uuid::new_v4()).await.unwrap());
    assert_eq!(store.default_brain_id(user).await.unwrap(), Some(a));
}

#[tokio::test]
async fn test_duplicate_membership_rejected() {
    let (_tmp, store) = open_store().await;
    let b = brain(&store, "b").await;
    let member = BrainUser {
        brain_id: b,
        user_id: Uuid::new_v4(),
        rights: Role::Editor,
        default_brain: false,
    };
    store.insert_brain_user(&member).await.unwrap();
    let err = store.insert_brain_user(&member).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(
        store.get_brain_user(b, member.user_id).await.unwrap().unwrap().rights,
        Role::Editor
    );
}

#[tokio::test]
async fn test_vector_and_link_inserts_are_idempotent() {
    let (_tmp, store) = open_store().await;
    let b = brain(&store, "b").await;
    let rows = vec![
        vector("a.txt", "sha-a", 10, "first"),
        vector("a.txt", "sha-a", 10, "second"),
    ];

    assert_eq!(store.insert_vectors(&rows).await.unwrap(), 2);
    assert_eq!(store.insert_vectors(&rows).await.unwrap(), 0);
    assert_eq!(store.insert_links(&links(b, &rows)).await.unwrap(), 2);
    assert_eq!(store.insert_links(&links(b, &rows)).await.unwrap(), 0);

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    assert_eq!(store.brain_vector_ids(b).await.unwrap(), ids);
    assert_eq!(store.vector_ids_by_file_sha1("sha-a").await.unwrap(), ids);
    assert_eq!(store.vector_ids_by_file_name("a.txt").await.unwrap(), ids);
    assert!(store.brain_has_file(b, "sha-a").await.unwrap());
    assert!(!store.brain_has_file(b, "sha-z").await.unwrap());

    let stored = store.vectors_by_file_name("a.txt").await.unwrap();
    assert_eq!(stored[0].content, "first");
    assert_eq!(stored[0].metadata, rows[0].metadata);
    assert_eq!(stored[0].embedding.as_deref(), Some(&[0.5f32, -1.0][..]));
}

#[tokio::test]
async fn test_file_summaries_one_per_vector() {
    let (_tmp, store) = open_store().await;
    let rows = vec![
        vector("a.txt", "sha-a", 10, "a1"),
        vector("a.txt", "sha-a", 10, "a2"),
        vector("b.txt", "sha-b", 20, "b1"),
    ];
    store.insert_vectors(&rows).await.unwrap();

    let mut ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    ids.push(rows[0].id);
    ids.push(Uuid::new_v4());
    let mut files = store.file_summaries(&ids).await.unwrap();
    files.sort_by(|a, b| a.name.cmp(&b.name));
    let pairs: Vec<(&str, u64)> = files.iter().map(|f| (f.name.as_str(), f.size)).collect();
    // Repeated and unknown ids contribute nothing; dedup by file is the
    // aggregator's job.
    assert_eq!(pairs, vec![("a.txt", 10), ("a.txt", 10), ("b.txt", 20)]);

    assert!(store.file_summaries(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_orphan_delete_skips_linked_vectors() {
    let (_tmp, store) = open_store().await;
    let b = brain(&store, "b").await;
    let linked = vector("keep.txt", "sha-k", 5, "keep");
    let orphan = vector("drop.txt", "sha-d", 5, "drop");
    store
        .insert_vectors(&[linked.clone(), orphan.clone()])
        .await
        .unwrap();
    store
        .insert_links(&links(b, std::slice::from_ref(&linked)))
        .await
        .unwrap();

    let deleted = store
        .delete_orphaned_vectors(&[linked.id, orphan.id])
        .await
        .unwrap();
    assert_eq!(deleted, vec![orphan.id]);
    assert!(store.delete_orphaned_vectors(&[orphan.id]).await.unwrap().is_empty());

    assert_eq!(store.delete_links(b, &[linked.id]).await.unwrap(), 1);
    assert_eq!(store.delete_orphaned_vectors(&[linked.id]).await.unwrap(), vec![linked.id]);
}

#[tokio::test]
async fn test_unlinked_vectors_by_age() {
    let (_tmp, store) = open_store().await;
    let old = vector("old.txt", "sha-o", 5, "old");
    let young = vector("young.txt", "sha-y", 5, "young");
    store.insert_vectors(&[old.clone(), young.clone()]).await.unwrap();

    let two_hours_ago = chrono::Utc::now() - chrono::Duration::hours(2);
    sqlx::query("UPDATE vectors SET created_at = ? WHERE id = ?")
        .bind(two_hours_ago.timestamp_millis())
        .bind(old.id.to_string())
        .execute(store.pool())
        .await
        .unwrap();

    let cutoff = chrono::Utc::now() - chrono::Duration::hours(1);
    assert_eq!(store.unlinked_vector_ids(cutoff).await.unwrap(), vec![old.id]);
}

#[tokio::test]
async fn test_brains_for_vector_oldest_link_first() {
    let (_tmp, store) = open_store().await;
    let first = brain(&store, "first").await;
    let second = brain(&store, "second").await;
    let row = vector("s.txt", "sha-s", 5, "shared");
    store.insert_vectors(std::slice::from_ref(&row)).await.unwrap();
    store
        .insert_links(&links(first, std::slice::from_ref(&row)))
        .await
        .unwrap();
    store
        .insert_links(&links(second, std::slice::from_ref(&row)))
        .await
        .unwrap();

    assert_eq!(
        store.brains_for_vector(row.id).await.unwrap(),
        vec![first, second]
    );
    assert_eq!(store.delete_brain_links(first).await.unwrap(), 1);
    assert_eq!(store.brains_for_vector(row.id).await.unwrap(), vec![second]);
}

#[tokio::test]
async fn test_store_only_upload_and_delete_over_sqlite() {
    let (tmp, store) = open_store().await;
    let config = Config::minimal(tmp.path().join("unused.sqlite"));
    let ctx = AppContext::new(config, Arc::new(store), Arc::new(DisabledEmbedder));
    let owner = Uuid::new_v4();
    let a = brains::create_brain_for_user(&ctx, owner, &NewBrain::default())
        .await
        .unwrap()
        .id;
    let b = brains::create_brain_for_user(&ctx, owner, &NewBrain::default())
        .await
        .unwrap()
        .id;

    let file = UploadedFile::new("plan.md", b"# Plan\n\nShip the store.\n".to_vec());
    for brain_id in [a, b] {
        let message = upload_file(&ctx, brain_id, &file, &UploadOptions::default())
            .await
            .unwrap();
        assert_eq!(message.kind, MessageType::Success);
    }
    let vectors = ctx.store.vectors_by_file_name("plan.md").await.unwrap();
    assert!(!vectors.is_empty());
    assert!(vectors.iter().all(|v| v.embedding.is_none()));
    assert_eq!(brains::brain_size(&ctx, a).await.unwrap(), file.size);

    let kept = reaper::delete_file_from_brain(&ctx, a, "plan.md").await.unwrap();
    assert_eq!(kept.vectors_deleted, 0);
    let gone = reaper::delete_file_from_brain(&ctx, b, "plan.md").await.unwrap();
    assert_eq!(gone.vectors_deleted, vectors.len());
    assert!(ctx.store.vectors_by_file_name("plan.md").await.unwrap().is_empty());

    assert_eq!(
        reaper::sweep_orphans(&ctx, Duration::from_secs(0)).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_long_id_lists_are_split_across_statements() {
    let (_tmp, store) = open_store().await;
    let b = brain(&store, "big").await;
    let rows: Vec<NewVector> = (0..1203)
        .map(|i| vector("big.txt", "sha-big", 4096, &format!("segment {}", i)))
        .collect();
    store.insert_vectors(&rows).await.unwrap();
    store.insert_links(&links(b, &rows)).await.unwrap();
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

    assert_eq!(store.file_summaries(&ids).await.unwrap().len(), ids.len());
    assert_eq!(store.delete_links(b, &ids).await.unwrap(), ids.len() as u64);
    assert_eq!(store.delete_orphaned_vectors(&ids).await.unwrap().len(), ids.len());
    assert!(store.vector_ids_by_file_name("big.txt").await.unwrap().is_empty());
}

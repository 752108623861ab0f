//! Retention bounds and registry capacity.

mod common;

use archivist_backup::{BackupOptions, Envelope, KindFilter, RestoreOutcome, Snapshot};
use archivist_core::ArtifactKind;
use common::TestEngine;

fn no_cleanup() -> BackupOptions {
    BackupOptions::default().with_auto_cleanup(false)
}

#[tokio::test]
async fn test_retention_bound() {
    let t = TestEngine::new();
    for _ in 0..8 {
        t.engine.create_backup(ArtifactKind::Auto, no_cleanup()).await.unwrap();
    }
    let before = t.engine.list_artifacts(ArtifactKind::Auto).await.unwrap();
    assert_eq!(before.len(), 8);

    let deleted = t.engine.cleanup_old_backups(ArtifactKind::Auto, 3).await.unwrap();
    assert_eq!(deleted, 5);

    let after = t.engine.list_artifacts(ArtifactKind::Auto).await.unwrap();
    let kept: Vec<_> = after.iter().map(|a| a.filename.clone()).collect();
    let newest: Vec<_> = before.iter().take(3).map(|a| a.filename.clone()).collect();
    assert_eq!(kept, newest);

    let registered = t.engine.list_backups(KindFilter::All).await.unwrap();
    assert_eq!(registered.len(), 3);
    for deleted in before.iter().skip(3) {
        assert!(registered.iter().all(|e| e.filename != deleted.filename));
    }
}

#[tokio::test]
async fn test_registry_cap_keeps_newest_fifty() {
    let t = TestEngine::new();
    let mut created = Vec::new();
    for _ in 0..55 {
        let artifact = t.engine.create_backup(ArtifactKind::Manual, no_cleanup()).await.unwrap();
        created.push(artifact.filename);
    }

    let entries = t.engine.list_backups(KindFilter::All).await.unwrap();
    assert_eq!(entries.len(), 50);

    let listed: Vec<_> = entries.iter().map(|e| e.filename.clone()).collect();
    let expected: Vec<_> = created.iter().rev().take(50).cloned().collect();
    assert_eq!(listed, expected);

    // The filesystem still holds all of them; the registry is only an index.
    assert_eq!(t.engine.list_artifacts(ArtifactKind::Manual).await.unwrap().len(), 55);
}

#[tokio::test]
async fn test_retention_sweeps_past_registry_cap() {
    let t = TestEngine::with_snapshot(common::fixture_snapshot(), |config| {
        config.registry_cap = 5;
    });
    for _ in 0..9 {
        t.engine.create_backup(ArtifactKind::Manual, no_cleanup()).await.unwrap();
    }

    assert_eq!(t.engine.cleanup_old_backups(ArtifactKind::Manual, 2).await.unwrap(), 7);
    assert_eq!(t.engine.list_artifacts(ArtifactKind::Manual).await.unwrap().len(), 2);
    assert_eq!(t.engine.list_backups(KindFilter::All).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_twelve_manual_backups_keep_ten() {
    let snapshot = Snapshot::from_collections(common::forty_each_collections());
    let t = TestEngine::with_snapshot(snapshot, |config| {
        config.retention.manual = 10;
    });

    for _ in 0..12 {
        t.engine
            .create_backup(ArtifactKind::Manual, BackupOptions::default())
            .await
            .unwrap();
    }

    let artifacts = t.engine.list_artifacts(ArtifactKind::Manual).await.unwrap();
    assert_eq!(artifacts.len(), 10);
    assert_eq!(t.source.call_count(), 12);

    for artifact in &artifacts {
        let raw = std::fs::read(&artifact.path).unwrap();
        let bytes = archivist_backup::compression::gunzip_bytes(&raw).unwrap();
        let envelope = Envelope::parse(&bytes).unwrap();
        assert_eq!(envelope.statistics.total_documents, 120);
        assert_eq!(envelope.statistics.collections, 3);
    }

    let registered = t.engine.list_backups(KindFilter::All).await.unwrap();
    assert!(registered.len() <= 50);
    assert_eq!(registered.len(), 10);

    let newest = &artifacts[0];
    let outcome = t.engine.restore(ArtifactKind::Manual, &newest.filename).await.unwrap();
    assert!(matches!(outcome, RestoreOutcome::Envelope(_)));
    assert_eq!(outcome.statistics().total_documents, 120);
}

#[tokio::test]
async fn test_cleanup_never_exceeds_keep_count() {
    let t = TestEngine::with_snapshot(common::fixture_snapshot(), |config| {
        config.retention.auto = 4;
    });

    for round in 0..10 {
        t.engine
            .create_backup(ArtifactKind::Auto, BackupOptions::default())
            .await
            .unwrap();
        let count = t.engine.list_artifacts(ArtifactKind::Auto).await.unwrap().len();
        assert!(count <= 4, "round {}: {} artifacts", round, count);
    }
}

#[tokio::test]
async fn test_rebuild_after_registry_loss() {
    let t = TestEngine::new();
    for _ in 0..3 {
        t.engine.create_backup(ArtifactKind::Auto, no_cleanup()).await.unwrap();
    }
    t.engine.create_backup(ArtifactKind::Manual, no_cleanup()).await.unwrap();

    std::fs::write(t.engine.registry().path(), b"garbage").unwrap();
    assert!(t.engine.list_backups(KindFilter::All).await.unwrap().is_empty());

    assert_eq!(t.engine.rebuild_registry().await.unwrap(), 4);
    let auto = t.engine.list_backups(KindFilter::Only(ArtifactKind::Auto)).await.unwrap();
    assert_eq!(auto.len(), 3);
}

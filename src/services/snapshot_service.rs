//! SnapshotService: the capture pipeline and read paths.
//!
//! Capture runs fetch (streamed, size-bounded, hashed in the same pass),
//! then admission, then the dedup lookup, and only then encodes and
//! persists. Nothing touches the store until the full body is validated,
//! so a timeout or rejection never leaves a partial row behind.

use crate::{
    models::snapshot::{Compression, Snapshot},
    services::{
        error::{SnapshotError, SnapshotResult},
        fetcher::HttpFetcher,
        policy::AdmissionPolicy,
        render::{self, RenderDecision},
        snapshot_store::{InsertOutcome, NewSnapshot, SnapshotStore},
    },
};
use std::io;
use tracing::{debug, info};
use uuid::Uuid;

/// One capture, as handed over by the surrounding application.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub link_id: i64,
    pub source_url: String,
    pub compression: Compression,
    /// Skip the dedup lookup and always store a new row.
    pub force: bool,
    pub requested_by: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub snapshot: Snapshot,
    /// False when an existing snapshot with identical content was returned.
    pub is_new: bool,
}

#[derive(Clone)]
pub struct SnapshotService {
    pub store: SnapshotStore,
    fetcher: HttpFetcher,
    policy: AdmissionPolicy,
}

impl SnapshotService {
    pub fn new(store: SnapshotStore, fetcher: HttpFetcher, policy: AdmissionPolicy) -> Self {
        Self {
            store,
            fetcher,
            policy,
        }
    }

    /// Capture `request.source_url` for `request.link_id`.
    ///
    /// Without `force`, byte-identical content already captured for the same
    /// link yields the existing snapshot and `is_new = false`; this holds
    /// across concurrent callers because the final insert is an
    /// insert-if-absent against the store's unique index.
    pub async fn create_snapshot(&self, request: CaptureRequest) -> SnapshotResult<CaptureOutcome> {
        // fail fast on a compiled-out codec
        request.compression.codec()?;

        let fetched = self
            .fetcher
            .fetch(&request.source_url, self.policy.max_size_bytes())
            .await?;
        let size_original = fetched.body.len() as u64;
        self.policy.admit(&fetched.mime_type, size_original)?;

        if !request.force {
            if let Some(existing) = self
                .store
                .find_by_hash(request.link_id, &fetched.content_hash)
                .await?
            {
                info!(
                    link_id = request.link_id,
                    snapshot_id = %existing.id,
                    content_hash = %fetched.content_hash,
                    "identical content already captured"
                );
                return Ok(CaptureOutcome {
                    snapshot: existing,
                    is_new: false,
                });
            }
        }

        let compression = request.compression;
        let body = fetched.body.clone();
        let payload = tokio::task::spawn_blocking(move || compression.encode(&body))
            .await
            .map_err(|err| SnapshotError::Io(io::Error::other(err)))??;
        debug!(
            "encoded {} -> {} bytes with {}",
            size_original,
            payload.len(),
            compression
        );

        let new = NewSnapshot {
            link_id: request.link_id,
            created_by: request.requested_by,
            source_url: request.source_url,
            mime_type: fetched.mime_type,
            size_original: size_original as i64,
            compression,
            content_hash: fetched.content_hash,
            etag: fetched.etag,
            last_modified: fetched.last_modified,
            payload,
        };

        let outcome = if request.force {
            CaptureOutcome {
                snapshot: self.store.insert_forced(new).await?,
                is_new: true,
            }
        } else {
            match self.store.insert_if_absent(new).await? {
                InsertOutcome::Inserted(snapshot) => CaptureOutcome {
                    snapshot,
                    is_new: true,
                },
                InsertOutcome::Existing(snapshot) => CaptureOutcome {
                    snapshot,
                    is_new: false,
                },
            }
        };

        info!(
            link_id = outcome.snapshot.link_id,
            snapshot_id = %outcome.snapshot.id,
            content_hash = %outcome.snapshot.content_hash,
            size_original = outcome.snapshot.size_original,
            size_compressed = outcome.snapshot.size_compressed,
            compression = %outcome.snapshot.compression,
            is_new = outcome.is_new,
            "snapshot captured"
        );
        Ok(outcome)
    }

    pub async fn get_snapshot(&self, id: Uuid) -> SnapshotResult<Snapshot> {
        self.store.get(id).await
    }

    /// Metadata plus the decoded original bytes.
    pub async fn get_raw(&self, id: Uuid) -> SnapshotResult<(Snapshot, Vec<u8>)> {
        let snapshot = self.store.get(id).await?;
        let decoded = self.decode_payload(&snapshot).await?;
        Ok((snapshot, decoded))
    }

    /// Metadata plus the render decision. Payloads of non-renderable types
    /// are not read at all.
    pub async fn render(&self, id: Uuid) -> SnapshotResult<(Snapshot, RenderDecision)> {
        let snapshot = self.store.get(id).await?;
        if !render::is_renderable(&snapshot.mime_type) {
            return Ok((snapshot, RenderDecision::NotRenderable));
        }
        let decoded = self.decode_payload(&snapshot).await?;
        let decision = render::render(&snapshot, decoded);
        Ok((snapshot, decision))
    }

    async fn decode_payload(&self, snapshot: &Snapshot) -> SnapshotResult<Vec<u8>> {
        let payload = self.store.read_payload(snapshot).await?;
        let compression = snapshot.compression;
        tokio::task::spawn_blocking(move || compression.decode(&payload))
            .await
            .map_err(|err| SnapshotError::Io(io::Error::other(err)))?
    }

    pub async fn delete_snapshot(&self, id: Uuid) -> SnapshotResult<Snapshot> {
        let snapshot = self.store.delete(id).await?;
        info!(snapshot_id = %id, link_id = snapshot.link_id, "snapshot deleted");
        Ok(snapshot)
    }

    pub async fn list_snapshots(&self, link_id: i64) -> SnapshotResult<Vec<Snapshot>> {
        self.store.list_for_link(link_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::{hasher::content_hash, render::RenderBody},
        test_support::{spawn_upstream, test_service, test_store},
    };
    use axum::{Router, http::header, routing::get};
    use std::{
        collections::HashSet,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    async fn upstream() -> String {
        let counter = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/a.txt",
                get(|| async { ([(header::CONTENT_TYPE, "text/plain")], "hello") }),
            )
            .route(
                "/page.html",
                get(|| async {
                    (
                        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                        "<html><body>page</body></html>",
                    )
                }),
            )
            .route(
                "/logo.png",
                get(|| async {
                    (
                        [(header::CONTENT_TYPE, "image/png")],
                        b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR".to_vec(),
                    )
                }),
            )
            .route(
                "/blob.bin",
                get(|| async { vec![0u8, 159, 146, 150, 0, 1] }),
            )
            .route(
                "/counter",
                get(move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move { ([(header::CONTENT_TYPE, "text/plain")], format!("visit {n}")) }
                }),
            );
        format!("http://{}", spawn_upstream(router).await)
    }

    fn capture(link_id: i64, url: String, compression: Compression, force: bool) -> CaptureRequest {
        CaptureRequest {
            link_id,
            source_url: url,
            compression,
            force,
            requested_by: None,
        }
    }

    #[tokio::test]
    async fn hello_scenario_dedups_across_codecs() {
        let base = upstream().await;
        let (_dir, store) = test_store().await;
        let service = test_service(store, 1024, ".*");
        let url = format!("{}/a.txt", base);

        let first = service
            .create_snapshot(capture(1, url.clone(), Compression::Gzip, false))
            .await
            .unwrap();
        assert!(first.is_new);
        assert_eq!(first.snapshot.content_hash, content_hash(b"hello"));
        assert_eq!(first.snapshot.size_original, 5);
        assert_eq!(first.snapshot.mime_type, "text/plain");
        assert_eq!(first.snapshot.compression, Compression::Gzip);

        let second = service
            .create_snapshot(capture(1, url, Compression::None, false))
            .await
            .unwrap();
        assert!(!second.is_new);
        assert_eq!(second.snapshot, first.snapshot);
        assert_eq!(service.list_snapshots(1).await.unwrap().len(), 1);

        let (_, raw) = service.get_raw(first.snapshot.id).await.unwrap();
        assert_eq!(raw, b"hello");
    }

    #[cfg(feature = "zstd")]
    #[tokio::test]
    async fn zstd_capture_round_trips_and_dedups() {
        let base = upstream().await;
        let (_dir, store) = test_store().await;
        let service = test_service(store, 1024, ".*");
        let url = format!("{}/page.html", base);

        let first = service
            .create_snapshot(capture(11, url.clone(), Compression::Zstd, false))
            .await
            .unwrap();
        assert!(first.is_new);
        assert_eq!(first.snapshot.compression, Compression::Zstd);
        assert_eq!(
            first.snapshot.content_hash,
            content_hash(b"<html><body>page</body></html>")
        );

        let (_, raw) = service.get_raw(first.snapshot.id).await.unwrap();
        assert_eq!(raw, b"<html><body>page</body></html>");

        for compression in [Compression::Gzip, Compression::None, Compression::Zstd] {
            let again = service
                .create_snapshot(capture(11, url.clone(), compression, false))
                .await
                .unwrap();
            assert!(!again.is_new);
            assert_eq!(again.snapshot.id, first.snapshot.id);
            assert_eq!(again.snapshot.compression, Compression::Zstd);
        }
        assert_eq!(service.list_snapshots(11).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn force_stores_duplicate_rows() {
        let base = upstream().await;
        let (_dir, store) = test_store().await;
        let service = test_service(store, 1024, ".*");
        let url = format!("{}/a.txt", base);

        let a = service
            .create_snapshot(capture(2, url.clone(), Compression::None, true))
            .await
            .unwrap();
        let b = service
            .create_snapshot(capture(2, url, Compression::Gzip, true))
            .await
            .unwrap();

        assert!(a.is_new && b.is_new);
        assert_ne!(a.snapshot.id, b.snapshot.id);
        assert_eq!(a.snapshot.content_hash, b.snapshot.content_hash);
        assert_eq!(service.list_snapshots(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn changed_content_creates_a_new_snapshot() {
        let base = upstream().await;
        let (_dir, store) = test_store().await;
        let service = test_service(store, 1024, ".*");
        let url = format!("{}/counter", base);

        let first = service
            .create_snapshot(capture(3, url.clone(), Compression::Gzip, false))
            .await
            .unwrap();
        let second = service
            .create_snapshot(capture(3, url, Compression::Gzip, false))
            .await
            .unwrap();
        assert!(first.is_new && second.is_new);
        assert_ne!(first.snapshot.content_hash, second.snapshot.content_hash);

        let listed = service.list_snapshots(3).await.unwrap();
        assert_eq!(listed[0].id, second.snapshot.id);
        assert_eq!(listed[1].id, first.snapshot.id);
    }

    #[tokio::test]
    async fn disallowed_mime_is_rejected_before_persisting() {
        let base = upstream().await;
        let (_dir, store) = test_store().await;
        let payload_root = store.base_path.clone();
        let service = test_service(store, 1024, "text/.*");

        let err = service
            .create_snapshot(capture(4, format!("{}/logo.png", base), Compression::Gzip, false))
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::MimeNotAllowed(m) if m == "image/png"));
        assert!(service.list_snapshots(4).await.unwrap().is_empty());
        assert!(!payload_root.exists() || std::fs::read_dir(&payload_root).unwrap().next().is_none());

        let ok = service
            .create_snapshot(capture(4, format!("{}/a.txt", base), Compression::Gzip, false))
            .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn size_limit_applies_to_capture() {
        let base = upstream().await;
        let (_dir, store) = test_store().await;

        let exact = test_service(store.clone(), 5, ".*");
        assert!(
            exact
                .create_snapshot(capture(5, format!("{}/a.txt", base), Compression::None, false))
                .await
                .is_ok()
        );

        let tight = test_service(store, 4, ".*");
        let err = tight
            .create_snapshot(capture(6, format!("{}/a.txt", base), Compression::None, false))
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::ContentTooLarge { limit: 4 }));
        assert!(tight.list_snapshots(6).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_identical_captures_store_one_row() {
        const CALLERS: usize = 8;
        let base = upstream().await;
        let (_dir, store) = test_store().await;
        let service = test_service(store, 1024, ".*");
        let url = format!("{}/page.html", base);

        let handles: Vec<_> = (0..CALLERS)
            .map(|i| {
                let service = service.clone();
                let compression = if i % 2 == 0 { Compression::Gzip } else { Compression::None };
                let request = capture(7, url.clone(), compression, false);
                tokio::spawn(async move { service.create_snapshot(request).await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(outcomes.iter().filter(|o| o.is_new).count(), 1);
        let ids: HashSet<Uuid> = outcomes.iter().map(|o| o.snapshot.id).collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(service.list_snapshots(7).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn render_and_raw_paths() {
        let base = upstream().await;
        let (_dir, store) = test_store().await;
        let service = test_service(store, 1024, ".*");

        let html = service
            .create_snapshot(capture(8, format!("{}/page.html", base), Compression::Gzip, false))
            .await
            .unwrap()
            .snapshot;
        let (_, decision) = service.render(html.id).await.unwrap();
        assert_eq!(
            decision,
            RenderDecision::Inline {
                content_type: "text/html".into(),
                body: RenderBody::Text("<html><body>page</body></html>".into()),
            }
        );

        let blob = service
            .create_snapshot(capture(8, format!("{}/blob.bin", base), Compression::Gzip, false))
            .await
            .unwrap()
            .snapshot;
        assert_eq!(blob.mime_type, "application/octet-stream");
        let (_, decision) = service.render(blob.id).await.unwrap();
        assert_eq!(decision, RenderDecision::NotRenderable);
        let (_, raw) = service.get_raw(blob.id).await.unwrap();
        assert_eq!(raw, vec![0u8, 159, 146, 150, 0, 1]);
    }

    #[tokio::test]
    async fn delete_then_lookups_fail() {
        let base = upstream().await;
        let (_dir, store) = test_store().await;
        let service = test_service(store, 1024, ".*");

        let created = service
            .create_snapshot(capture(9, format!("{}/a.txt", base), Compression::Gzip, false))
            .await
            .unwrap()
            .snapshot;
        service.delete_snapshot(created.id).await.unwrap();

        assert!(matches!(service.get_snapshot(created.id).await, Err(SnapshotError::NotFound(_))));
        assert!(matches!(service.get_raw(created.id).await, Err(SnapshotError::NotFound(_))));
        assert!(matches!(service.delete_snapshot(created.id).await, Err(SnapshotError::NotFound(_))));
    }

    #[tokio::test]
    async fn codec_mismatch_is_a_decode_error() {
        let base = upstream().await;
        let (_dir, store) = test_store().await;
        let service = test_service(store.clone(), 1024, ".*");

        let created = service
            .create_snapshot(capture(10, format!("{}/a.txt", base), Compression::None, false))
            .await
            .unwrap()
            .snapshot;
        sqlx::query("UPDATE snapshots SET compression = 'gzip' WHERE id = ?")
            .bind(created.id)
            .execute(&*store.db)
            .await
            .unwrap();

        assert!(matches!(
            service.get_raw(created.id).await,
            Err(SnapshotError::Decode { codec: "gzip", .. })
        ));
    }
}

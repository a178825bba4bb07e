//! Sync ingestor: snapshot idempotence, link reconciliation, selection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use music_grabber_backend::error::Result;
use music_grabber_backend::services::spotify::{
    MusicCatalogProvider, ProviderPlaylist, ProviderTrack, TokenBroker,
};
use music_grabber_backend::{
    create_test_pool, CatalogService, Provider, SyncIngestor, TokenVault,
};

/// In-memory provider double. Mutate `playlists`/`tracks` between syncs to
/// simulate remote changes.
#[derive(Default)]
struct FakeProvider {
    playlists: Mutex<Vec<ProviderPlaylist>>,
    tracks: Mutex<HashMap<String, Vec<ProviderTrack>>>,
}

impl FakeProvider {
    fn set_playlist(&self, id: &str, name: &str, snapshot: &str, tracks: Vec<ProviderTrack>) {
        let mut playlists = self.playlists.lock().unwrap();
        playlists.retain(|p| p.provider_playlist_id != id);
        playlists.push(ProviderPlaylist {
            provider_playlist_id: id.to_string(),
            name: name.to_string(),
            owner: Some("tester".to_string()),
            snapshot: Some(snapshot.to_string()),
            track_count: Some(tracks.len() as i64),
        });
        self.tracks.lock().unwrap().insert(id.to_string(), tracks);
    }
}

#[async_trait]
impl MusicCatalogProvider for FakeProvider {
    async fn playlists(&self, _access_token: &str) -> Result<Vec<ProviderPlaylist>> {
        Ok(self.playlists.lock().unwrap().clone())
    }

    async fn playlist_tracks(
        &self,
        _access_token: &str,
        provider_playlist_id: &str,
    ) -> Result<Vec<ProviderTrack>> {
        Ok(self
            .tracks
            .lock()
            .unwrap()
            .get(provider_playlist_id)
            .cloned()
            .unwrap_or_default())
    }
}

fn provider_track(n: usize) -> ProviderTrack {
    ProviderTrack {
        provider_track_id: format!("sp-{n}"),
        artists: format!("Artist {n}"),
        title: format!("Song {n}"),
        duration_ms: Some(200_000 + n as i64),
        isrc: Some(format!("ISRC000000{n:02}")),
        album: Some("Album".to_string()),
        cover_url: Some(format!("https://i.scdn.co/image/{n}")),
        release_date: Some("2023-01-01".to_string()),
        explicit: false,
        added_at: Some(Utc::now()),
        position: n as i64,
    }
}

struct Fixture {
    catalog: CatalogService,
    provider: Arc<FakeProvider>,
    ingestor: SyncIngestor,
    account_id: String,
}

async fn fixture() -> Fixture {
    let pool = create_test_pool().await;
    let catalog = CatalogService::new(pool);
    let provider = Arc::new(FakeProvider::default());

    let account = catalog
        .upsert_account(Provider::Spotify, "user-1", Some("Tester"))
        .await
        .unwrap();
    // Non-expired plaintext access token; no refresh needed in tests.
    catalog
        .store_token(&account.id, "access-token", None, None, None)
        .await
        .unwrap();

    let vault = Arc::new(TokenVault::new("test-secret"));
    let tokens = Arc::new(TokenBroker::new(catalog.clone(), vault, None));
    let ingestor = SyncIngestor::new(catalog.clone(), provider.clone(), tokens);

    Fixture {
        catalog,
        provider,
        ingestor,
        account_id: account.id,
    }
}

#[tokio::test]
async fn initial_sync_then_snapshot_skip_then_incremental_change() {
    let fx = fixture().await;
    fx.provider.set_playlist(
        "pl-1",
        "Party",
        "S1",
        (1..=5).map(provider_track).collect(),
    );

    // Discover + select so the playlist participates in sync.
    let discovered = fx.ingestor.discover(&fx.account_id, true).await.unwrap();
    assert_eq!(discovered.len(), 1);
    let playlist_id = discovered[0].playlist_id.clone().unwrap();
    fx.catalog
        .select_playlists(&fx.account_id, &[playlist_id.clone()])
        .await
        .unwrap();

    // Initial sync: five tracks, five identities, five links.
    let report = fx.ingestor.sync_account(&fx.account_id, false).await.unwrap();
    assert_eq!(report.total_tracks_created, 5);
    assert_eq!(report.total_links_created, 5);
    assert_eq!(report.playlists_skipped, 0);

    let entries = fx.catalog.playlist_entries(&playlist_id).await.unwrap();
    assert_eq!(entries.len(), 5);
    for entry in &entries {
        let identities = fx.catalog.identities_for_track(&entry.track.id).await.unwrap();
        assert!(identities
            .iter()
            .any(|i| i.provider == Provider::Spotify));
    }

    // Second sync with the same snapshot: skipped, zero mutations.
    let report = fx.ingestor.sync_account(&fx.account_id, false).await.unwrap();
    assert_eq!(report.playlists_skipped, 1);
    assert_eq!(report.total_tracks_created, 0);
    assert_eq!(report.total_links_created, 0);
    assert_eq!(report.total_links_removed, 0);

    // Third sync: S2 adds track 6 and drops track 1.
    fx.provider.set_playlist(
        "pl-1",
        "Party",
        "S2",
        (2..=6).map(provider_track).collect(),
    );
    let report = fx.ingestor.sync_account(&fx.account_id, false).await.unwrap();
    assert_eq!(report.playlists_skipped, 0);
    assert_eq!(report.total_tracks_created, 1);
    assert_eq!(report.total_links_created, 1);
    assert_eq!(report.total_links_removed, 1);

    // The removed link never cascades to the track itself.
    assert_eq!(fx.catalog.list_tracks().await.unwrap().len(), 6);
    assert_eq!(
        fx.catalog.playlist_entries(&playlist_id).await.unwrap().len(),
        5
    );
}

#[tokio::test]
async fn force_resyncs_an_unchanged_snapshot() {
    let fx = fixture().await;
    fx.provider
        .set_playlist("pl-1", "Party", "S1", vec![provider_track(1)]);

    let discovered = fx.ingestor.discover(&fx.account_id, true).await.unwrap();
    let playlist_id = discovered[0].playlist_id.clone().unwrap();
    fx.catalog
        .select_playlists(&fx.account_id, &[playlist_id])
        .await
        .unwrap();

    fx.ingestor.sync_account(&fx.account_id, false).await.unwrap();
    let forced = fx.ingestor.sync_account(&fx.account_id, true).await.unwrap();
    assert_eq!(forced.playlists_skipped, 0);
    // Idempotent content: force re-walks the playlist but mutates nothing.
    assert_eq!(forced.total_tracks_created, 0);
    assert_eq!(forced.total_links_created, 0);
    assert_eq!(forced.total_links_removed, 0);
}

#[tokio::test]
async fn selection_is_an_exact_set_operation() {
    let fx = fixture().await;
    fx.provider.set_playlist("pl-1", "One", "S1", vec![]);
    fx.provider.set_playlist("pl-2", "Two", "S1", vec![]);
    fx.provider.set_playlist("pl-3", "Three", "S1", vec![]);

    let discovered = fx.ingestor.discover(&fx.account_id, true).await.unwrap();
    let ids: Vec<String> = discovered
        .iter()
        .map(|d| d.playlist_id.clone().unwrap())
        .collect();

    fx.catalog
        .select_playlists(&fx.account_id, &ids[..2].to_vec())
        .await
        .unwrap();
    let selected = fx
        .catalog
        .list_selected_playlists(Some(&fx.account_id))
        .await
        .unwrap();
    assert_eq!(selected.len(), 2);

    // Re-selecting only the third clears the other two.
    fx.catalog
        .select_playlists(&fx.account_id, &[ids[2].clone()])
        .await
        .unwrap();
    let selected = fx
        .catalog
        .list_selected_playlists(Some(&fx.account_id))
        .await
        .unwrap();
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].id, ids[2]);
}

#[tokio::test]
async fn duplicate_tracks_across_playlists_are_not_duplicated() {
    let fx = fixture().await;
    fx.provider
        .set_playlist("pl-1", "One", "S1", vec![provider_track(1)]);
    fx.provider
        .set_playlist("pl-2", "Two", "S1", vec![provider_track(1)]);

    let discovered = fx.ingestor.discover(&fx.account_id, true).await.unwrap();
    let ids: Vec<String> = discovered
        .iter()
        .map(|d| d.playlist_id.clone().unwrap())
        .collect();
    fx.catalog
        .select_playlists(&fx.account_id, &ids)
        .await
        .unwrap();

    let report = fx.ingestor.sync_account(&fx.account_id, false).await.unwrap();
    assert_eq!(report.total_tracks_created, 1);
    assert_eq!(report.total_links_created, 2);
    assert_eq!(fx.catalog.list_tracks().await.unwrap().len(), 1);

    // Sync a second time; the provider identity resolves straight back.
    let report = fx.ingestor.sync_account(&fx.account_id, false).await.unwrap();
    assert_eq!(report.total_tracks_created, 0);
}

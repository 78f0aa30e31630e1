//! End-to-end tests for manual add and delete.

mod common;

use common::{
    album, artist, track, FakeSpotify, TestLibrary, ALBUM_1_ID, ARTIST_1_ID, ARTIST_1_NAME,
    ARTIST_2_ID, ARTIST_2_NAME, GENRES, TRACK_1_ID,
};
use spotify_manager::catalog_store::{
    CatalogCounts, CatalogError, CatalogStore, EntityKind, ItemFilter,
};
use spotify_manager::library::{LibraryError, LibraryManager};
use spotify_manager::remote::RemoteError;

fn known_items() -> FakeSpotify {
    let spotify = FakeSpotify::new();
    spotify.add_artist(artist(ARTIST_1_ID, ARTIST_1_NAME, &GENRES));
    spotify.add_artist(artist(ARTIST_2_ID, ARTIST_2_NAME, &["art rock"]));
    spotify.add_album(album(ALBUM_1_ID, ARTIST_1_ID, "1976-10-11"));
    spotify.add_track(track(TRACK_1_ID, ARTIST_2_ID, "7gRvT5pd6Mxbha4L5XyFzH", "1997-05-21"));
    spotify
}

#[test]
fn test_add_album_by_link() {
    let library = TestLibrary::new(known_items());
    let url = format!("https://open.spotify.com/intl-de/album/{}?si=abc", ALBUM_1_ID);

    let added = library.manager().add_from_url(&url).unwrap();

    assert_eq!(added.kind, EntityKind::Album);
    assert_eq!(added.id, ALBUM_1_ID);
    assert_eq!(added.artist_id, ARTIST_1_ID);
    assert!(added.mirrored);
    assert_eq!(
        library.spotify.mutations(),
        vec![format!("save_album {}", ALBUM_1_ID)]
    );

    let items = library.store.list_all(ItemFilter::Albums).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].artist_name, ARTIST_1_NAME);
    assert_eq!(items[0].release_year, 1976);
    assert_eq!(items[0].genres, GENRES);
}

#[test]
fn test_add_track_by_uri() {
    let library = TestLibrary::new(known_items());

    let added = library
        .manager()
        .add_from_url(&format!("spotify:track:{}", TRACK_1_ID))
        .unwrap();

    assert_eq!(added.kind, EntityKind::Track);
    let stored = library.store.get_track(TRACK_1_ID).unwrap().unwrap();
    assert_eq!(stored.artist_id, ARTIST_2_ID);
    assert_eq!(stored.release_year, 1997);
    assert_eq!(
        library.store.get_artist(ARTIST_2_ID).unwrap().unwrap().genres,
        vec!["art rock"]
    );
}

#[test]
fn test_add_artist_follows_it() {
    let library = TestLibrary::new(known_items());

    library
        .manager()
        .add_from_url(&format!("https://open.spotify.com/artist/{}", ARTIST_2_ID))
        .unwrap();

    assert!(library.store.get_artist(ARTIST_2_ID).unwrap().is_some());
    assert_eq!(
        library.spotify.mutations(),
        vec![format!("follow {}", ARTIST_2_ID)]
    );
}

#[test]
fn test_add_without_user_session_stays_local() {
    let library = TestLibrary::new(known_items());
    let manager = LibraryManager::new(library.store()).with_lookup(library.spotify.clone());

    let added = manager
        .add_from_url(&format!("spotify:album:{}", ALBUM_1_ID))
        .unwrap();

    assert!(!added.mirrored);
    assert!(library.spotify.mutations().is_empty());
    assert!(library.store.get_album(ALBUM_1_ID).unwrap().is_some());
}

#[test]
fn test_add_unknown_item_writes_nothing() {
    let library = TestLibrary::new(known_items());

    let result = library
        .manager()
        .add_from_url("https://open.spotify.com/album/0000000000000000000000");

    assert!(matches!(result, Err(LibraryError::Remote(RemoteError::NotFound(_)))));
    assert_eq!(library.store.counts().unwrap().artists, 0);
    assert!(library.spotify.mutations().is_empty());
}

#[test]
fn test_add_rejects_other_links() {
    let library = TestLibrary::new(known_items());

    for url in [
        "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M",
        "https://example.com/album/1kM6xcSLVfVbdbQCDDEOHt",
        "not a link",
    ] {
        assert!(
            matches!(
                library.manager().add_from_url(url),
                Err(LibraryError::InvalidUrl(_))
            ),
            "{}",
            url
        );
    }
}

#[test]
fn test_delete_album_then_cleanup_owner() {
    let library = TestLibrary::new(known_items());
    let manager = library.manager();
    manager
        .add_from_url(&format!("spotify:album:{}", ALBUM_1_ID))
        .unwrap();

    let owner_delete = manager.delete(EntityKind::Artist, ARTIST_1_ID);
    assert!(matches!(
        owner_delete,
        Err(LibraryError::Catalog(CatalogError::Conflict(_)))
    ));

    assert!(manager.delete(EntityKind::Album, ALBUM_1_ID).unwrap());
    assert!(!manager.delete(EntityKind::Album, ALBUM_1_ID).unwrap());
    assert_eq!(
        library.spotify.mutations(),
        vec![
            format!("save_album {}", ALBUM_1_ID),
            format!("unsave_album {}", ALBUM_1_ID),
        ]
    );

    let cleanup = manager.cleanup().unwrap();
    assert_eq!(cleanup.artists_removed, 1);
    assert_eq!(cleanup.genres_removed, GENRES.len());
    assert_eq!(library.store.counts().unwrap(), CatalogCounts::default());
}

#[test]
fn test_added_album_survives_next_sync_once_saved() {
    let spotify = known_items();
    let library = TestLibrary::new(spotify);
    library
        .manager()
        .add_from_url(&format!("spotify:album:{}", ALBUM_1_ID))
        .unwrap();
    library
        .spotify
        .set_saved_albums(vec![album(ALBUM_1_ID, ARTIST_1_ID, "1976-10-11")]);

    let report = library.reconciler().sync_albums().unwrap();

    assert_eq!(report.counts(), (0, 0));
    assert!(library.store.get_album(ALBUM_1_ID).unwrap().is_some());
}

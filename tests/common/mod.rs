//! Common test infrastructure
//!
//! An in-process Spotify fake with scripted failures, record builders and
//! helpers that wire a store, a reader and a reconciler together.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{album, FakeSpotify, TestLibrary, ARTIST_1_ID};
//!
//! #[test]
//! fn test_sync_albums() {
//!     let spotify = FakeSpotify::new();
//!     spotify.set_saved_albums(vec![album("al1", ARTIST_1_ID, "1999-01-01")]);
//!     let library = TestLibrary::new(spotify);
//!     let report = library.reconciler().sync_albums().unwrap();
//!     assert_eq!(report.counts(), (1, 0));
//! }
//! ```

mod constants;
mod fake_spotify;
mod fixtures;

pub use constants::*;
#[allow(unused_imports)]
pub use fake_spotify::{Collection, FakeSpotify};
#[allow(unused_imports)]
pub use fixtures::{
    album, artist, local_album, local_artist, local_track, track, TestLibrary,
};

//! Shaping raw Spotify records into catalog entities.
//!
//! Shared by the snapshot reader and the manual single-item add path, so a
//! record is accepted or rejected the same way no matter how it arrived.

use crate::catalog_store::{Album, Artist, EntityKind, Track};
use crate::remote::{ExternalUrls, SimplifiedArtist, SpotifyAlbum, SpotifyArtist, SpotifyImage, SpotifyTrack};

use super::ItemFailure;

const PREFERRED_IMAGE_WIDTH: std::ops::RangeInclusive<u32> = 200..=500;

/// Year component of a `YYYY[-MM[-DD]]` release date.
pub fn release_year(release_date: Option<&str>) -> Result<i32, String> {
    let Some(date) = release_date.map(str::trim).filter(|d| !d.is_empty()) else {
        return Err("missing release date".to_string());
    };
    let year = date.split('-').next().unwrap_or_default();
    if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("malformed release date '{}'", date));
    }
    year.parse::<i32>()
        .map_err(|_| format!("malformed release date '{}'", date))
}

/// First image between 200 and 500 px wide, widest first; otherwise the widest.
pub fn pick_image_url(images: &[SpotifyImage]) -> Option<String> {
    let mut sorted: Vec<&SpotifyImage> = images.iter().filter(|i| !i.url.is_empty()).collect();
    sorted.sort_by(|a, b| b.width.unwrap_or(0).cmp(&a.width.unwrap_or(0)));
    sorted
        .iter()
        .find(|i| PREFERRED_IMAGE_WIDTH.contains(&i.width.unwrap_or(0)))
        .or_else(|| sorted.first())
        .map(|i| i.url.clone())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn canonical_uri(uri: &str, kind: EntityKind, id: &str) -> String {
    if uri.is_empty() {
        format!("spotify:{}:{}", kind, id)
    } else {
        uri.to_string()
    }
}

fn canonical_url(urls: &ExternalUrls, kind: EntityKind, id: &str) -> String {
    non_empty(urls.spotify.as_deref())
        .unwrap_or_else(|| format!("https://open.spotify.com/{}/{}", kind, id))
}

/// Id of the owning artist, which is the first credited one.
pub fn owner_id(artists: &[SimplifiedArtist]) -> Option<String> {
    artists.first().and_then(|a| non_empty(a.id.as_deref()))
}

pub fn artist_from_remote(raw: &SpotifyArtist) -> Result<Artist, ItemFailure> {
    let Some(id) = non_empty(raw.id.as_deref()) else {
        return Err(ItemFailure::new(EntityKind::Artist, None, "missing id"));
    };
    if raw.name.trim().is_empty() {
        return Err(ItemFailure::new(EntityKind::Artist, Some(id), "missing name"));
    }
    Ok(Artist {
        name: raw.name.clone(),
        genres: raw.genres.clone(),
        uri: canonical_uri(&raw.uri, EntityKind::Artist, &id),
        url: canonical_url(&raw.external_urls, EntityKind::Artist, &id),
        image_url: pick_image_url(&raw.images),
        id,
    })
}

/// The album plus the id of its owning artist.
pub fn album_from_remote(raw: &SpotifyAlbum) -> Result<(Album, String), ItemFailure> {
    let Some(id) = non_empty(raw.id.as_deref()) else {
        return Err(ItemFailure::new(EntityKind::Album, None, "missing id"));
    };
    let Some(artist_id) = owner_id(&raw.artists) else {
        return Err(ItemFailure::new(EntityKind::Album, Some(id), "missing artist"));
    };
    let release_year = release_year(raw.release_date.as_deref())
        .map_err(|reason| ItemFailure::new(EntityKind::Album, Some(id.clone()), reason))?;

    let album = Album {
        artist_id: artist_id.clone(),
        name: raw.name.clone(),
        release_year,
        uri: canonical_uri(&raw.uri, EntityKind::Album, &id),
        url: canonical_url(&raw.external_urls, EntityKind::Album, &id),
        id,
    };
    Ok((album, artist_id))
}

/// The track plus the id of its owning artist. The release year comes from
/// the album the track appears on.
pub fn track_from_remote(raw: &SpotifyTrack) -> Result<(Track, String), ItemFailure> {
    let Some(id) = non_empty(raw.id.as_deref()) else {
        return Err(ItemFailure::new(EntityKind::Track, None, "missing id"));
    };
    let Some(artist_id) = owner_id(&raw.artists) else {
        return Err(ItemFailure::new(EntityKind::Track, Some(id), "missing artist"));
    };
    let Some(album) = raw.album.as_ref() else {
        return Err(ItemFailure::new(EntityKind::Track, Some(id), "missing album"));
    };
    let Some(album_id) = non_empty(album.id.as_deref()) else {
        return Err(ItemFailure::new(EntityKind::Track, Some(id), "missing album id"));
    };
    let release_year = release_year(album.release_date.as_deref())
        .map_err(|reason| ItemFailure::new(EntityKind::Track, Some(id.clone()), reason))?;

    let track = Track {
        artist_id: artist_id.clone(),
        album_id,
        name: raw.name.clone(),
        release_year,
        uri: canonical_uri(&raw.uri, EntityKind::Track, &id),
        url: canonical_url(&raw.external_urls, EntityKind::Track, &id),
        id,
    };
    Ok((track, artist_id))
}

mod error;
mod models;
mod schema;
mod store;
mod trait_def;

pub use error::{CatalogError, Result};
pub use models::*;
pub use schema::{
    ALBUMS_TABLE, ARTISTS_TABLE, ARTIST_GENRES_TABLE, CATALOG_VERSIONED_SCHEMAS, GENRES_TABLE,
    TRACKS_TABLE,
};
pub use store::SqliteCatalogStore;
pub use trait_def::CatalogStore;

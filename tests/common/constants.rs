#![allow(dead_code)]

pub const ARTIST_1_ID: &str = "0LcJLqbBmaGUft1e9Mm8HV";
pub const ARTIST_1_NAME: &str = "ABBA";

pub const ARTIST_2_ID: &str = "4Z8W4fKeB5YxbusRsdQVPb";
pub const ARTIST_2_NAME: &str = "Radiohead";

pub const ARTIST_3_ID: &str = "3WrFJ7ztbogyGnTHbHJFl2";
pub const ARTIST_3_NAME: &str = "The Beatles";

pub const ALBUM_1_ID: &str = "1kM6xcSLVfVbdbQCDDEOHt";
pub const ALBUM_2_ID: &str = "6dVIqQ8qmQ5GBnJ9shOYGE";
pub const ALBUM_3_ID: &str = "0ETFjACtuP2ADo6LFhL6HN";

pub const TRACK_1_ID: &str = "0GjEhVFGZW8afUYGChu3Rr";
pub const TRACK_2_ID: &str = "6DCZcSspjsKoFjzjrWoCdn";

pub const GENRES: [&str; 2] = ["europop", "swedish pop"];

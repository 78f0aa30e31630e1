mod versioned_schema;

pub use versioned_schema::{
    ensure_schema, Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
    BASE_DB_VERSION,
};

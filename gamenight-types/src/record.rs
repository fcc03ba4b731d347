use crate::Filter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::hash::Hash;

/// Bounds required of a record's primary key.
pub trait RecordKey:
    Clone + Eq + Hash + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> RecordKey for T where
    T: Clone
        + Eq
        + Hash
        + fmt::Debug
        + fmt::Display
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Describes how a row type maps onto a backend table.
///
/// Live watchers are generic over this trait, so the table name and the
/// projection travel with the type instead of being passed as strings.
pub trait Record:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Table the rows live in.
    const TABLE: &'static str;

    /// Relational projection (e.g. `*,players(name)`), if the row carries
    /// joined fields that change events do not deliver.
    const PROJECTION: Option<&'static str> = None;

    /// Primary key type.
    type Id: RecordKey;

    /// Returns the row's primary key.
    fn id(&self) -> Self::Id;

    /// Column list to request when fetching this row shape.
    fn select_columns() -> &'static str {
        Self::PROJECTION.unwrap_or("*")
    }

    /// Equality filter on the primary key.
    fn id_filter(id: &Self::Id) -> Filter {
        Filter::eq("id", id)
    }
}

/// Reads the `id` field of a raw row payload as `R`'s key type.
///
/// Delete events often carry only the primary key, so this works on the
/// untyped JSON rather than on a decoded `R`.
pub fn record_id<R: Record>(row: &serde_json::Value) -> Option<R::Id> {
    row.get("id")
        .and_then(|id| serde_json::from_value(id.clone()).ok())
}

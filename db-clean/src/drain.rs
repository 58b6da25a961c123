use std::{fmt::Display, num::NonZeroUsize};

use clap::ValueEnum;
use thiserror::Error;
use tracing::{debug, info};

/// A named collection exposed by the backend under `/api/{name}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
pub enum Collection {
    Users,
    Tasks,
}

impl Collection {
    /// Drain order used when no collection is picked explicitly.
    pub const ALL: [Collection; 2] = [Collection::Users, Collection::Tasks];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Tasks => "tasks",
        }
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The operations the drainer needs from whatever holds the records. The HTTP client is the
/// real implementation, tests swap in an in-memory one.
pub trait RecordStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Identifiers currently listed for `collection`, in listing order. An empty listing means
    /// the collection is empty.
    fn list_ids(&self, collection: Collection) -> Result<Vec<String>, Self::Error>;

    /// Best-effort removal of a single record. Implementations only fail when the request
    /// itself could not be made; a record that is already gone is not an error.
    fn delete_by_id(&self, collection: Collection, id: &str) -> Result<(), Self::Error>;

    fn count(&self, collection: Collection) -> Result<u64, Self::Error>;
}

#[derive(Error, Debug)]
pub enum DrainError<E>
where
    E: std::error::Error + 'static,
{
    #[error("request against the {collection} collection failed")]
    Store {
        collection: Collection,
        #[source]
        source: E,
    },
    #[error("{collection} collection still not empty after {limit} passes")]
    PassLimitExceeded {
        collection: Collection,
        limit: NonZeroUsize,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DrainOptions {
    /// Maximum number of list calls per collection. `None` keeps listing until the server
    /// reports an empty collection, however long that takes.
    pub max_passes: Option<NonZeroUsize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub collection: Collection,
    /// Number of list calls made, including the final empty one.
    pub passes: usize,
    /// Number of delete requests issued, whatever their outcome.
    pub deleted: usize,
}

pub struct Drainer<'a, S> {
    store: &'a S,
    options: DrainOptions,
}

impl<'a, S: RecordStore> Drainer<'a, S> {
    pub fn new(store: &'a S, options: DrainOptions) -> Self {
        Self { store, options }
    }

    /// Lists and deletes until the store lists nothing for `collection`. Listings may be
    /// partial (paged or filtered server side), so the collection is re-listed after every
    /// delete pass rather than trusting a single listing.
    pub fn drain(&self, collection: Collection) -> Result<DrainReport, DrainError<S::Error>> {
        let mut report = DrainReport {
            collection,
            passes: 0,
            deleted: 0,
        };

        loop {
            let ids = self
                .store
                .list_ids(collection)
                .map_err(|source| DrainError::Store { collection, source })?;
            report.passes += 1;

            if ids.is_empty() {
                info!(
                    %collection,
                    passes = report.passes,
                    deleted = report.deleted,
                    "collection drained"
                );
                return Ok(report);
            }

            info!(%collection, pass = report.passes, records = ids.len(), "deleting records");
            for id in &ids {
                debug!(%collection, %id, "deleting record");
                self.store
                    .delete_by_id(collection, id)
                    .map_err(|source| DrainError::Store { collection, source })?;
                report.deleted += 1;
            }

            if let Some(limit) = self.options.max_passes {
                if report.passes >= limit.get() {
                    return Err(DrainError::PassLimitExceeded { collection, limit });
                }
            }
        }
    }
}

mod datastore;

pub use datastore::{DatastoreConfig, SyncMode};

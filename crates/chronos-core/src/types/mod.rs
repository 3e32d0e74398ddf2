pub mod field;
pub mod meta;
pub mod series;

pub use field::{Field, FieldId, FieldType, FieldValue};
pub use meta::{BackupInfo, QueryStats, StoreMeta, WriteInfo};
pub use series::{Point, SequenceNumber, Series, Timestamp};

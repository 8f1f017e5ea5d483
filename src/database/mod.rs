pub mod manager;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use manager::{AccessHandles, DatabaseManager, ElevatedAccess};
pub use memory::{MemoryStore, StoreCall};
pub use postgres::PgRecordStore;
pub use record::{Record, RecordError};
pub use store::{row_id, Inserted, InsertedAll, NewRow, RecordStore, Row, StoreError};

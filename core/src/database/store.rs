use async_trait::async_trait;

use crate::loader::RawRecord;

/// The single connection and transaction context the load loop writes through.
///
/// An implementation owns one open transaction at a time: `insert_raw_record` opens it
/// when needed, `commit` closes it and `rollback` discards whatever is not committed yet.
/// A failed insert must leave the transaction usable for the next insert.
#[async_trait]
pub trait RawRecordStore: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn insert_raw_record(&mut self, record: &RawRecord) -> Result<(), Self::Error>;

    async fn commit(&mut self) -> Result<(), Self::Error>;

    async fn rollback(&mut self) -> Result<(), Self::Error>;

    /// Releases the connection. Dropping the store releases it too, without waiting.
    async fn close(self)
    where
        Self: Sized;
}

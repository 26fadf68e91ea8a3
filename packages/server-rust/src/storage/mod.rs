//! Persistence layer: the abstract gateway trait and the in-memory
//! implementation used by tests and development.

pub mod gateway;
pub mod memory;

pub use gateway::{
    batch_chunk_size, PersistenceGateway, MAX_BIND_PARAMS, RECORD_COLUMNS, RECORD_SOURCE_COLUMNS,
};
pub use memory::MemoryGateway;

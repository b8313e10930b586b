pub mod config;
pub mod error;
pub mod index;
pub mod meta;
pub mod metadata;
pub mod output;
pub mod query;
pub mod storage;
pub mod util;

pub use self::{
    config::IndexConfig,
    error::Error,
    storage::{ChunkStorage, Store},
};

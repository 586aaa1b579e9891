//! Client-side persistence: a durable key-value store and the identity
//! kept in it.

pub mod identity;
pub mod kv;

pub use identity::{Identity, IdentityStore, TOKEN_KEY, USER_KEY};
pub use kv::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore, StoreFuture};

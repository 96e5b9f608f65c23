pub mod memory;
pub mod postgres;
pub mod redis;
pub mod store;

pub use memory::MemoryAvailabilityStore;
pub use postgres::{create_pool, PgAvailabilityStore};
pub use redis::create_redis_client;
pub use redis::CacheKey;
pub use redis::RedisAvailabilityStore;
pub use store::AvailabilityStore;

pub mod hashmap_store;
pub mod traits;

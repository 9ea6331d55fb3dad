pub mod client;
pub mod point;

pub use client::{Result, StoreClient, StoreError, UPSERT_CHUNK};
pub use point::{Filter, Payload, Point, Record, ScoredPoint};

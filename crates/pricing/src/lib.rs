//! USD price resolution: a strictly ordered cascade over three external
//! sources, fronted by a single-flight TTL cache.

pub mod cache;
pub mod error;
pub mod resolver;
pub mod sources;

pub use cache::{SharedCallError, SingleFlight};
pub use error::PriceError;
pub use resolver::PriceResolver;
pub use sources::{BulkPriceSource, SpotPriceSource, TokenPrice};

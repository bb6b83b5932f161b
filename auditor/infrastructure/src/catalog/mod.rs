pub mod static_pairs;

pub use static_pairs::{StaticPairCatalog, StaticPairCatalogParameters};

pub mod core;
pub mod delivery;
pub mod observability;
pub mod resolver;
pub mod storage;

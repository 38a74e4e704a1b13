pub mod cover;
pub mod filter;
pub mod manifest;
pub mod reconcile;
pub mod store;
pub mod title;
pub mod track;


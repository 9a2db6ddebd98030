pub mod catalog;
pub mod standardize;
pub mod store;
pub mod table;

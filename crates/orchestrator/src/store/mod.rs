pub mod core;
pub mod domains;

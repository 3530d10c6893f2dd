pub mod center;
pub mod models;

pub mod directory_store;
pub mod test_state_store;

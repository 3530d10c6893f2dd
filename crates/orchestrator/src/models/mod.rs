pub mod test_state;

pub mod common;

mod test_turns;

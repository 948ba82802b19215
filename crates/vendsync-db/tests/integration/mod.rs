pub mod common;
mod harvest_tests;
mod hub_tests;
mod target_tests;

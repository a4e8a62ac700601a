// Integration tests: full builds of small projects laid out in temp dirs

mod build_tests;
mod common;
mod license_tests;
mod resolution_tests;
mod stage_tests;
mod tree_shaking_tests;

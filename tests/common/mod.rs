#![allow(dead_code)]

pub mod programs;
pub mod testing;

pub use programs::*;
pub use testing::*;

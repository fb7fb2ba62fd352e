#![allow(unused_imports)]

// interface and supervisor are public because otherwise there isn't a great
// way to 'use' them for benchmarking.
pub mod interface;
pub mod supervisor;
pub mod tests;

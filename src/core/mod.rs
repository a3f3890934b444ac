pub mod cancel;
pub mod config;
pub mod context;
pub mod recorder;
pub mod segment;
pub mod segment_list;
pub mod stats;
pub mod timestamp;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

//! Services separating file access from the sample pipeline

pub mod io;

pub use io::ImageIOService;

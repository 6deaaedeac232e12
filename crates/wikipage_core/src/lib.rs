pub mod assemble;
pub mod client;
pub mod config;
pub mod error;
pub mod markup;
pub mod pages;
pub mod splitter;

#[cfg(test)]
mod proptests;

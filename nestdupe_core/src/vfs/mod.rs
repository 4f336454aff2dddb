pub mod archive;
pub mod handles;
pub mod pool;

#[cfg(test)]
mod tests_archive;

pub use archive::Stream;
pub use handles::{HandleCounter, Tracked};
pub use pool::{VirtualStream, VirtualStreamPool};

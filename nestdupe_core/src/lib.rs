pub mod vfs;
pub mod digest;
pub mod file_hash;
pub mod normalize;
pub mod image_hash;

pub use vfs::{HandleCounter, VirtualStream, VirtualStreamPool};
pub use digest::{KeepOpen, ProgressiveDigest};
pub use file_hash::{FileHash, FileHashFactory};
pub use normalize::{ImageScaler, ScaleImage};
pub use image_hash::{Fingerprint, FuzzyImageHash, ImageHash, ImageHashBuilder};

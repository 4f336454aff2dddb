use crate::normalize::{ImageScaler, ScaleImage};
use crate::vfs::VirtualStreamPool;
use image::{DynamicImage, GenericImageView};
use nestdupe_common::{ContentDigest, DedupConfig, DedupError, DigestAlgorithm, VfsError, VirtualPath};
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Exact image fingerprint: a digest of the normalized pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHash {
    pub width: u32,
    pub height: u32,
    pub hash_code: i32,
    pub digest: ContentDigest,
}

/// Near-duplicate image fingerprint over the raw normalized pixels.
#[derive(Debug, Clone)]
pub struct FuzzyImageHash {
    pub width: u32,
    pub height: u32,
    pub hash_code: i32,
    pub pixels: Vec<u8>,
    /// Largest tolerated per-element difference, as a fraction of 255.
    pub color_threshold: f32,
    /// Largest tolerated fraction of differing elements.
    pub count_threshold: f32,
}

impl FuzzyImageHash {
    /// Whether `other` is within both tolerances of `self`.
    ///
    /// The stricter of the two fingerprints' thresholds applies.
    pub fn matches(&self, other: &FuzzyImageHash) -> bool {
        if self.width != other.width
            || self.height != other.height
            || self.pixels.len() != other.pixels.len()
        {
            return false;
        }

        let color = self.color_threshold.min(other.color_threshold);
        let count = self.count_threshold.min(other.count_threshold);
        let max_diff = (color * 255.0).round() as u8;
        let max_count = (count as f64 * self.pixels.len() as f64).floor() as usize;

        let mut differing = 0usize;
        for (a, b) in self.pixels.iter().zip(&other.pixels) {
            let diff = a.abs_diff(*b);
            if diff == 0 {
                continue;
            }
            if diff > max_diff {
                return false;
            }
            differing += 1;
            if differing > max_count {
                return false;
            }
        }
        true
    }
}

/// Image fingerprint of either flavor.
///
/// Fingerprints of different dimensions or different flavors are never
/// equal. `Hash` only feeds the precomputed hash code, so near-duplicate
/// fuzzy fingerprints land in the same bucket.
#[derive(Debug, Clone)]
pub enum Fingerprint {
    Exact(ImageHash),
    Fuzzy(FuzzyImageHash),
}

impl Fingerprint {
    pub fn width(&self) -> u32 {
        match self {
            Fingerprint::Exact(hash) => hash.width,
            Fingerprint::Fuzzy(hash) => hash.width,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Fingerprint::Exact(hash) => hash.height,
            Fingerprint::Fuzzy(hash) => hash.height,
        }
    }

    pub fn hash_code(&self) -> i32 {
        match self {
            Fingerprint::Exact(hash) => hash.hash_code,
            Fingerprint::Fuzzy(hash) => hash.hash_code,
        }
    }

    pub fn is_fuzzy(&self) -> bool {
        matches!(self, Fingerprint::Fuzzy(_))
    }
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Fingerprint::Exact(a), Fingerprint::Exact(b)) => a == b,
            (Fingerprint::Fuzzy(a), Fingerprint::Fuzzy(b)) => a.matches(b),
            _ => false,
        }
    }
}

impl Eq for Fingerprint {}

impl Hash for Fingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash_code().hash(state);
    }
}

/// `w*h + (w-h)`, wrapping like 32-bit integer arithmetic.
fn dimension_code(width: u32, height: u32) -> i32 {
    let (w, h) = (width as i32, height as i32);
    w.wrapping_mul(h).wrapping_add(w.wrapping_sub(h))
}

/// Polynomial hash over every signed digest byte, seeded with 1.
fn digest_code(digest: &ContentDigest) -> i32 {
    digest
        .as_bytes()
        .iter()
        .fold(1i32, |code, &byte| code.wrapping_mul(31).wrapping_add(byte as i8 as i32))
}

/// Builds image fingerprints with one fixed normalization.
pub struct ImageHashBuilder {
    scaler: Box<dyn ImageScaler>,
    gray: bool,
    color_threshold: f32,
    count_threshold: f32,
    algorithm: DigestAlgorithm,
    pool: VirtualStreamPool,
    built: AtomicUsize,
}

impl ImageHashBuilder {
    pub fn new(config: &DedupConfig, pool: VirtualStreamPool) -> Result<Self, DedupError> {
        config.image.validate()?;
        Ok(Self {
            scaler: Box::new(ScaleImage::from_config(&config.image)),
            gray: config.image.gray,
            color_threshold: config.image.color_threshold,
            count_threshold: config.image.count_threshold,
            algorithm: config.digest.algorithm()?,
            pool,
            built: AtomicUsize::new(0),
        })
    }

    /// Replace the normalization step.
    ///
    /// The scaler is expected to produce grayscale output when the builder
    /// was configured with `gray`.
    pub fn with_scaler(mut self, scaler: impl ImageScaler + 'static) -> Self {
        self.scaler = Box::new(scaler);
        self
    }

    /// Number of fingerprints built so far.
    pub fn built(&self) -> usize {
        self.built.load(Ordering::Relaxed)
    }

    /// Fingerprint of the image stored at `path`.
    ///
    /// A zero `len` yields `None` without opening the file. Failures to open
    /// the path are returned; unreadable or undecodable content is logged
    /// and yields `None`.
    pub fn build_from_path(
        &self,
        path: &VirtualPath,
        len: u64,
    ) -> Result<Option<Fingerprint>, VfsError> {
        if len == 0 {
            debug!("Skipping empty image {}", path);
            return Ok(None);
        }

        let mut stream = self.pool.open(path)?;
        let mut data = Vec::with_capacity(len.min(64 * 1024 * 1024) as usize);
        let read = stream.read_to_end(&mut data);
        stream.close();
        if let Err(e) = read {
            warn!("Cannot read image {}: {}", path, e);
            return Ok(None);
        }

        match image::load_from_memory(&data) {
            Ok(image) => Ok(Some(self.build(image))),
            Err(e) => {
                warn!("Cannot decode image {}: {}", path, DedupError::Decode(e.to_string()));
                Ok(None)
            }
        }
    }

    /// Fingerprint of a decoded image.
    pub fn build(&self, image: DynamicImage) -> Fingerprint {
        self.built.fetch_add(1, Ordering::Relaxed);

        let image = self.scaler.scale(image);
        let (width, height) = image.dimensions();
        let code = dimension_code(width, height);

        if self.color_threshold > 0.0 {
            let pixels = if self.gray {
                image.to_luma8().into_raw()
            } else {
                image.to_rgba8().into_raw()
            };
            return Fingerprint::Fuzzy(FuzzyImageHash {
                width,
                height,
                hash_code: code,
                pixels,
                color_threshold: self.color_threshold,
                count_threshold: self.count_threshold,
            });
        }

        let digest = self.algorithm.digest(image.to_rgba8().as_raw());
        Fingerprint::Exact(ImageHash {
            width,
            height,
            hash_code: code.wrapping_add(digest_code(&digest)),
            digest,
        })
    }
}

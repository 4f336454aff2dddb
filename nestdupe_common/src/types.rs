use crate::DedupError;
use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use std::fmt;
use std::str::FromStr;

/// Digest algorithms accepted for content identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DigestAlgorithm {
    #[default]
    Blake3,
    Sha256,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Blake3 => "blake3",
            DigestAlgorithm::Sha256 => "sha256",
        }
    }

    pub fn hasher(&self) -> ContentHasher {
        ContentHasher::new(*self)
    }

    /// One-shot digest of a byte buffer.
    pub fn digest(&self, data: &[u8]) -> ContentDigest {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }
}

impl FromStr for DigestAlgorithm {
    type Err = DedupError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "blake3" => Ok(DigestAlgorithm::Blake3),
            "sha256" => Ok(DigestAlgorithm::Sha256),
            _ => Err(DedupError::UnsupportedDigestAlgorithm(name.to_string())),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Digest value (32 bytes for every supported algorithm).
///
/// Ordering is lexicographic over the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentDigest(pub [u8; 32]);

impl ContentDigest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<blake3::Hash> for ContentDigest {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Running hash state that can be snapshotted without being consumed.
#[derive(Clone)]
pub enum ContentHasher {
    Blake3(Box<blake3::Hasher>),
    Sha256(sha2::Sha256),
}

impl ContentHasher {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Blake3 => ContentHasher::Blake3(Box::new(blake3::Hasher::new())),
            DigestAlgorithm::Sha256 => ContentHasher::Sha256(sha2::Sha256::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            ContentHasher::Blake3(hasher) => {
                hasher.update(data);
            }
            ContentHasher::Sha256(hasher) => hasher.update(data),
        }
    }

    /// Digest of everything fed so far; the state keeps accepting input.
    pub fn snapshot(&self) -> ContentDigest {
        self.clone().finalize()
    }

    pub fn finalize(self) -> ContentDigest {
        match self {
            ContentHasher::Blake3(hasher) => hasher.finalize().into(),
            ContentHasher::Sha256(hasher) => {
                let mut out = [0u8; 32];
                out.copy_from_slice(&hasher.finalize());
                ContentDigest(out)
            }
        }
    }
}

impl fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentHasher::Blake3(_) => f.write_str("ContentHasher::Blake3"),
            ContentHasher::Sha256(_) => f.write_str("ContentHasher::Sha256"),
        }
    }
}

/// Channel permutation applied to RGBA pixels during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelSwap {
    /// Identity
    #[default]
    Rgb,
    /// Rotate left
    Gbr,
    /// Rotate right
    Brg,
    Rg,
    Rb,
    Gb,
    /// Keep red, damp green and blue
    R,
    /// Keep green, damp red and blue
    G,
    /// Keep blue, damp red and green
    B,
}

impl ChannelSwap {
    /// Factor applied to the damped channels of the single-channel variants.
    pub const DAMPING: f64 = 0.53;

    pub fn name(&self) -> &'static str {
        match self {
            ChannelSwap::Rgb => "RGB",
            ChannelSwap::Gbr => "GBR",
            ChannelSwap::Brg => "BRG",
            ChannelSwap::Rg => "RG",
            ChannelSwap::Rb => "RB",
            ChannelSwap::Gb => "GB",
            ChannelSwap::R => "R",
            ChannelSwap::G => "G",
            ChannelSwap::B => "B",
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == ChannelSwap::Rgb
    }

    /// Map one RGBA pixel. Alpha is always preserved.
    pub fn apply(&self, [r, g, b, a]: [u8; 4]) -> [u8; 4] {
        let damp = |c: u8| (c as f64 * Self::DAMPING) as u8;
        match self {
            ChannelSwap::Rgb => [r, g, b, a],
            ChannelSwap::Gbr => [g, b, r, a],
            ChannelSwap::Brg => [b, r, g, a],
            ChannelSwap::Rg => [g, r, b, a],
            ChannelSwap::Rb => [b, g, r, a],
            ChannelSwap::Gb => [r, b, g, a],
            ChannelSwap::R => [r, damp(g), damp(b), a],
            ChannelSwap::G => [damp(r), g, damp(b), a],
            ChannelSwap::B => [damp(r), damp(g), b, a],
        }
    }
}

impl TryFrom<u8> for ChannelSwap {
    type Error = DedupError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => ChannelSwap::Rgb,
            1 => ChannelSwap::Gbr,
            2 => ChannelSwap::Brg,
            3 => ChannelSwap::Rg,
            4 => ChannelSwap::Rb,
            5 => ChannelSwap::Gb,
            6 => ChannelSwap::R,
            7 => ChannelSwap::G,
            8 => ChannelSwap::B,
            _ => {
                return Err(DedupError::Config(format!(
                    "channel swap code {} out of range 0..=8",
                    code
                )))
            }
        })
    }
}

/// Target-size rule used when normalizing an image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScaleDimension {
    /// Always produce exactly `width` x `height`.
    Fixed { width: u32, height: u32 },
    /// Keep the aspect ratio, growing to the minimum and shrinking to the maximum.
    Bounded {
        min_width: u32,
        min_height: u32,
        max_width: u32,
        max_height: u32,
        ratio: f64,
    },
}

impl ScaleDimension {
    /// Square bound used by the perceptual hash builder.
    pub fn bounded(min: u32, max: u32) -> Self {
        ScaleDimension::Bounded {
            min_width: min,
            min_height: min,
            max_width: max,
            max_height: max,
            ratio: 1.0,
        }
    }

    pub fn transform(&self, (width, height): (u32, u32)) -> (u32, u32) {
        match *self {
            ScaleDimension::Fixed { width, height } => (width, height),
            ScaleDimension::Bounded {
                min_width,
                min_height,
                max_width,
                max_height,
                ratio,
            } => {
                if width == 0 || height == 0 {
                    return (width, height);
                }
                let (w, h) = (width as f64, height as f64);
                let mut ratio = ratio;

                // grow
                ratio = ratio.max(min_width as f64 / w).max(min_height as f64 / h);
                // shrink
                ratio = ratio.min(max_width as f64 / w).min(max_height as f64 / h);

                if ratio == 1.0 {
                    return (width, height);
                }
                let scaled = |v: f64| ((v * ratio).round() as u32).max(1);
                (scaled(w), scaled(h))
            }
        }
    }
}

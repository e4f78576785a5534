//! Visual similarity matching.
//!
//! Images are compared through a 64-bit average hash computed over the raw
//! screenshot bytes, so the matcher is independent of the image encoding
//! the page driver produces. The threshold applies to image similarity
//! alone; bounding-box geometry only breaks ties between passing candidates,
//! so an element that moved or resized is still found.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use stepforge_types::element::ElementInfo;
use stepforge_types::error::PageError;
use stepforge_types::selector::{BoundingBox, VisualFingerprint};

use crate::page::BoxPage;

/// Geometry only orders candidates that already clear the image threshold.
/// One hash bit is worth 1/64, so this never outweighs a closer image.
const GEOMETRY_TIEBREAK: f64 = 0.01;

const HASH_BITS: usize = 64;

/// A candidate accepted by the visual matcher.
#[derive(Debug, Clone)]
pub struct VisualMatch {
    pub element: ElementInfo,
    /// Image similarity in `[0, 1]`.
    pub score: f64,
}

pub struct VisualMatcher {
    threshold: f64,
}

impl VisualMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Enumerate visible candidates and return the most similar one whose
    /// image similarity is at or above the threshold.
    pub async fn find_similar_element(
        &self,
        target: &VisualFingerprint,
        page: &BoxPage,
    ) -> Result<Option<VisualMatch>, PageError> {
        let Some(target_hash) = target_hash(target) else {
            tracing::debug!("visual fingerprint has neither screenshot nor hash, skipping");
            return Ok(None);
        };

        let candidates = page.query_all("*").await?;
        // Best (match, rank) among candidates whose image clears the threshold.
        let mut best: Option<(VisualMatch, f64)> = None;

        for candidate in candidates.into_iter().filter(|c| c.visible) {
            let image = page.screenshot(Some(&candidate)).await?;
            if image.is_empty() {
                continue;
            }
            let score = hash_similarity(target_hash, average_hash(&image));
            tracing::trace!(handle = %candidate.handle, score, "visual candidate scored");
            if score < self.threshold {
                continue;
            }

            let geometry = box_similarity(&target.bounding_box, &candidate.bounding_box);
            let rank = score + GEOMETRY_TIEBREAK * geometry;
            if best.as_ref().is_none_or(|(_, r)| rank > *r) {
                best = Some((
                    VisualMatch {
                        element: candidate,
                        score,
                    },
                    rank,
                ));
            }
        }

        Ok(best.map(|(m, _)| m))
    }

    /// Similarity of two raw images in `[0, 1]`.
    pub fn calculate_similarity(target_image: &[u8], candidate_image: &[u8]) -> f64 {
        if target_image.is_empty() || candidate_image.is_empty() {
            return 0.0;
        }
        hash_similarity(average_hash(target_image), average_hash(candidate_image))
    }
}

fn target_hash(target: &VisualFingerprint) -> Option<u64> {
    if let Some(encoded) = &target.screenshot {
        match BASE64.decode(encoded) {
            Ok(bytes) if !bytes.is_empty() => return Some(average_hash(&bytes)),
            Ok(_) => {}
            Err(e) => tracing::warn!("invalid base64 in visual fingerprint: {e}"),
        }
    }
    parse_hash(&target.visual_hash)
}

/// 64-bit average hash: split the bytes into 64 blocks and set bit `i` when
/// block `i` is brighter than the overall mean.
pub fn average_hash(bytes: &[u8]) -> u64 {
    if bytes.is_empty() {
        return 0;
    }
    let mut means = [0.0f64; HASH_BITS];
    for (i, mean) in means.iter_mut().enumerate() {
        let start = i * bytes.len() / HASH_BITS;
        let end = ((i + 1) * bytes.len() / HASH_BITS).max(start + 1).min(bytes.len());
        let block = &bytes[start.min(bytes.len() - 1)..end];
        let sum: u64 = block.iter().map(|&b| u64::from(b)).sum();
        *mean = sum as f64 / block.len() as f64;
    }
    let overall = means.iter().sum::<f64>() / HASH_BITS as f64;

    means
        .iter()
        .enumerate()
        .fold(0u64, |acc, (i, &m)| if m > overall { acc | (1 << i) } else { acc })
}

pub fn format_hash(hash: u64) -> String {
    format!("{hash:016x}")
}

pub fn parse_hash(hex: &str) -> Option<u64> {
    let hex = hex.trim();
    if hex.is_empty() {
        return None;
    }
    u64::from_str_radix(hex, 16).ok()
}

/// `1 - hamming(a, b) / 64`.
pub fn hash_similarity(a: u64, b: u64) -> f64 {
    1.0 - f64::from((a ^ b).count_ones()) / HASH_BITS as f64
}

/// Geometry similarity: half area ratio, half center proximity relative to
/// the larger box's diagonal.
pub fn box_similarity(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let (area_a, area_b) = (a.area(), b.area());
    if area_a <= 0.0 || area_b <= 0.0 {
        return 0.0;
    }
    let area_ratio = area_a.min(area_b) / area_a.max(area_b);

    let (ax, ay) = a.center();
    let (bx, by) = b.center();
    let distance = ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt();
    let diagonal = (a.width.max(b.width).powi(2) + a.height.max(b.height).powi(2)).sqrt();
    let proximity = (1.0 - distance / diagonal).max(0.0);

    0.5 * area_ratio + 0.5 * proximity
}

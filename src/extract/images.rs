//! Image URL harvesting with per-photo deduplication.
//!
//! The image host serves every photo at several sizes under the same
//! filename stem, e.g. `.../scaler/500/.../abc123.jpg` and
//! `.../scaler/100/.../abc123.jpg`. Raw page text is scanned token by token
//! and, for each filename stem, only the highest-resolution variant is kept.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::error::SessionError;
use crate::models::ImageReference;
use crate::scroll::SetExtractor;
use crate::session::Session;

fn scaler_size_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/scaler/(\d+)").expect("valid scaler size regex"))
}

/// Parse one URL into an [`ImageReference`]. The identity key is the
/// filename stem; the resolution hint is the scaler size segment, 0 when the
/// URL has none.
pub fn parse_image_reference(url: &str) -> Option<ImageReference> {
    let filename = url.rsplit('/').next()?;
    let identity_key = filename.split('.').next()?.to_string();
    if identity_key.is_empty() {
        return None;
    }

    let resolution_hint = scaler_size_regex()
        .captures(url)
        .and_then(|captures| captures[1].parse::<u32>().ok())
        .unwrap_or(0);

    Some(ImageReference {
        url: url.to_string(),
        identity_key,
        resolution_hint,
    })
}

/// True when `candidate` should replace `current` for the same identity key:
/// larger resolution wins, ties broken by descending raw URL ordering so the
/// choice is deterministic across runs.
fn supersedes(candidate: &ImageReference, current: &ImageReference) -> bool {
    (candidate.resolution_hint, candidate.url.as_str())
        > (current.resolution_hint, current.url.as_str())
}

/// Scan raw page text for image-host URLs and keep one reference per
/// identity key. Output order is not guaranteed stable across runs.
pub fn extract_best_image_urls(page_text: &str, host_prefix: &str) -> Vec<ImageReference> {
    let mut best: HashMap<String, ImageReference> = HashMap::new();

    for token in page_text.split_whitespace() {
        if !token.starts_with(host_prefix) {
            continue;
        }
        let Some(reference) = parse_image_reference(token) else {
            continue;
        };
        match best.entry(reference.identity_key.clone()) {
            Entry::Occupied(mut slot) => {
                if supersedes(&reference, slot.get()) {
                    slot.insert(reference);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(reference);
            }
        }
    }

    best.into_values().collect()
}

/// Extractor the scroll controller re-runs while paging through a gallery.
pub struct GalleryImageExtractor {
    host_prefix: String,
}

impl GalleryImageExtractor {
    pub fn new(host_prefix: impl Into<String>) -> Self {
        Self {
            host_prefix: host_prefix.into(),
        }
    }
}

#[async_trait]
impl SetExtractor for GalleryImageExtractor {
    type Item = ImageReference;

    async fn extract(
        &mut self,
        session: &mut dyn Session,
    ) -> Result<Vec<ImageReference>, SessionError> {
        let content = session.page_content().await?;
        Ok(extract_best_image_urls(&content, &self.host_prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "https://images.autotrader.com/";

    #[test]
    fn keeps_the_highest_resolution_per_photo() {
        let page = "\
            https://images.autotrader.com/scaler/100/80/images/abc123.jpg \
            https://images.autotrader.com/scaler/500/400/images/abc123.jpg \
            https://images.autotrader.com/scaler/250/200/images/def456.jpg";

        let mut refs = extract_best_image_urls(page, HOST);
        refs.sort_by(|a, b| a.identity_key.cmp(&b.identity_key));

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].identity_key, "abc123");
        assert_eq!(refs[0].resolution_hint, 500);
        assert!(refs[0].url.contains("/scaler/500/"));
        assert_eq!(refs[1].identity_key, "def456");
    }

    #[test]
    fn resolution_ties_break_by_descending_url() {
        let page = "\
            https://images.autotrader.com/scaler/500/a/abc123.jpg \
            https://images.autotrader.com/scaler/500/b/abc123.jpg";

        let refs = extract_best_image_urls(page, HOST);
        assert_eq!(refs.len(), 1);
        assert_eq!(
            refs[0].url,
            "https://images.autotrader.com/scaler/500/b/abc123.jpg"
        );
    }

    #[test]
    fn tokens_from_other_hosts_are_ignored() {
        let page = "https://cdn.example.com/scaler/500/abc123.jpg some text";
        assert!(extract_best_image_urls(page, HOST).is_empty());
    }

    #[test]
    fn missing_scaler_segment_means_zero_hint() {
        let reference =
            parse_image_reference("https://images.autotrader.com/images/abc123.jpg").unwrap();
        assert_eq!(reference.resolution_hint, 0);
        assert_eq!(reference.identity_key, "abc123");
    }
}

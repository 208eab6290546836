//! Marker layout: one evenly spaced target per language on a band near the top edge.
//!
//! All dimensions are expressed against a 500px reference resolution and scaled by
//! `min(width, height) / 500`, so strokes and markers grow linearly with the image.

use crate::anchor::Anchor;
use crate::icon::IconResolver;
use crate::types::{LanguageEntry, MarkerLayout, Point};
use futures::future::join_all;

const REFERENCE_RESOLUTION: f32 = 500.0;
/// Distance of the marker band from the top edge, before scaling.
const MARKER_BAND_OFFSET: f32 = 50.0;
/// Marker diameter before scaling.
pub const DEFAULT_MARKER_DIAMETER: f32 = 50.0;

/// Resolution normalization factor shared by every marker of a render.
pub fn scale_factor(width: u32, height: u32) -> f32 {
    width.min(height) as f32 / REFERENCE_RESOLUTION
}

/// Target positions for `count` markers across an image `width` pixels wide.
pub fn target_positions(width: u32, scale_factor: f32, count: usize) -> Vec<Point> {
    let spacing = width as f32 / (count + 1) as f32;
    let y = MARKER_BAND_OFFSET * scale_factor;
    (0..count)
        .map(|i| Point::new(spacing * (i + 1) as f32, y))
        .collect()
}

/// Computes marker layouts and joins them with resolved icons.
#[derive(Debug, Clone)]
pub struct LayoutEngine {
    marker_diameter: f32,
    icon_variant: Option<String>,
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER_DIAMETER)
    }
}

impl LayoutEngine {
    /// `marker_diameter` is the unscaled diameter at the 500px reference resolution.
    pub fn new(marker_diameter: f32) -> Self {
        Self {
            marker_diameter,
            icon_variant: None,
        }
    }

    /// Preferred icon style variant passed through to the resolver.
    pub fn with_icon_variant(mut self, variant: impl Into<String>) -> Self {
        self.icon_variant = Some(variant.into());
        self
    }

    /// Geometric layout only; every marker starts without an icon.
    ///
    /// Empty when there are no languages or no anchor.
    pub fn place(
        &self,
        width: u32,
        height: u32,
        anchor: Option<&Anchor>,
        languages: &[LanguageEntry],
    ) -> Vec<MarkerLayout> {
        let Some(anchor) = anchor else {
            return Vec::new();
        };
        if languages.is_empty() {
            return Vec::new();
        }

        let scale = scale_factor(width, height);
        let diameter = self.marker_diameter * scale;

        languages
            .iter()
            .zip(target_positions(width, scale, languages.len()))
            .map(|(lang, target)| MarkerLayout {
                identifier: lang.identifier.clone(),
                display_name: lang.display_name.clone(),
                usage_percent: lang.usage_percent,
                target,
                anchor: anchor.point(),
                scale_factor: scale,
                icon: None,
                marker_diameter: diameter,
            })
            .collect()
    }

    /// Full layout: places markers, then requests every icon concurrently.
    ///
    /// Returns only after all requests have settled. A failed request leaves that
    /// marker without an icon; it never affects the other markers.
    pub async fn layout<R>(
        &self,
        width: u32,
        height: u32,
        anchor: Option<&Anchor>,
        languages: &[LanguageEntry],
        resolver: &R,
    ) -> Vec<MarkerLayout>
    where
        R: IconResolver + ?Sized,
    {
        let mut markers = self.place(width, height, anchor, languages);
        if markers.is_empty() {
            return markers;
        }

        let variant = self.icon_variant.as_deref();
        let requests = markers
            .iter()
            .map(|marker| resolver.resolve(&marker.identifier, variant));
        let results = join_all(requests).await;

        let mut resolved = 0usize;
        for (marker, result) in markers.iter_mut().zip(results) {
            match result {
                Ok(icon) => {
                    marker.icon = Some(icon);
                    resolved += 1;
                }
                Err(e) => {
                    tracing::warn!(language = %marker.identifier, error = %e, "icon unavailable; using initials");
                }
            }
        }

        tracing::debug!(markers = markers.len(), resolved, "layout complete");
        markers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icon::{IconError, NoIcons};
    use crate::types::{BoundingBox, FaceRegion, Icon, Keypoint};
    use async_trait::async_trait;
    use image::RgbaImage;
    use std::sync::Arc;

    fn scenario_anchor() -> Anchor {
        let face = FaceRegion {
            bbox: BoundingBox { x: 380.0, y: 220.0, width: 100.0, height: 200.0 },
            keypoints: vec![
                Keypoint { x: 400.0, y: 300.0, role: None },
                Keypoint { x: 460.0, y: 300.0, role: None },
            ],
            confidence: 1.0,
        };
        Anchor::from_face(&face).unwrap()
    }

    fn langs(usages: &[(&str, f32)]) -> Vec<LanguageEntry> {
        usages
            .iter()
            .map(|(id, pct)| LanguageEntry::new(*id, *id, *pct))
            .collect()
    }

    #[test]
    fn test_scale_factor_reference() {
        assert_eq!(scale_factor(500, 500), 1.0);
        assert_eq!(scale_factor(1000, 800), 1.6);
        assert_eq!(scale_factor(2000, 1600), 2.0 * scale_factor(1000, 800));
    }

    #[test]
    fn test_scenario_1000x800() {
        let anchor = scenario_anchor();
        assert_eq!(anchor.point(), Point::new(430.0, 220.0));

        let engine = LayoutEngine::default();
        let markers = engine.place(
            1000,
            800,
            Some(&anchor),
            &langs(&[("rust", 50.0), ("go", 30.0), ("c", 20.0)]),
        );

        let xs: Vec<f32> = markers.iter().map(|m| m.target.x).collect();
        assert_eq!(xs, vec![250.0, 500.0, 750.0]);
        for m in &markers {
            assert!((m.target.y - 80.0).abs() < 1e-4);
            assert!((m.scale_factor - 1.6).abs() < 1e-6);
            assert!((m.marker_diameter - 80.0).abs() < 1e-4);
            assert_eq!(m.anchor, anchor.point());
        }
    }

    #[test]
    fn test_targets_evenly_spaced_in_order() {
        let anchor = scenario_anchor();
        let input = langs(&[("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0), ("e", 5.0), ("f", 6.0)]);
        let markers = LayoutEngine::default().place(1400, 900, Some(&anchor), &input);

        let n = input.len() as f32;
        for (i, (m, lang)) in markers.iter().zip(&input).enumerate() {
            assert_eq!(m.identifier, lang.identifier);
            let expected = 1400.0 / (n + 1.0) * (i + 1) as f32;
            assert!((m.target.x - expected).abs() < 1e-3);
            assert_eq!(m.target.y, markers[0].target.y);
        }
        assert!(markers.windows(2).all(|w| w[0].target.x < w[1].target.x));
    }

    #[test]
    fn test_empty_languages_yield_empty_layout() {
        let anchor = scenario_anchor();
        assert!(LayoutEngine::default().place(1000, 800, Some(&anchor), &[]).is_empty());
    }

    #[test]
    fn test_missing_anchor_yields_empty_layout() {
        let input = langs(&[("rust", 100.0)]);
        assert!(LayoutEngine::default().place(1000, 800, None, &input).is_empty());
    }

    /// Resolves every language except one.
    struct FailingOne(&'static str);

    #[async_trait]
    impl IconResolver for FailingOne {
        async fn resolve(&self, identifier: &str, _variant: Option<&str>) -> Result<Icon, IconError> {
            if identifier == self.0 {
                tokio::task::yield_now().await;
                Err(IconError::Fetch("503".into()))
            } else {
                Ok(Arc::new(RgbaImage::new(4, 4)))
            }
        }
    }

    #[tokio::test]
    async fn test_one_failed_icon_of_five() {
        let anchor = scenario_anchor();
        let input = langs(&[("rust", 40.0), ("go", 20.0), ("zig", 15.0), ("c", 15.0), ("lua", 10.0)]);
        let markers = LayoutEngine::default()
            .layout(1000, 800, Some(&anchor), &input, &FailingOne("zig"))
            .await;

        assert_eq!(markers.len(), 5);
        let with_icon: Vec<&str> = markers
            .iter()
            .filter(|m| m.icon.is_some())
            .map(|m| m.identifier.as_str())
            .collect();
        assert_eq!(with_icon, vec!["rust", "go", "c", "lua"]);
        assert!(markers[2].icon.is_none());
    }

    #[tokio::test]
    async fn test_no_icons_resolver_keeps_all_markers() {
        let anchor = scenario_anchor();
        let input = langs(&[("rust", 70.0), ("go", 30.0)]);
        let markers = LayoutEngine::default()
            .layout(600, 600, Some(&anchor), &input, &NoIcons)
            .await;
        assert_eq!(markers.len(), 2);
        assert!(markers.iter().all(|m| m.icon.is_none()));
    }

    /// Every request takes the same fixed time.
    struct SlowIcons(std::time::Duration);

    #[async_trait]
    impl IconResolver for SlowIcons {
        async fn resolve(&self, _identifier: &str, _variant: Option<&str>) -> Result<Icon, IconError> {
            tokio::time::sleep(self.0).await;
            Ok(Arc::new(RgbaImage::new(4, 4)))
        }
    }

    #[tokio::test]
    async fn test_icon_requests_run_concurrently() {
        let anchor = scenario_anchor();
        let input = langs(&[("rust", 40.0), ("go", 20.0), ("zig", 15.0), ("c", 15.0), ("lua", 10.0)]);
        let resolver = SlowIcons(std::time::Duration::from_millis(200));

        let started = std::time::Instant::now();
        let markers = LayoutEngine::default()
            .layout(1000, 800, Some(&anchor), &input, &resolver)
            .await;
        let elapsed = started.elapsed();

        assert!(markers.iter().all(|m| m.icon.is_some()));
        // Sequential resolution would take a full second.
        assert!(elapsed < std::time::Duration::from_millis(400), "layout took {elapsed:?}");
    }
}

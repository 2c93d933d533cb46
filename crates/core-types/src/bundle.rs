//! Locator bundles - recorded element fingerprints

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Immutable snapshot of an element's identifying attributes.
///
/// Captured once at record time and never mutated afterwards; refinements are
/// expressed by [`LocatorBundle::merged`], which produces a new bundle.
///
/// For any non-navigation step at least one of `xpath`, `id` or `css` should
/// be present; resolution still works without them but quality degrades to
/// the content/positional strategies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocatorBundle {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub placeholder: Option<String>,
    pub aria: Option<String>,
    pub data_attrs: BTreeMap<String, String>,
    pub text: Option<String>,
    pub css: Option<String>,
    pub xpath: Option<String>,
    pub classes: Vec<String>,
    pub page_url: Option<String>,
    pub bounding: Option<BoundingBox>,
    pub iframe_chain: Option<Vec<FrameDescriptor>>,
    pub shadow_hosts: Option<Vec<String>>,
}

impl LocatorBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when one of the primary anchors (xpath, id, css) is recorded.
    pub fn has_primary_anchor(&self) -> bool {
        self.xpath.is_some() || self.id.is_some() || self.css.is_some()
    }

    /// True when no attribute of the bundle can drive any strategy.
    pub fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.id.is_none()
            && self.name.is_none()
            && self.placeholder.is_none()
            && self.aria.is_none()
            && self.data_attrs.is_empty()
            && self.text.is_none()
            && self.css.is_none()
            && self.xpath.is_none()
            && self.classes.is_empty()
            && self.bounding.is_none()
    }

    /// Merge `other` over `self` into a new bundle; fields present in `other`
    /// win, absent fields keep the receiver's value.
    pub fn merged(&self, other: &LocatorBundle) -> LocatorBundle {
        let mut out = self.clone();
        macro_rules! take {
            ($field:ident) => {
                if other.$field.is_some() {
                    out.$field = other.$field.clone();
                }
            };
        }
        take!(tag);
        take!(id);
        take!(name);
        take!(placeholder);
        take!(aria);
        take!(text);
        take!(css);
        take!(xpath);
        take!(page_url);
        take!(bounding);
        take!(iframe_chain);
        take!(shadow_hosts);
        for (k, v) in &other.data_attrs {
            out.data_attrs.insert(k.clone(), v.clone());
        }
        if !other.classes.is_empty() {
            out.classes = other.classes.clone();
        }
        out
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn with_aria(mut self, aria: impl Into<String>) -> Self {
        self.aria = Some(aria.into());
        self
    }

    pub fn with_data_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data_attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_css(mut self, css: impl Into<String>) -> Self {
        self.css = Some(css.into());
        self
    }

    pub fn with_xpath(mut self, xpath: impl Into<String>) -> Self {
        self.xpath = Some(xpath.into());
        self
    }

    pub fn with_classes(mut self, classes: Vec<String>) -> Self {
        self.classes = classes;
        self
    }

    pub fn with_bounding(mut self, bounding: BoundingBox) -> Self {
        self.bounding = Some(bounding);
        self
    }

    pub fn with_iframe_chain(mut self, chain: Vec<FrameDescriptor>) -> Self {
        self.iframe_chain = Some(chain);
        self
    }

    pub fn with_shadow_hosts(mut self, hosts: Vec<String>) -> Self {
        self.shadow_hosts = Some(hosts);
        self
    }
}

/// Recorded element geometry in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Euclidean distance between the two box centers.
    pub fn distance_to(&self, other: &BoundingBox) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }
}

/// One entry of a recorded iframe chain, outermost frame first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrameDescriptor {
    pub id: Option<String>,
    pub name: Option<String>,
    pub src: Option<String>,
    pub index: Option<usize>,
}

impl FrameDescriptor {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bundle_reports_empty() {
        let bundle = LocatorBundle::new();
        assert!(bundle.is_empty());
        assert!(!bundle.has_primary_anchor());
    }

    #[test]
    fn primary_anchor_detection() {
        assert!(LocatorBundle::new().with_id("username").has_primary_anchor());
        assert!(LocatorBundle::new().with_css("#u").has_primary_anchor());
        assert!(LocatorBundle::new()
            .with_xpath("//*[@id='u']")
            .has_primary_anchor());
        assert!(!LocatorBundle::new().with_text("Submit").has_primary_anchor());
    }

    #[test]
    fn merged_prefers_other_and_leaves_originals_alone() {
        let base = LocatorBundle::new()
            .with_id("old")
            .with_text("Submit")
            .with_data_attr("data-testid", "send");
        let patch = LocatorBundle::new()
            .with_id("new")
            .with_data_attr("data-qa", "send-btn");

        let merged = base.merged(&patch);
        assert_eq!(merged.id.as_deref(), Some("new"));
        assert_eq!(merged.text.as_deref(), Some("Submit"));
        assert_eq!(merged.data_attrs.len(), 2);
        // inputs untouched
        assert_eq!(base.id.as_deref(), Some("old"));
        assert_eq!(patch.text, None);
    }

    #[test]
    fn bounding_box_distance() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(3.0, 4.0, 10.0, 10.0);
        assert!((a.distance_to(&b) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bundle_serde_round_trip_uses_camel_case() {
        let bundle = LocatorBundle::new()
            .with_id("username")
            .with_xpath("//*[@id='username']");
        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["pageUrl"], serde_json::Value::Null);
        let back: LocatorBundle = serde_json::from_value(json).unwrap();
        assert_eq!(back, bundle);
    }
}

//! Hazard taxonomy.
//!
//! Producers report free-form labels (model class names, class indices,
//! ad-hoc strings). Durable records always carry one of the closed set of
//! [`HazardCategory`] values; [`normalize_category`] is the only mapping.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of road hazard categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HazardCategory {
    #[serde(rename = "Severe Pothole")]
    SeverePothole,
    #[serde(rename = "Deep Pothole")]
    DeepPothole,
    #[serde(rename = "Minor Pothole")]
    MinorPothole,
    #[serde(rename = "Asphalt Crack")]
    AsphaltCrack,
    #[serde(rename = "Manhole Depression")]
    ManholeDepression,
    #[serde(rename = "Road Edge Erosion")]
    RoadEdgeErosion,
    #[serde(rename = "Surface Damage")]
    SurfaceDamage,
    #[serde(rename = "Water Damage")]
    WaterDamage,
}

impl HazardCategory {
    pub const ALL: [HazardCategory; 8] = [
        HazardCategory::SeverePothole,
        HazardCategory::DeepPothole,
        HazardCategory::MinorPothole,
        HazardCategory::AsphaltCrack,
        HazardCategory::ManholeDepression,
        HazardCategory::RoadEdgeErosion,
        HazardCategory::SurfaceDamage,
        HazardCategory::WaterDamage,
    ];

    /// Category used when a label matches nothing.
    pub const FALLBACK: HazardCategory = HazardCategory::SurfaceDamage;

    pub fn label(&self) -> &'static str {
        match self {
            HazardCategory::SeverePothole => "Severe Pothole",
            HazardCategory::DeepPothole => "Deep Pothole",
            HazardCategory::MinorPothole => "Minor Pothole",
            HazardCategory::AsphaltCrack => "Asphalt Crack",
            HazardCategory::ManholeDepression => "Manhole Depression",
            HazardCategory::RoadEdgeErosion => "Road Edge Erosion",
            HazardCategory::SurfaceDamage => "Surface Damage",
            HazardCategory::WaterDamage => "Water Damage",
        }
    }

    /// Model class index used by the reference detector, if any.
    fn from_class_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(HazardCategory::SeverePothole),
            1 => Some(HazardCategory::MinorPothole),
            2 => Some(HazardCategory::AsphaltCrack),
            3 => Some(HazardCategory::ManholeDepression),
            4 => Some(HazardCategory::RoadEdgeErosion),
            5 => Some(HazardCategory::SurfaceDamage),
            6 => Some(HazardCategory::WaterDamage),
            _ => None,
        }
    }
}

impl fmt::Display for HazardCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered severity. Missing or unknown severities default to `Medium`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    /// Lenient parse of producer severities.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" | "minor" => Some(Severity::Low),
            "medium" | "moderate" | "med" => Some(Severity::Medium),
            "high" | "severe" | "critical" => Some(Severity::High),
            _ => None,
        }
    }

    pub fn parse_or_default(raw: Option<&str>) -> Self {
        raw.and_then(Severity::parse).unwrap_or_default()
    }
}

/// Map any producer label onto the closed taxonomy.
///
/// Total and deterministic: exact names and class indices first, then
/// keyword matching, then [`HazardCategory::FALLBACK`].
///
/// # Examples
///
/// ```
/// use edgewatch::persistence::{normalize_category, HazardCategory};
///
/// assert_eq!(normalize_category("pothole"), HazardCategory::SeverePothole);
/// assert_eq!(normalize_category("asphalt_crack"), HazardCategory::AsphaltCrack);
/// assert_eq!(normalize_category("2"), HazardCategory::AsphaltCrack);
/// assert_eq!(normalize_category("banana"), HazardCategory::SurfaceDamage);
/// ```
pub fn normalize_category(raw: &str) -> HazardCategory {
    let key = canonical_key(raw);
    if key.is_empty() {
        return HazardCategory::FALLBACK;
    }

    if let Ok(index) = key.parse::<u32>() {
        return HazardCategory::from_class_index(index).unwrap_or(HazardCategory::FALLBACK);
    }

    if let Some(category) = HazardCategory::ALL
        .iter()
        .find(|c| canonical_key(c.label()) == key)
    {
        return *category;
    }

    match key.as_str() {
        "pothole" | "potholes" => return HazardCategory::SeverePothole,
        "crack" | "cracks" => return HazardCategory::AsphaltCrack,
        "damage" => return HazardCategory::SurfaceDamage,
        _ => {}
    }

    let has = |word: &str| key.split(' ').any(|w| w.starts_with(word));
    if has("pothole") {
        if has("deep") {
            HazardCategory::DeepPothole
        } else if has("minor") || has("small") || has("shallow") {
            HazardCategory::MinorPothole
        } else {
            HazardCategory::SeverePothole
        }
    } else if has("crack") || has("fissure") {
        HazardCategory::AsphaltCrack
    } else if has("manhole") || has("depression") || has("sunken") {
        HazardCategory::ManholeDepression
    } else if has("erosion") || has("edge") || has("shoulder") {
        HazardCategory::RoadEdgeErosion
    } else if has("water") || has("flood") || has("puddle") {
        HazardCategory::WaterDamage
    } else {
        HazardCategory::FALLBACK
    }
}

/// Lowercase, with `_`, `-` and runs of whitespace collapsed to single spaces.
fn canonical_key(raw: &str) -> String {
    raw.to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

//! Maps free-text locations and listing URLs onto the fixed district set.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

const DEFAULT_SUB_AREAS: &str = include_str!("../data/sub_areas.toml");

/// Administrative district of a listing. `Other` when nothing matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum District {
    Colombo,
    Gampaha,
    Kalutara,
    Kandy,
    Matale,
    NuwaraEliya,
    Galle,
    Matara,
    Hambantota,
    Jaffna,
    Kilinochchi,
    Mannar,
    Vavuniya,
    Mullaitivu,
    Batticaloa,
    Ampara,
    Trincomalee,
    Kurunegala,
    Puttalam,
    Anuradhapura,
    Polonnaruwa,
    Badulla,
    Monaragala,
    Ratnapura,
    Kegalle,
    Negombo,
    Other,
}

impl District {
    /// The named districts in matching order; `Other` is not included.
    pub const ALL: [District; 26] = [
        District::Colombo,
        District::Gampaha,
        District::Kalutara,
        District::Kandy,
        District::Matale,
        District::NuwaraEliya,
        District::Galle,
        District::Matara,
        District::Hambantota,
        District::Jaffna,
        District::Kilinochchi,
        District::Mannar,
        District::Vavuniya,
        District::Mullaitivu,
        District::Batticaloa,
        District::Ampara,
        District::Trincomalee,
        District::Kurunegala,
        District::Puttalam,
        District::Anuradhapura,
        District::Polonnaruwa,
        District::Badulla,
        District::Monaragala,
        District::Ratnapura,
        District::Kegalle,
        District::Negombo,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            District::Colombo => "Colombo",
            District::Gampaha => "Gampaha",
            District::Kalutara => "Kalutara",
            District::Kandy => "Kandy",
            District::Matale => "Matale",
            District::NuwaraEliya => "Nuwara Eliya",
            District::Galle => "Galle",
            District::Matara => "Matara",
            District::Hambantota => "Hambantota",
            District::Jaffna => "Jaffna",
            District::Kilinochchi => "Kilinochchi",
            District::Mannar => "Mannar",
            District::Vavuniya => "Vavuniya",
            District::Mullaitivu => "Mullaitivu",
            District::Batticaloa => "Batticaloa",
            District::Ampara => "Ampara",
            District::Trincomalee => "Trincomalee",
            District::Kurunegala => "Kurunegala",
            District::Puttalam => "Puttalam",
            District::Anuradhapura => "Anuradhapura",
            District::Polonnaruwa => "Polonnaruwa",
            District::Badulla => "Badulla",
            District::Monaragala => "Monaragala",
            District::Ratnapura => "Ratnapura",
            District::Kegalle => "Kegalle",
            District::Negombo => "Negombo",
            District::Other => "Other",
        }
    }

    /// Case-insensitive lookup by display name, including "Other".
    pub fn from_name(name: &str) -> Option<District> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("other") {
            return Some(District::Other);
        }
        District::ALL
            .iter()
            .copied()
            .find(|d| d.name().eq_ignore_ascii_case(name))
    }

    /// Location quality tier: 1 is the most expensive area, 4 the least.
    pub fn tier(&self) -> u8 {
        match self {
            District::Colombo => 1,
            District::Gampaha
            | District::Kalutara
            | District::Kandy
            | District::Galle
            | District::Matara => 2,
            District::Kurunegala
            | District::Ratnapura
            | District::Trincomalee
            | District::Puttalam
            | District::Kegalle
            | District::Negombo => 3,
            _ => 4,
        }
    }

    fn slug(&self) -> String {
        self.name().to_lowercase().replace(' ', "-")
    }
}

impl fmt::Display for District {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for District {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for District {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(District::from_name(&raw).unwrap_or(District::Other))
    }
}

#[derive(Debug, Deserialize)]
struct SubAreaFile {
    #[serde(default)]
    district: Vec<SubAreaGroup>,
}

#[derive(Debug, Deserialize)]
struct SubAreaGroup {
    name: String,
    areas: Vec<String>,
}

/// Resolves a location string and listing URL to a district.
///
/// Signals are tried from most to least structured: the location naming a
/// district, a known town inside the location, the district in the URL
/// slug, and finally `Other`.
#[derive(Debug, Clone)]
pub struct DistrictResolver {
    sub_areas: Vec<(String, District)>,
}

impl DistrictResolver {
    /// Resolver backed by the bundled sub-area table.
    pub fn bundled() -> Result<Self> {
        Self::from_toml(DEFAULT_SUB_AREAS).context("Bundled sub-area table is invalid")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let file: SubAreaFile = toml::from_str(content)?;
        let mut sub_areas = Vec::new();
        for group in file.district {
            let district = District::from_name(&group.name)
                .filter(|d| *d != District::Other)
                .ok_or_else(|| anyhow::anyhow!("unknown district '{}'", group.name))?;
            for area in group.areas {
                let area = area.trim().to_lowercase();
                if !area.is_empty() {
                    sub_areas.push((area, district));
                }
            }
        }
        debug!(entries = sub_areas.len(), "Loaded sub-area table");
        Ok(Self { sub_areas })
    }

    pub fn resolve(&self, location: &str, url: &str) -> District {
        let loc = location.trim().to_lowercase();
        let url = url.to_lowercase();

        if !loc.is_empty() {
            for district in District::ALL {
                if loc.starts_with(&district.name().to_lowercase()) {
                    return district;
                }
            }

            for (area, district) in &self.sub_areas {
                if loc.contains(area.as_str()) {
                    return *district;
                }
            }
        }

        for district in District::ALL {
            let slug = district.slug();
            if url.contains(&format!("-{}", slug)) || url.contains(&format!("/{}", slug)) {
                return district;
            }
        }

        District::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> DistrictResolver {
        DistrictResolver::bundled().unwrap()
    }

    #[test]
    fn location_naming_a_district_wins() {
        let r = resolver();
        assert_eq!(r.resolve("Kandy", ""), District::Kandy);
        assert_eq!(r.resolve("colombo 7", ""), District::Colombo);
        assert_eq!(r.resolve("Nuwara Eliya City", ""), District::NuwaraEliya);
    }

    #[test]
    fn district_prefix_beats_sub_area_table() {
        // "negombo" is a Gampaha town in the table but also a district name.
        assert_eq!(resolver().resolve("Negombo", ""), District::Negombo);
    }

    #[test]
    fn sub_area_maps_to_parent_district() {
        let r = resolver();
        assert_eq!(r.resolve("Piliyandala", ""), District::Colombo);
        assert_eq!(r.resolve("Near Ja-Ela junction", ""), District::Gampaha);
        assert_eq!(r.resolve("Hikkaduwa", "https://ikman.lk/en/ad/x-kandy"), District::Galle);
    }

    #[test]
    fn url_slug_used_when_location_is_unknown() {
        let r = resolver();
        assert_eq!(
            r.resolve("", "https://ikman.lk/en/ad/house-for-sale-in-matale"),
            District::Matale
        );
        assert_eq!(
            r.resolve("Somewhere", "https://ikman.lk/en/ad/land-nuwara-eliya-123"),
            District::NuwaraEliya
        );
    }

    #[test]
    fn falls_back_to_other() {
        let r = resolver();
        assert_eq!(r.resolve("", ""), District::Other);
        assert_eq!(r.resolve("Unknown village", "https://ikman.lk/en/ad/1234"), District::Other);
    }

    #[test]
    fn resolution_is_total_and_idempotent() {
        let r = resolver();
        let inputs = [
            ("Dehiwala", "https://ikman.lk/en/ad/a"),
            ("", "https://ikman.lk/en/ad/b-galle"),
            ("???", ""),
        ];
        for (loc, url) in inputs {
            let first = r.resolve(loc, url);
            assert_eq!(first, r.resolve(loc, url));
            assert!(first == District::Other || District::ALL.contains(&first));
        }
    }

    #[test]
    fn tiers_follow_location_quality() {
        assert_eq!(District::Colombo.tier(), 1);
        assert_eq!(District::Galle.tier(), 2);
        assert_eq!(District::Negombo.tier(), 3);
        assert_eq!(District::Jaffna.tier(), 4);
        assert_eq!(District::Other.tier(), 4);
    }

    #[test]
    fn unknown_district_in_table_is_rejected() {
        let toml = "[[district]]\nname = \"Atlantis\"\nareas = [\"x\"]\n";
        assert!(DistrictResolver::from_toml(toml).is_err());
    }

    #[test]
    fn serializes_as_display_name() {
        assert_eq!(District::NuwaraEliya.to_string(), "Nuwara Eliya");
        assert_eq!(District::from_name("nuwara eliya"), Some(District::NuwaraEliya));
        assert_eq!(District::from_name("Other"), Some(District::Other));
    }
}

//! Region catalog
//!
//! Relay nodes are assigned to the voice regions they serve. The catalog is a
//! fixed list; anything outside it is rejected with
//! [`RelayError::RegionNotFound`].

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A voice region served by relay nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Region {
    Amsterdam,
    Brazil,
    EuCentral,
    EuWest,
    Frankfurt,
    Hongkong,
    Japan,
    London,
    Russia,
    Singapore,
    Southafrica,
    Sydney,
    UsCentral,
    UsEast,
    UsSouth,
    UsWest,
    VipAmsterdam,
    VipUsEast,
    VipUsWest,
}

impl Region {
    /// Every known region, in catalog order
    pub const ALL: [Region; 19] = [
        Region::Amsterdam,
        Region::Brazil,
        Region::EuCentral,
        Region::EuWest,
        Region::Frankfurt,
        Region::Hongkong,
        Region::Japan,
        Region::London,
        Region::Russia,
        Region::Singapore,
        Region::Southafrica,
        Region::Sydney,
        Region::UsCentral,
        Region::UsEast,
        Region::UsSouth,
        Region::UsWest,
        Region::VipAmsterdam,
        Region::VipUsEast,
        Region::VipUsWest,
    ];

    /// Catalog identifier of this region
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amsterdam => "amsterdam",
            Self::Brazil => "brazil",
            Self::EuCentral => "eu-central",
            Self::EuWest => "eu-west",
            Self::Frankfurt => "frankfurt",
            Self::Hongkong => "hongkong",
            Self::Japan => "japan",
            Self::London => "london",
            Self::Russia => "russia",
            Self::Singapore => "singapore",
            Self::Southafrica => "southafrica",
            Self::Sydney => "sydney",
            Self::UsCentral => "us-central",
            Self::UsEast => "us-east",
            Self::UsSouth => "us-south",
            Self::UsWest => "us-west",
            Self::VipAmsterdam => "vip-amsterdam",
            Self::VipUsEast => "vip-us-east",
            Self::VipUsWest => "vip-us-west",
        }
    }
}

impl FromStr for Region {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        Region::ALL
            .iter()
            .copied()
            .find(|region| region.as_str() == s)
            .ok_or_else(|| RelayError::RegionNotFound(s.to_string()))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, deduplicated set of regions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Region>", into = "Vec<Region>")]
pub struct RegionSet {
    regions: Vec<Region>,
}

impl From<Vec<Region>> for RegionSet {
    fn from(regions: Vec<Region>) -> Self {
        Self::from_regions(regions)
    }
}

impl From<RegionSet> for Vec<Region> {
    fn from(set: RegionSet) -> Self {
        set.regions
    }
}

const EU: &[Region] = &[
    Region::Amsterdam,
    Region::EuCentral,
    Region::EuWest,
    Region::Frankfurt,
    Region::London,
    Region::Russia,
    Region::VipAmsterdam,
];

const US: &[Region] = &[
    Region::UsCentral,
    Region::UsEast,
    Region::UsSouth,
    Region::UsWest,
    Region::VipUsEast,
    Region::VipUsWest,
];

const AMERICA: &[Region] = &[
    Region::UsCentral,
    Region::UsEast,
    Region::UsSouth,
    Region::UsWest,
    Region::VipUsEast,
    Region::VipUsWest,
    Region::Brazil,
];

const AFRICA: &[Region] = &[Region::Southafrica];

const ASIA: &[Region] = &[Region::Hongkong, Region::Japan, Region::Singapore];

const OCEANIA: &[Region] = &[Region::Sydney];

const HALF_ONE: &[Region] = &[
    Region::Amsterdam,
    Region::Brazil,
    Region::EuCentral,
    Region::EuWest,
    Region::Frankfurt,
    Region::London,
    Region::Southafrica,
    Region::UsEast,
    Region::VipAmsterdam,
    Region::VipUsEast,
];

const HALF_TWO: &[Region] = &[
    Region::Hongkong,
    Region::Japan,
    Region::Russia,
    Region::Singapore,
    Region::Sydney,
    Region::UsCentral,
    Region::UsSouth,
    Region::UsWest,
    Region::VipUsWest,
];

const THIRD_ONE: &[Region] = &[
    Region::Amsterdam,
    Region::EuCentral,
    Region::EuWest,
    Region::Frankfurt,
    Region::London,
    Region::Russia,
    Region::Southafrica,
    Region::VipAmsterdam,
];

const THIRD_TWO: &[Region] = &[
    Region::Hongkong,
    Region::Japan,
    Region::Singapore,
    Region::Sydney,
];

impl RegionSet {
    /// Build a set from catalog identifiers.
    ///
    /// Fails on the first identifier that is not a known region; duplicates
    /// keep their first position.
    pub fn new<I, S>(identifiers: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let regions = identifiers
            .into_iter()
            .map(|id| id.as_ref().parse::<Region>())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_regions(regions))
    }

    /// Build a set from already-typed regions
    pub fn from_regions<I>(regions: I) -> Self
    where
        I: IntoIterator<Item = Region>,
    {
        let mut set = Self {
            regions: Vec::new(),
        };
        for region in regions {
            if !set.regions.contains(&region) {
                set.regions.push(region);
            }
        }
        set
    }

    /// Look up a named factory set (`"eu"`, `"third_two"`, ...)
    pub fn named(name: &str) -> Result<Self> {
        let set = match name {
            "all" => Self::all(),
            "eu" => Self::eu(),
            "us" => Self::us(),
            "america" => Self::america(),
            "africa" => Self::africa(),
            "asia" => Self::asia(),
            "oceania" => Self::oceania(),
            "half_one" => Self::half_one(),
            "half_two" => Self::half_two(),
            "third_one" => Self::third_one(),
            "third_two" => Self::third_two(),
            "third_three" => Self::third_three(),
            other => return Err(RelayError::UnknownRegionGroup(other.to_string())),
        };
        Ok(set)
    }

    /// Every known region
    pub fn all() -> Self {
        Self::from_regions(Region::ALL)
    }

    /// Europe, including Russia
    pub fn eu() -> Self {
        Self::from_regions(EU.iter().copied())
    }

    /// United States
    pub fn us() -> Self {
        Self::from_regions(US.iter().copied())
    }

    /// North and South America
    pub fn america() -> Self {
        Self::from_regions(AMERICA.iter().copied())
    }

    pub fn africa() -> Self {
        Self::from_regions(AFRICA.iter().copied())
    }

    pub fn asia() -> Self {
        Self::from_regions(ASIA.iter().copied())
    }

    /// Australia
    pub fn oceania() -> Self {
        Self::from_regions(OCEANIA.iter().copied())
    }

    /// EU, Africa, Brazil and East US
    pub fn half_one() -> Self {
        Self::from_regions(HALF_ONE.iter().copied())
    }

    /// West US, Asia and Oceania
    pub fn half_two() -> Self {
        Self::from_regions(HALF_TWO.iter().copied())
    }

    /// EU, Russia and Africa
    pub fn third_one() -> Self {
        Self::from_regions(THIRD_ONE.iter().copied())
    }

    /// Asia and Oceania
    pub fn third_two() -> Self {
        Self::from_regions(THIRD_TWO.iter().copied())
    }

    /// North America
    pub fn third_three() -> Self {
        Self::from_regions(US.iter().copied())
    }

    pub fn contains(&self, region: Region) -> bool {
        self.regions.contains(&region)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Region> + '_ {
        self.regions.iter().copied()
    }

    pub fn as_slice(&self) -> &[Region] {
        &self.regions
    }
}

impl<'a> IntoIterator for &'a RegionSet {
    type Item = Region;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, Region>>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter().copied()
    }
}

impl fmt::Display for RegionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.regions.iter().map(Region::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

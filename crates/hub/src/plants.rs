//! Crop preset catalog.
//!
//! Static lookup table of per-crop growing targets, split by the three
//! Ecuadorian growing regions the rig was built for. Applying a preset is
//! just a validated plant-threshold update; no logic lives here beyond
//! lookup.

use serde::{Deserialize, Serialize};

use crate::thresholds::PlantThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Coast,
    Highlands,
    Amazon,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RegionPreset {
    pub region: Region,
    pub soil_optimal: f64,
    pub soil_min: f64,
    pub soil_max: f64,
    pub temp_optimal: f64,
    pub humid_optimal: f64,
    pub description: &'static str,
}

impl RegionPreset {
    pub fn thresholds(&self) -> PlantThresholds {
        PlantThresholds {
            soil_optimal: self.soil_optimal,
            soil_min: self.soil_min,
            soil_max: self.soil_max,
            temp_optimal: self.temp_optimal,
            humid_optimal: self.humid_optimal,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PlantPreset {
    pub id: &'static str,
    pub name: &'static str,
    pub regions: [RegionPreset; 3],
    pub notes: &'static str,
}

const fn region(
    region: Region,
    soil_optimal: f64,
    soil_min: f64,
    soil_max: f64,
    temp_optimal: f64,
    humid_optimal: f64,
    description: &'static str,
) -> RegionPreset {
    RegionPreset {
        region,
        soil_optimal,
        soil_min,
        soil_max,
        temp_optimal,
        humid_optimal,
        description,
    }
}

/// The catalog. Values come from regional agronomy tables for the crops
/// this rig is commonly used with.
pub const CATALOG: &[PlantPreset] = &[
    PlantPreset {
        id: "mango",
        name: "Mango",
        regions: [
            region(Region::Coast, 45.0, 30.0, 65.0, 28.0, 70.0, "Warm, humid lowlands"),
            region(Region::Highlands, 50.0, 35.0, 70.0, 25.0, 65.0, "Temperate valleys"),
            region(Region::Amazon, 40.0, 25.0, 60.0, 30.0, 75.0, "High tropical humidity"),
        ],
        notes: "Prefers well-drained soil",
    },
    PlantPreset {
        id: "banana",
        name: "Banana",
        regions: [
            region(Region::Coast, 65.0, 50.0, 80.0, 27.0, 75.0, "Main producing zone"),
            region(Region::Highlands, 70.0, 55.0, 85.0, 22.0, 70.0, "Limited valley cultivation"),
            region(Region::Amazon, 60.0, 45.0, 75.0, 29.0, 80.0, "Good for organic growing"),
        ],
        notes: "Needs plenty of water and stable temperatures",
    },
    PlantPreset {
        id: "cacao",
        name: "Cacao",
        regions: [
            region(Region::Coast, 55.0, 40.0, 70.0, 26.0, 75.0, "Fine-aroma cacao"),
            region(Region::Highlands, 60.0, 45.0, 75.0, 23.0, 70.0, "Subtropical valleys"),
            region(Region::Amazon, 50.0, 35.0, 65.0, 28.0, 80.0, "Traditional lowland cacao"),
        ],
        notes: "Wants partial shade and organic-rich soil",
    },
    PlantPreset {
        id: "plantain",
        name: "Plantain",
        regions: [
            region(Region::Coast, 65.0, 50.0, 80.0, 27.0, 75.0, "Core producing zone"),
            region(Region::Highlands, 70.0, 55.0, 85.0, 21.0, 65.0, "Warm valleys only"),
            region(Region::Amazon, 60.0, 45.0, 75.0, 28.0, 80.0, "Strong organic production"),
        ],
        notes: "Like banana, broader culinary uses",
    },
    PlantPreset {
        id: "passionfruit",
        name: "Passion fruit",
        regions: [
            region(Region::Coast, 55.0, 40.0, 70.0, 27.0, 70.0, "Export crop"),
            region(Region::Highlands, 60.0, 45.0, 75.0, 20.0, 65.0, "Warm inter-Andean valleys"),
            region(Region::Amazon, 50.0, 35.0, 65.0, 28.0, 80.0, "Abundant in lowland zones"),
        ],
        notes: "Needs trellising and good drainage",
    },
    PlantPreset {
        id: "dragonfruit",
        name: "Dragon fruit",
        regions: [
            region(Region::Coast, 50.0, 35.0, 65.0, 26.0, 70.0, "Requires good drainage"),
            region(Region::Highlands, 55.0, 40.0, 70.0, 22.0, 65.0, "Subtropical valleys"),
            region(Region::Amazon, 50.0, 35.0, 65.0, 25.0, 75.0, "Main export zone"),
        ],
        notes: "A cactus; needs support and careful watering",
    },
    PlantPreset {
        id: "orange",
        name: "Orange",
        regions: [
            region(Region::Coast, 55.0, 40.0, 70.0, 26.0, 65.0, "Coastal lowlands"),
            region(Region::Highlands, 60.0, 45.0, 75.0, 20.0, 60.0, "Temperate valleys"),
            region(Region::Amazon, 50.0, 35.0, 65.0, 27.0, 75.0, "Humid lowland climate"),
        ],
        notes: "Needs regular irrigation",
    },
    PlantPreset {
        id: "lemon",
        name: "Lemon",
        regions: [
            region(Region::Coast, 55.0, 40.0, 70.0, 27.0, 70.0, "Widely grown on the coast"),
            region(Region::Highlands, 60.0, 45.0, 75.0, 19.0, 60.0, "Warm inter-Andean valleys"),
            region(Region::Amazon, 50.0, 35.0, 65.0, 28.0, 75.0, "Humid lowland zones"),
        ],
        notes: "Hardy, produces year-round",
    },
    PlantPreset {
        id: "strawberry",
        name: "Strawberry",
        regions: [
            region(Region::Coast, 55.0, 40.0, 70.0, 20.0, 60.0, "High coastal zones"),
            region(Region::Highlands, 65.0, 50.0, 80.0, 16.0, 55.0, "Main growing zone"),
            region(Region::Amazon, 50.0, 35.0, 65.0, 18.0, 65.0, "Cool microclimates"),
        ],
        notes: "Wants organic-rich soil and steady watering",
    },
    PlantPreset {
        id: "blackberry",
        name: "Blackberry",
        regions: [
            region(Region::Coast, 55.0, 40.0, 70.0, 19.0, 65.0, "Cooler coastal spots"),
            region(Region::Highlands, 65.0, 50.0, 80.0, 15.0, 60.0, "Dominant crop zone"),
            region(Region::Amazon, 50.0, 35.0, 65.0, 18.0, 70.0, "Humid cool microclimates"),
        ],
        notes: "Very productive; juices and preserves",
    },
    PlantPreset {
        id: "tomato",
        name: "Tomato",
        regions: [
            region(Region::Coast, 60.0, 45.0, 75.0, 24.0, 65.0, "Industrial tomato"),
            region(Region::Highlands, 65.0, 50.0, 80.0, 21.0, 60.0, "Table tomato"),
            region(Region::Amazon, 55.0, 40.0, 70.0, 26.0, 70.0, "Cherry tomato"),
        ],
        notes: "Needs staking and pruning",
    },
    PlantPreset {
        id: "lettuce",
        name: "Lettuce",
        regions: [
            region(Region::Coast, 55.0, 40.0, 70.0, 20.0, 65.0, "Short-cycle crop"),
            region(Region::Highlands, 60.0, 45.0, 75.0, 16.0, 60.0, "Main producing zone"),
            region(Region::Amazon, 50.0, 35.0, 65.0, 21.0, 70.0, "Humid conditions"),
        ],
        notes: "Shallow roots; frequent light watering",
    },
];

pub fn find(id: &str) -> Option<&'static PlantPreset> {
    CATALOG.iter().find(|p| p.id.eq_ignore_ascii_case(id))
}

/// Thresholds for a crop in a region, if the crop exists.
pub fn preset_thresholds(id: &str, region_wanted: Region) -> Option<PlantThresholds> {
    find(id).map(|p| {
        p.regions
            .iter()
            .find(|r| r.region == region_wanted)
            .expect("every preset covers all three regions")
            .thresholds()
    })
}

// ===========================================================================
// Tests
// ===========================================================================

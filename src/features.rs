//! Turns scraped records into the model feature table.
//!
//! Rows without a usable price or location are dropped, gaps are imputed,
//! outliers capped, and categorical columns encoded. The district encoder
//! and the feature column order are written next to the table so the
//! training and serving stages agree on them.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::models::{Category, ListingRecord};

pub const MIN_PRICE: f64 = 500_000.0;
pub const MAX_PRICE: f64 = 600_000_000.0;
const CAP_QUANTILE: f64 = 0.99;

/// Feature columns, in table order. `log_price` is the training target.
pub const FEATURE_NAMES: [&str; 20] = [
    "bedrooms",
    "bathrooms",
    "land_size_p",
    "floor_area_sqft",
    "storeys",
    "district_enc",
    "district_tier",
    "colombo_premium",
    "property_type_enc",
    "negotiable",
    "has_parking",
    "has_pool",
    "has_garden",
    "has_furnished",
    "has_ac",
    "has_security",
    "has_water",
    "has_highway",
    "has_generator",
    "has_solar",
];

const PREMIUM_AREAS: [&str; 18] = [
    "colombo 1",
    "colombo 2",
    "colombo 3",
    "colombo 4",
    "colombo 5",
    "colombo 6",
    "colombo 7",
    "cinnamon",
    "kollupitiya",
    "bambalapitiya",
    "havelock",
    "borella",
    "rajagiriya",
    "battaramulla",
    "nawala",
    "nugegoda",
    "dehiwala",
    "mount lavinia",
];

const PARKING: &[&str] = &["parking", "garage", "car port", "carport"];
const POOL: &[&str] = &["pool", "swimming"];
const GARDEN: &[&str] = &["garden", "lawn"];
const FURNISHED: &[&str] = &["furnished", "furniture"];
const AIR_CONDITIONING: &[&str] = &["air condition", "aircondition", "a/c", " ac "];
const SECURITY: &[&str] = &["security", "cctv", "gated", "guard"];
const WATER: &[&str] = &["water board", "city water", "tube well", "well water"];
const HIGHWAY: &[&str] = &["highway", "expressway", "e01", "e03"];
const GENERATOR: &[&str] = &["generator", "genset"];
const SOLAR: &[&str] = &["solar"];

/// One row of the cleaned feature table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub bedrooms: f64,
    pub bathrooms: f64,
    pub land_size_p: f64,
    pub floor_area_sqft: f64,
    pub storeys: f64,
    pub district_enc: usize,
    pub district_tier: u8,
    pub colombo_premium: u8,
    pub property_type_enc: u8,
    pub negotiable: u8,
    pub has_parking: u8,
    pub has_pool: u8,
    pub has_garden: u8,
    pub has_furnished: u8,
    pub has_ac: u8,
    pub has_security: u8,
    pub has_water: u8,
    pub has_highway: u8,
    pub has_generator: u8,
    pub has_solar: u8,
    pub log_price: f64,
    pub price_lkr: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub rows: Vec<FeatureRow>,
    /// Sorted district names; a row's `district_enc` indexes into this.
    pub district_classes: Vec<String>,
}

impl FeatureTable {
    /// Write `clean_file` plus `district_encoder.json` and
    /// `feature_names.json` into `artifacts_dir`.
    pub fn write(&self, clean_file: &Path, artifacts_dir: &Path) -> Result<()> {
        fs::create_dir_all(artifacts_dir)
            .with_context(|| format!("Failed to create {}", artifacts_dir.display()))?;

        let mut writer = csv::Writer::from_path(clean_file)
            .with_context(|| format!("Failed to create {}", clean_file.display()))?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        info!(rows = self.rows.len(), path = %clean_file.display(), "✅ Saved feature table");

        let encoder = artifacts_dir.join("district_encoder.json");
        fs::write(&encoder, serde_json::to_string_pretty(&self.district_classes)?)
            .with_context(|| format!("Failed to write {}", encoder.display()))?;

        let names = artifacts_dir.join("feature_names.json");
        fs::write(&names, serde_json::to_string_pretty(&FEATURE_NAMES)?)
            .with_context(|| format!("Failed to write {}", names.display()))?;

        info!(dir = %artifacts_dir.display(), "✅ Saved district encoder and feature names");
        Ok(())
    }
}

fn flag(text: &str, keywords: &[&str]) -> u8 {
    u8::from(keywords.iter().any(|k| text.contains(k)))
}

fn property_type_code(category: Category) -> u8 {
    match category {
        Category::Houses => 0,
        Category::Apartments => 1,
        Category::Land => 2,
    }
}

fn sorted(values: impl Iterator<Item = Option<f64>>) -> Vec<f64> {
    let mut v: Vec<f64> = values.flatten().filter(|x| x.is_finite()).collect();
    v.sort_by(f64::total_cmp);
    v
}

pub fn median(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    quantile(values, 0.5)
}

/// Linear-interpolated quantile of the present values.
pub fn quantile(values: impl Iterator<Item = Option<f64>>, q: f64) -> Option<f64> {
    let v = sorted(values);
    if v.is_empty() {
        return None;
    }
    let pos = (v.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(v[lo] + (v[hi] - v[lo]) * (pos - lo as f64))
}

struct Candidate<'a> {
    record: &'a ListingRecord,
    price: f64,
    bedrooms: Option<f64>,
    bathrooms: Option<f64>,
    land_size_p: Option<f64>,
    floor_area_sqft: Option<f64>,
    storeys: Option<f64>,
}

fn fill(column: &mut [Option<f64>], value: Option<f64>) {
    for v in column.iter_mut().filter(|v| v.is_none()) {
        *v = value;
    }
}

fn cap(column: &mut [Option<f64>]) {
    let Some(limit) = quantile(column.iter().copied(), CAP_QUANTILE) else {
        return;
    };
    for v in column.iter_mut().flatten() {
        *v = v.min(limit);
    }
}

/// Build the feature table from raw records.
pub fn build_features(records: &[ListingRecord]) -> FeatureTable {
    let mut kept: Vec<Candidate<'_>> = records
        .iter()
        .filter(|r| !r.location.trim().is_empty())
        .filter_map(|r| {
            let price = r.price_lkr.filter(|p| (MIN_PRICE..=MAX_PRICE).contains(p))?;
            Some(Candidate {
                record: r,
                price,
                bedrooms: r.bedrooms,
                bathrooms: r.bathrooms,
                land_size_p: r.land_size_p,
                floor_area_sqft: r.floor_area_sqft,
                storeys: r.storeys.map(f64::from),
            })
        })
        .collect();
    info!(input = records.len(), kept = kept.len(), "Filtered rows by price and location");

    let mut bedrooms: Vec<_> = kept.iter().map(|c| c.bedrooms).collect();
    let mut bathrooms: Vec<_> = kept.iter().map(|c| c.bathrooms).collect();
    let mut land: Vec<_> = kept.iter().map(|c| c.land_size_p).collect();
    let mut floor: Vec<_> = kept.iter().map(|c| c.floor_area_sqft).collect();
    let mut storeys: Vec<_> = kept.iter().map(|c| c.storeys).collect();

    let bedrooms_median = median(bedrooms.iter().copied());
    let bathrooms_median = median(bathrooms.iter().copied());
    let land_median = median(land.iter().copied());
    let storeys_median = median(storeys.iter().copied());
    fill(&mut bedrooms, bedrooms_median);
    fill(&mut bathrooms, bathrooms_median);
    fill(&mut land, land_median);
    // No floor area means a land-only listing.
    fill(&mut floor, Some(0.0));
    fill(&mut storeys, storeys_median);

    cap(&mut bedrooms);
    cap(&mut bathrooms);
    cap(&mut land);
    cap(&mut floor);

    for (i, c) in kept.iter_mut().enumerate() {
        c.bedrooms = bedrooms[i];
        c.bathrooms = bathrooms[i];
        c.land_size_p = land[i];
        c.floor_area_sqft = floor[i];
        c.storeys = storeys[i];
    }

    let district_classes: Vec<String> = kept
        .iter()
        .map(|c| c.record.district.name().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let rows: Vec<FeatureRow> = kept
        .iter()
        .filter_map(|c| {
            let r = c.record;
            let text = format!("{} {}", r.title, r.description).to_lowercase();
            let location = r.location.to_lowercase();
            let district_enc = district_classes
                .iter()
                .position(|d| d == r.district.name())
                .unwrap_or_default();

            Some(FeatureRow {
                bedrooms: c.bedrooms?,
                bathrooms: c.bathrooms?,
                land_size_p: c.land_size_p?,
                floor_area_sqft: c.floor_area_sqft?,
                storeys: c.storeys?,
                district_enc,
                district_tier: r.district.tier(),
                colombo_premium: flag(&location, &PREMIUM_AREAS),
                property_type_enc: property_type_code(r.property_type),
                negotiable: u8::from(r.negotiable),
                has_parking: flag(&text, PARKING),
                has_pool: flag(&text, POOL),
                has_garden: flag(&text, GARDEN),
                has_furnished: flag(&text, FURNISHED),
                has_ac: flag(&text, AIR_CONDITIONING),
                has_security: flag(&text, SECURITY),
                has_water: flag(&text, WATER),
                has_highway: flag(&text, HIGHWAY),
                has_generator: flag(&text, GENERATOR),
                has_solar: flag(&text, SOLAR),
                log_price: c.price.ln_1p(),
                price_lkr: c.price,
            })
        })
        .collect();

    info!(
        rows = rows.len(),
        dropped = kept.len() - rows.len(),
        districts = district_classes.len(),
        "Built feature table"
    );

    FeatureTable {
        rows,
        district_classes,
    }
}

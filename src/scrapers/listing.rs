use std::sync::LazyLock;

use anyhow::Result;
use chrono::Utc;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::config::SiteProfile;
use crate::district::DistrictResolver;
use crate::models::{Category, ListingRecord};
use crate::normalize::{
    clean_location, extract_numeric, parse_land_size, parse_price, parse_storeys,
};
use crate::scrapers::extract::{
    extract_attributes, extract_description, extract_listing_links, first_text, page_text,
    AliasTable, AttributeKey,
};

static PRICE_IN_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Rs\.?\s*[\d,]+(?:\.\d+)?").expect("price text regex is valid"));

fn parse_selectors(sources: &[String]) -> Result<Vec<Selector>> {
    sources
        .iter()
        .map(|s| Selector::parse(s).map_err(|e| anyhow::anyhow!("invalid selector '{}': {}", s, e)))
        .collect()
}

/// Turns rendered portal pages into records and listing links.
pub struct ListingParser {
    aliases: AliasTable,
    districts: DistrictResolver,
    link_pattern: String,
    title: Vec<Selector>,
    price: Vec<Selector>,
    location: Vec<Selector>,
    description: Vec<Selector>,
}

impl ListingParser {
    pub fn new(
        site: &SiteProfile,
        aliases: AliasTable,
        districts: DistrictResolver,
    ) -> Result<Self> {
        Ok(Self {
            aliases,
            districts,
            link_pattern: site.listing_link_pattern.clone(),
            title: parse_selectors(std::slice::from_ref(&site.title_selector))?,
            price: parse_selectors(&site.price_selectors)?,
            location: parse_selectors(&site.location_selectors)?,
            description: parse_selectors(&site.description_selectors)?,
        })
    }

    /// Listing detail links found on an index page.
    pub fn listing_links(&self, html: &str, page_url: &str) -> Result<Vec<String>> {
        let page_url = Url::parse(page_url)?;
        let document = Html::parse_document(html);
        Ok(extract_listing_links(&document, &page_url, &self.link_pattern))
    }

    /// Extract and normalize one listing page.
    pub fn parse(&self, html: &str, url: &str, category: Category) -> ListingRecord {
        let document = Html::parse_document(html);

        let title = first_text(&document, &self.title).unwrap_or_default();
        let price_raw = first_text(&document, &self.price)
            .or_else(|| {
                PRICE_IN_TEXT
                    .find(&page_text(&document))
                    .map(|m| m.as_str().trim().to_string())
            })
            .unwrap_or_default();
        let location = clean_location(&first_text(&document, &self.location).unwrap_or_default());

        let attrs = extract_attributes(&document, &self.aliases);
        let attr = |key: AttributeKey| attrs.get(&key).map(String::as_str).unwrap_or("");

        let (price_lkr, negotiable) = parse_price(&price_raw);
        let district = self.districts.resolve(&location, url);

        ListingRecord {
            url: url.to_string(),
            property_type: category,
            scraped_at: Utc::now(),
            description: extract_description(&document, &self.description),
            price_lkr,
            negotiable,
            area: location.clone(),
            location,
            district,
            bedrooms: extract_numeric(attr(AttributeKey::Bedrooms)),
            bathrooms: extract_numeric(attr(AttributeKey::Bathrooms)),
            land_size_p: parse_land_size(attr(AttributeKey::LandSizeRaw)),
            floor_area_sqft: extract_numeric(attr(AttributeKey::FloorAreaRaw)),
            storeys: parse_storeys(attr(AttributeKey::StoreysRaw), &title),
            furnishing: attrs.get(&AttributeKey::Furnishing).cloned(),
            title,
        }
    }
}

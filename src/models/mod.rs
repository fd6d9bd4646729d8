use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::district::District;

/// Property category, one per listing index on the portal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[serde(alias = "house")]
    Houses,
    #[serde(alias = "apartment")]
    Apartments,
    Land,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Houses => "houses",
            Category::Apartments => "apartments",
            Category::Land => "land",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "houses" | "house" => Ok(Category::Houses),
            "apartments" | "apartment" => Ok(Category::Apartments),
            "land" => Ok(Category::Land),
            other => anyhow::bail!("unknown property category '{}'", other),
        }
    }
}

/// A detail-page URL found during discovery, tagged with its category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredUrl {
    pub url: String,
    pub category: Category,
}

/// One scraped property, one row of the output store.
///
/// Field order is the column order of the CSV file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub url: String,
    pub property_type: Category,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub scraped_at: DateTime<Utc>,
    pub title: String,
    pub description: String,
    pub price_lkr: Option<f64>,
    #[serde(serialize_with = "bool_as_int", deserialize_with = "lenient_bool")]
    pub negotiable: bool,
    pub location: String,
    pub district: District,
    pub area: String,
    pub bedrooms: Option<f64>,
    pub bathrooms: Option<f64>,
    pub land_size_p: Option<f64>,
    pub floor_area_sqft: Option<f64>,
    #[serde(deserialize_with = "lenient_count")]
    pub storeys: Option<u32>,
    pub furnishing: Option<String>,
}

fn bool_as_int<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*value))
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_lowercase().as_str() {
        "1" | "1.0" | "true" => Ok(true),
        "" | "0" | "0.0" | "false" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "invalid negotiable flag '{}'",
            other
        ))),
    }
}

/// RFC 3339, or the minute-precision local form older stores use.
fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}

// Stores written by other tools may hold counts as "3.0".
fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let value: f64 = raw
        .parse()
        .map_err(|_| serde::de::Error::custom(format!("invalid count '{}'", raw)))?;
    if !value.is_finite() || value < 0.0 {
        return Err(serde::de::Error::custom(format!("invalid count '{}'", raw)));
    }
    Ok(Some(value as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_singular_and_plural() {
        assert_eq!("house".parse::<Category>().unwrap(), Category::Houses);
        assert_eq!(" Apartments ".parse::<Category>().unwrap(), Category::Apartments);
        assert_eq!("land".parse::<Category>().unwrap(), Category::Land);
        assert!("villa".parse::<Category>().is_err());
    }

    #[test]
    fn record_reads_counts_and_flags_written_as_floats() {
        let data = "url,property_type,scraped_at,title,description,price_lkr,negotiable,location,district,area,bedrooms,bathrooms,land_size_p,floor_area_sqft,storeys,furnishing\n\
            https://ikman.lk/en/ad/a,house,2024-05-01T10:00:00Z,Nice house,,92500000.0,1,Piliyandala,Colombo,Piliyandala,4.0,2.0,10.6,,2.0,\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let record: ListingRecord = reader.deserialize().next().unwrap().unwrap();

        assert_eq!(record.property_type, Category::Houses);
        assert!(record.negotiable);
        assert_eq!(record.storeys, Some(2));
        assert_eq!(record.district, District::Colombo);
        assert_eq!(record.floor_area_sqft, None);
        assert_eq!(record.furnishing, None);
    }

    #[test]
    fn record_reads_minute_precision_timestamps() {
        let data = "url,property_type,scraped_at,title,description,price_lkr,negotiable,location,district,area,bedrooms,bathrooms,land_size_p,floor_area_sqft,storeys,furnishing\n\
            https://ikman.lk/en/ad/a,houses,2024-05-01 10:00,Land,,4500000.0,0,Galle,Galle,Galle,,,10.0,,,\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let record: ListingRecord = reader.deserialize().next().unwrap().unwrap();

        assert_eq!(record.scraped_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(record.land_size_p, Some(10.0));
    }

    #[test]
    fn record_rejects_garbage_timestamp() {
        let data = "url,property_type,scraped_at,title,description,price_lkr,negotiable,location,district,area,bedrooms,bathrooms,land_size_p,floor_area_sqft,storeys,furnishing\n\
            https://ikman.lk/en/ad/a,houses,yesterday,,,,0,,Other,,,,,,,\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let result: Result<ListingRecord, _> = reader.deserialize().next().unwrap();
        assert!(result.is_err());
    }
}

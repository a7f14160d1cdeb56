use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// How the session location was obtained. Kept for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Gps,
    StoredPreference,
    ManualPick,
    Fallback,
}

impl LocationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationSource::Gps => "gps",
            LocationSource::StoredPreference => "stored_preference",
            LocationSource::ManualPick => "manual_pick",
            LocationSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub city: String,
    pub coordinates: Coordinates,
    pub source: LocationSource,
}

impl ResolvedLocation {
    /// Compares city and coordinates, ignoring how the location was found.
    pub fn same_place(&self, other: &ResolvedLocation) -> bool {
        self.city == other.city && self.coordinates == other.coordinates
    }
}

/// Categories offered as feed filters, in display order.
pub const VENUE_CATEGORIES: &[&str] = &[
    "Night Club",
    "Cocktail Bar",
    "Sports Bar",
    "Karaoke",
    "Lounge",
    "Live Music",
    "Dive Bar",
    "LGBTQ+ Friendly",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "distance")]
    pub distance_meters: f64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub categories: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn venue_summary_accepts_missing_or_null_categories() {
        let venues: Vec<VenueSummary> = serde_json::from_value(json!([
            { "id": "a", "name": "Bar Lis", "distance": 321.5, "categories": ["Lounge", "Cocktail Bar"] },
            { "id": "b", "name": "Roccos", "distance": 12.0, "categories": null },
            { "id": "c", "name": "Poppy", "distance": 4100.0, "rating": 4.6 }
        ]))
        .unwrap();

        assert_eq!(venues[0].categories, vec!["Lounge", "Cocktail Bar"]);
        assert_eq!(venues[0].distance_meters, 321.5);
        assert!(venues[1].categories.is_empty());
        assert!(venues[2].categories.is_empty());
    }

    #[test]
    fn same_place_ignores_source() {
        let gps = ResolvedLocation {
            city: "Scottsdale".into(),
            coordinates: Coordinates::new(33.4942, -111.9261),
            source: LocationSource::Gps,
        };
        let stored = ResolvedLocation {
            source: LocationSource::StoredPreference,
            ..gps.clone()
        };
        assert!(gps.same_place(&stored));
        assert_ne!(gps, stored);
    }
}

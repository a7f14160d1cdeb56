use crate::model::{Coordinates, LocationSource, ResolvedLocation};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportedCity {
    pub name: &'static str,
    pub coordinates: Coordinates,
}

impl SupportedCity {
    pub fn resolved(&self, source: LocationSource) -> ResolvedLocation {
        ResolvedLocation {
            city: self.name.to_string(),
            coordinates: self.coordinates,
            source,
        }
    }
}

pub const SUPPORTED_CITIES: &[SupportedCity] = &[
    SupportedCity {
        name: "Los Angeles",
        coordinates: Coordinates::new(34.0522, -118.2437),
    },
    SupportedCity {
        name: "Scottsdale",
        coordinates: Coordinates::new(33.4942, -111.9261),
    },
    SupportedCity {
        name: "San Francisco",
        coordinates: Coordinates::new(37.7749, -122.4194),
    },
];

/// Finds a supported city, ignoring case and surrounding whitespace.
pub fn lookup_city(name: &str) -> Option<&'static SupportedCity> {
    let needle = name.trim();
    SUPPORTED_CITIES
        .iter()
        .find(|city| city.name.eq_ignore_ascii_case(needle))
}

pub fn supported_city_names() -> impl Iterator<Item = &'static str> {
    SUPPORTED_CITIES.iter().map(|city| city.name)
}

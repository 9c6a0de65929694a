use std::path::Path;
use std::time::Duration;

use gpx_routes_lib::metrics::haversine_distance;
use serde::Deserialize;

/// A named starting point takes precedence over the geocoding API when the
/// route starts within this distance of it.
pub const MAX_PLACE_DISTANCE_M: f64 = 250.0;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const ATTEMPTS: u32 = 3;
const BACKOFF: Duration = Duration::from_millis(500);
const USER_AGENT: &str = "gpx-routes/0.1";

pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";

/// Reverse-geocoding outcome. `Unavailable` is explicit so callers can tell
/// "we could not find a name" apart from an empty one.
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodedLocation {
    Place(String),
    Unavailable,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KnownPlace {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Named starting points loaded once at startup from a JSON file.
pub struct PlaceIndex {
    places: Vec<KnownPlace>,
}

impl PlaceIndex {
    pub fn empty() -> Self {
        Self { places: Vec::new() }
    }

    pub fn from_places(places: Vec<KnownPlace>) -> Self {
        Self { places }
    }

    /// Missing or unreadable files degrade to an empty index; start points
    /// are a convenience, not a requirement.
    pub fn load(path: &Path) -> Self {
        let places = std::fs::read(path)
            .map_err(|err| format!("{err}"))
            .and_then(|bytes| {
                serde_json::from_slice::<Vec<KnownPlace>>(&bytes).map_err(|err| format!("{err}"))
            });

        match places {
            Ok(places) => {
                tracing::info!("Loaded {} known places from {:?}", places.len(), path);
                Self { places }
            }
            Err(err) => {
                tracing::warn!("Failed to load places file {:?}: {}", path, err);
                Self::empty()
            }
        }
    }

    pub fn nearest_within(&self, lat: f64, lon: f64, max_distance_m: f64) -> Option<&KnownPlace> {
        self.places
            .iter()
            .map(|place| (place, haversine_distance(lat, lon, place.lat, place.lon)))
            .filter(|(_, distance)| *distance <= max_distance_m)
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(place, _)| place)
    }
}

/// Best-effort reverse geocoder: local place index first, then a
/// Nominatim-style API. Failures never propagate upward.
pub struct Geocoder {
    client: reqwest::Client,
    base_url: Option<String>,
    places: PlaceIndex,
}

impl Geocoder {
    pub fn new(base_url: Option<String>, places: PlaceIndex) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url,
            places,
        }
    }

    /// Offline geocoder: no API calls, place index only.
    pub fn disabled() -> Self {
        Self::new(None, PlaceIndex::empty())
    }

    pub async fn reverse(&self, lat: f64, lon: f64) -> GeocodedLocation {
        if let Some(place) = self.places.nearest_within(lat, lon, MAX_PLACE_DISTANCE_M) {
            return GeocodedLocation::Place(place.name.clone());
        }

        let Some(base_url) = &self.base_url else {
            return GeocodedLocation::Unavailable;
        };

        let url = format!("{}/reverse", base_url.trim_end_matches('/'));

        for attempt in 0..ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(BACKOFF * 2u32.pow(attempt - 1)).await;
            }

            let response = self
                .client
                .get(&url)
                .query(&[
                    ("lat", lat.to_string()),
                    ("lon", lon.to_string()),
                    ("format", "json".to_string()),
                ])
                .send()
                .await;

            let response = match response {
                Ok(response) if response.status().is_success() => response,
                Ok(response) => {
                    tracing::warn!("Geocoding request returned {}", response.status());
                    continue;
                }
                Err(err) => {
                    tracing::warn!("Geocoding request failed: {err}");
                    continue;
                }
            };

            match response.json::<serde_json::Value>().await {
                Ok(body) => {
                    if let Some(name) = location_name(&body) {
                        return GeocodedLocation::Place(name);
                    }
                    return GeocodedLocation::Unavailable;
                }
                Err(err) => {
                    tracing::warn!("Geocoding response was not valid JSON: {err}");
                }
            }
        }

        GeocodedLocation::Unavailable
    }
}

/// Assemble a readable name from the address parts, preferring
/// road + city/town/village + state, with `display_name` as fallback.
fn location_name(body: &serde_json::Value) -> Option<String> {
    let address = &body["address"];
    let mut parts: Vec<&str> = Vec::new();

    if let Some(road) = address["road"].as_str() {
        parts.push(road);
    }

    for key in ["city", "town", "village"] {
        if let Some(settlement) = address[key].as_str() {
            parts.push(settlement);
            break;
        }
    }

    if let Some(state) = address["state"].as_str() {
        parts.push(state);
    }

    if !parts.is_empty() {
        return Some(parts.join(", "));
    }

    body["display_name"].as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boulder_trailheads() -> PlaceIndex {
        PlaceIndex::from_places(vec![
            KnownPlace {
                name: "Chautauqua Trailhead".to_string(),
                lat: 39.9991,
                lon: -105.2813,
            },
            KnownPlace {
                name: "Sanitas Valley".to_string(),
                lat: 40.0211,
                lon: -105.2973,
            },
        ])
    }

    #[test]
    fn nearest_place_within_threshold_wins() {
        let index = boulder_trailheads();
        // ~60 m east of the Chautauqua coordinates
        let place = index.nearest_within(39.9991, -105.2806, MAX_PLACE_DISTANCE_M);
        assert_eq!(place.unwrap().name, "Chautauqua Trailhead");
    }

    #[test]
    fn distant_coordinates_match_nothing() {
        let index = boulder_trailheads();
        assert!(index.nearest_within(40.1, -105.2813, MAX_PLACE_DISTANCE_M).is_none());
    }

    #[tokio::test]
    async fn place_index_answers_without_network() {
        let geocoder = Geocoder::new(None, boulder_trailheads());
        let location = geocoder.reverse(40.0211, -105.2973).await;
        assert_eq!(location, GeocodedLocation::Place("Sanitas Valley".to_string()));
    }

    #[tokio::test]
    async fn disabled_geocoder_reports_unavailable() {
        let geocoder = Geocoder::disabled();
        assert_eq!(geocoder.reverse(40.0, -105.0).await, GeocodedLocation::Unavailable);
    }

    #[test]
    fn address_parts_are_assembled_in_order() {
        let body = serde_json::json!({
            "address": {
                "road": "Baseline Road",
                "city": "Boulder",
                "state": "Colorado"
            },
            "display_name": "unused"
        });
        assert_eq!(
            location_name(&body).unwrap(),
            "Baseline Road, Boulder, Colorado"
        );
    }

    #[test]
    fn display_name_is_the_fallback() {
        let body = serde_json::json!({
            "address": {},
            "display_name": "Somewhere, Jutland, Denmark"
        });
        assert_eq!(location_name(&body).unwrap(), "Somewhere, Jutland, Denmark");
    }

    #[test]
    fn no_address_at_all_is_none() {
        assert_eq!(location_name(&serde_json::json!({})), None);
    }
}

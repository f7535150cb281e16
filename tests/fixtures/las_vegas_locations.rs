//! Real Las Vegas / Henderson sites for realistic dispatch fixtures.
//!
//! Coordinates sourced from OpenStreetMap via Overpass API. Casinos double as
//! technician depots; everything else is a customer site.

/// A named customer site or depot.
#[derive(Debug, Clone)]
pub struct Site {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Site {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn coords(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }

    /// Job id derived from the site name, e.g. `bellagio-3`.
    pub fn job_id(&self, n: usize) -> String {
        let slug: String = self
            .name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        format!("{slug}-{n}")
    }
}

// ============================================================================
// Major Casinos / Hotels (technician depots)
// ============================================================================

pub const CASINOS: &[Site] = &[
    Site::new("Wynn Las Vegas", 36.1263781, -115.1658180),
    Site::new("Encore at Wynn", 36.1289345, -115.1653620),
    Site::new("MGM Grand", 36.1023654, -115.1688720),
    Site::new("Bellagio", 36.1126, -115.1767),
    Site::new("Caesars Palace", 36.1162, -115.1745),
    Site::new("Longhorn Casino", 36.1070664, -115.0591256),
];

// ============================================================================
// Las Vegas Strip Area Restaurants
// ============================================================================

pub const STRIP_RESTAURANTS: &[Site] = &[
    Site::new("Hard Rock Cafe", 36.1041592, -115.1722166),
    Site::new("SW Steakhouse", 36.1262145, -115.1669146),
    Site::new("Sinatra", 36.1300035, -115.1654850),
    Site::new("Public House", 36.1219193, -115.1689317),
    Site::new("Outback Steakhouse Strip", 36.1037287, -115.1724577),
    Site::new("The Crack Shack", 36.1050709, -115.1735287),
    Site::new("Brooklyn Bowl", 36.1175388, -115.1695094),
    Site::new("Flour & Barley", 36.1173688, -115.1702674),
    Site::new("Yard House", 36.1177147, -115.1691992),
    Site::new("Gordon Ramsay BurGR", 36.1107195, -115.1720818),
    Site::new("P.F. Chang's", 36.1103352, -115.1723830),
    Site::new("Earl of Sandwich Planet Hollywood", 36.1093912, -115.1720087),
    Site::new("Lobster Me Planet Hollywood", 36.1094857, -115.1708325),
    Site::new("Gordon Ramsay Steak", 36.1127744, -115.1712029),
    Site::new("Spago by Wolfgang Puck", 36.1139368, -115.1741462),
    Site::new("Le Cirque", 36.1135689, -115.1749763),
    Site::new("BLT Steakhouse", 36.1135528, -115.1690095),
    Site::new("Guy Fieri's Vegas Kitchen", 36.1184064, -115.1722088),
    Site::new("Hash House A Go Go", 36.1181377, -115.1710989),
    Site::new("Ruth's Chris Steak House", 36.1193113, -115.1722630),
    Site::new("Otto Pizzeria", 36.1231219, -115.1684514),
    Site::new("Canaletto Ristorante", 36.1230743, -115.1688618),
    Site::new("Buddy V's", 36.1231133, -115.1697093),
    Site::new("Carnevino Italian Steakhouse", 36.1249521, -115.1687357),
    Site::new("Grand Lux Cafe", 36.1216416, -115.1685024),
    Site::new("Delmonico Steakhouse", 36.1231561, -115.1686955),
    Site::new("CUT", 36.1233879, -115.1682073),
    Site::new("Rao's", 36.1163982, -115.1763053),
    Site::new("Beijing Noodle No. 9", 36.1158277, -115.1758038),
    Site::new("Bacchanal Buffet", 36.1159581, -115.1762929),
];

// ============================================================================
// Henderson / East Las Vegas Area
// ============================================================================

pub const HENDERSON_LOCATIONS: &[Site] = &[
    Site::new("I Love Sushi Henderson", 35.9916660, -115.1028343),
    Site::new("Extended Stay America Henderson", 36.1283949, -115.0826989),
    Site::new("Islander's Grill", 36.0335058, -114.9856162),
    Site::new("Naga", 36.0137634, -114.9928676),
];

// ============================================================================
// All Locations Combined
// ============================================================================

/// Every customer site; depots excluded.
pub fn all_locations() -> Vec<Site> {
    let mut all = Vec::with_capacity(STRIP_RESTAURANTS.len() + HENDERSON_LOCATIONS.len());
    all.extend_from_slice(STRIP_RESTAURANTS);
    all.extend_from_slice(HENDERSON_LOCATIONS);
    all
}

/// Returns a subset of locations for smaller tests.
pub fn sample_locations(count: usize) -> Vec<Site> {
    all_locations().into_iter().take(count).collect()
}

/// Returns locations spread across the metro area (good for multi-route tests).
pub fn geographically_diverse_locations() -> Vec<Site> {
    vec![
        // North
        Site::new("Rivas Mexican Grill North", 36.1450055, -115.0482587),
        Site::new("Beers and Bets", 36.1428945, -115.1573836),
        // Central Strip
        Site::new("Wynn Las Vegas", 36.1263781, -115.1658180),
        Site::new("Bellagio", 36.1126, -115.1767),
        Site::new("MGM Grand", 36.1023654, -115.1688720),
        // South
        Site::new("Bootlegger Bistro", 36.0492047, -115.1715744),
        Site::new("Budget Suites South", 36.0366259, -115.1713361),
        // East / Henderson
        Site::new("Green Valley Ranch Area", 36.0308, -115.0825),
        Site::new("Sunset Station Area", 36.0614, -115.0631),
        Site::new("Longhorn Casino", 36.1070664, -115.0591256),
        Site::new("I Love Sushi Henderson", 35.9916660, -115.1028343),
        Site::new("Islander's Grill", 36.0335058, -114.9856162),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_locations_count() {
        let all = all_locations();
        assert!(all.len() >= 30, "should have at least 30 sites, got {}", all.len());
    }

    #[test]
    fn test_job_ids_are_slugs() {
        assert_eq!(CASINOS[1].job_id(2), "encore-at-wynn-2");
    }

    #[test]
    fn test_coordinates_in_vegas_area() {
        for loc in all_locations().iter().chain(CASINOS) {
            assert!(loc.lat > 35.9 && loc.lat < 36.3, "{} lat out of range: {}", loc.name, loc.lat);
            assert!(loc.lng > -115.4 && loc.lng < -114.8, "{} lng out of range: {}", loc.name, loc.lng);
        }
    }
}

use super::Dataset;
use crate::models::waste::{ DumpSite, FloodZone, GeoPoint, RiskLevel, WasteReport };

const WASTE_TYPES: [&str; 8] = [
    "Plastic",
    "Organic",
    "Paper",
    "Glass",
    "Metal",
    "E-waste",
    "Hazardous",
    "Other",
];

fn point(lat: f64, lng: f64) -> GeoPoint {
    GeoPoint { lat, lng }
}

fn strings(items: &[&str]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn report(id: u32, waste_type: &str, description: &str, location: GeoPoint, location_name: &str) -> WasteReport {
    WasteReport {
        id,
        waste_type: waste_type.to_string(),
        description: description.to_string(),
        location,
        location_name: location_name.to_string(),
        photo: "/placeholder.png".to_string(),
    }
}

pub(super) fn dataset() -> Dataset {
    let reports = vec![
        report(
            1,
            "Plastic",
            "Large pile of plastic bottles and bags.",
            point(6.3104, -10.8042),
            "Broad Street, Monrovia"
        ),
        report(
            2,
            "Organic",
            "Rotting food waste mixed with yard trimmings.",
            point(6.315, -10.799),
            "Paynesville Market, Monrovia"
        ),
        report(
            3,
            "Hazardous",
            "Broken car batteries leaking acid.",
            point(6.2981, -10.7852),
            "Near SKD Stadium, Monrovia"
        ),
        report(
            4,
            "E-waste",
            "Old computer monitors and keyboards.",
            point(6.33, -10.81),
            "Gardnersville, Monrovia"
        )
    ];

    let flood_zones = vec![
        FloodZone {
            id: 1,
            name: "Clara Town Flood Plain".to_string(),
            risk_level: RiskLevel::High,
            polygon: vec![
                point(6.335, -10.8),
                point(6.33, -10.795),
                point(6.325, -10.805),
                point(6.33, -10.81)
            ],
        },
        FloodZone {
            id: 2,
            name: "Central Monrovia Drainage Area".to_string(),
            risk_level: RiskLevel::Medium,
            polygon: vec![
                point(6.312, -10.805),
                point(6.31, -10.8),
                point(6.308, -10.802),
                point(6.31, -10.807)
            ],
        }
    ];

    let dump_sites = vec![
        DumpSite {
            id: 1,
            name: "Paynesville Transfer Station".to_string(),
            address: "Red Light, Paynesville, Monrovia".to_string(),
            location: point(6.288, -10.748),
            accepted_waste: strings(&["Plastic", "Organic", "Paper", "Glass", "Metal", "Other"]),
            phone: "+231 77 712 3456".to_string(),
        },
        DumpSite {
            id: 2,
            name: "Whein Town Landfill".to_string(),
            address: "Whein Town, Paynesville, Monrovia".to_string(),
            location: point(6.345, -10.755),
            accepted_waste: strings(&["Plastic", "Organic", "Paper", "Glass", "Metal", "Other"]),
            phone: "+231 88 612 3456".to_string(),
        },
        DumpSite {
            id: 3,
            name: "Monrovia City Corporation (MCC) Recycling Center".to_string(),
            address: "UN Drive, Monrovia".to_string(),
            location: point(6.32, -10.808),
            accepted_waste: strings(&["Plastic", "Glass", "Metal", "E-waste"]),
            phone: "+231 55 512 3456".to_string(),
        }
    ];

    Dataset {
        waste_types: strings(&WASTE_TYPES),
        reports,
        flood_zones,
        dump_sites,
    }
}

use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{api::solcast::Site, core::sensor::SensorValue, quantity::energy::KilowattHours};

pub fn build_sensors_table<'a>(sensors: impl IntoIterator<Item = (&'a str, SensorValue)>) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Sensor", "Value"]);
    for (key, value) in sensors {
        let value_cell = Cell::new(&value).set_alignment(CellAlignment::Right);
        table.add_row(vec![
            Cell::new(key),
            if value == SensorValue::Unknown {
                value_cell.add_attribute(Attribute::Dim)
            } else {
                value_cell
            },
        ]);
    }
    table
}

pub fn build_sites_table<'a>(sites: impl IntoIterator<Item = (&'a Site, KilowattHours)>) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Name", "Resource ID", "Capacity", "Azimuth", "Tilt", "Today"]);
    for (site, today) in sites {
        table.add_row(vec![
            Cell::new(site.name.as_deref().unwrap_or("")),
            Cell::new(&site.resource_id).add_attribute(Attribute::Dim),
            optional_cell(site.capacity, "kW"),
            optional_cell(site.azimuth, "°"),
            optional_cell(site.tilt, "°"),
            Cell::new(today).set_alignment(CellAlignment::Right).fg(
                if today.is_positive() { Color::Green } else { Color::DarkYellow },
            ),
        ]);
    }
    table
}

fn optional_cell(value: Option<f64>, unit: &str) -> Cell {
    value.map_or_else(
        || Cell::new("-").add_attribute(Attribute::Dim),
        |value| Cell::new(format!("{value} {unit}")),
    )
    .set_alignment(CellAlignment::Right)
}

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensors_table() {
        let table = build_sensors_table([
            ("api_limit", SensorValue::Count(10)),
            ("lastupdated", SensorValue::Unknown),
        ])
        .to_string();
        assert!(table.contains("api_limit"));
        assert!(table.contains("unknown"));
    }

    #[test]
    fn test_sites_table() {
        let site = Site {
            name: Some("Garage".to_owned()),
            resource_id: "aaaa".to_owned(),
            capacity: Some(5.0),
            capacity_dc: None,
            longitude: None,
            latitude: None,
            azimuth: None,
            tilt: Some(35.0),
            install_date: None,
            loss_factor: None,
            api_key: String::new(),
        };
        let table = build_sites_table([(&site, KilowattHours::from(12.5))]).to_string();
        assert!(table.contains("Garage"));
        assert!(table.contains("12.50 kWh"));
        assert!(table.contains("35 °"));
    }
}

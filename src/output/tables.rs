use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn header_cells(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

pub fn value_cell(value: Option<f64>) -> Cell {
    match value {
        Some(value) => Cell::new(format_value(value)),
        None => Cell::new("n/a").fg(TableColor::DarkGrey),
    }
}

/// Allowed error as a percentage of the stream, green when tight.
pub fn color_coded_error_cell(error: f64) -> Cell {
    let percent = error * 100.0;
    let text = format!("±{percent}%");
    if percent <= 0.1 {
        Cell::new(text).fg(TableColor::Green)
    } else if percent <= 1.0 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Red)
    }
}

pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.4}")
    }
}

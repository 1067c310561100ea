use prettytable::{Cell, Row, Table};

use percentile_accum::group::GroupResult;
use percentile_accum::{AccumulatorOp, AccumulatorStatement, Value};

/// "P50", "P99.9", "P0" for a fraction in [0, 1].
pub fn fraction_label(p: f64) -> String {
    let pct = format!("{:.4}", p * 100.0);
    let pct = pct.trim_end_matches('0').trim_end_matches('.');
    format!("P{}", pct)
}

pub fn build_table_title(statement: &AccumulatorStatement) -> Table {
    let mut titles = vec![Cell::new("group")];
    match statement.op() {
        AccumulatorOp::Median => titles.push(Cell::new("median")),
        AccumulatorOp::Percentile => {
            titles.extend(statement.fractions().iter().map(|p| Cell::new(&fraction_label(*p))))
        }
    }
    let mut table = Table::new();
    table.set_titles(Row::new(titles));
    table
}

fn format_cell(v: &Value) -> String {
    match v {
        Value::Null | Value::Missing => "-".to_string(),
        Value::Double(d) => format!("{:.2}", d),
        other => other.to_string(),
    }
}

pub fn add_group_rows(table: &mut Table, results: &[GroupResult]) {
    for r in results {
        let mut cells = vec![Cell::new(&r.key.to_string())];
        match &r.value {
            Value::Array(items) => cells.extend(items.iter().map(|v| Cell::new(&format_cell(v)))),
            scalar => cells.push(Cell::new(&format_cell(scalar))),
        }
        table.add_row(Row::new(cells));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_label() {
        assert_eq!(fraction_label(0.5), "P50");
        assert_eq!(fraction_label(0.999), "P99.9");
        assert_eq!(fraction_label(0.0), "P0");
        assert_eq!(fraction_label(1.0), "P100");
    }

    #[test]
    fn test_format_cell() {
        assert_eq!(format_cell(&Value::Null), "-");
        assert_eq!(format_cell(&Value::Double(1.8)), "1.80");
    }
}

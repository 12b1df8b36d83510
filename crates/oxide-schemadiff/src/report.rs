//! Console summary of detected changes.

use colored::Colorize;

use crate::changes::{Change, Risk};

fn marker(risk: Risk) -> &'static str {
    match risk {
        Risk::Safe => "+",
        Risk::Destructive => "-",
        Risk::Manual => "!",
    }
}

/// Renders one line per change, prefixed by a risk marker, followed by a
/// count per risk.
///
/// With `color`, safe changes are green, destructive ones red and manual
/// ones yellow.
#[must_use]
pub fn summarize(changes: &[Change], color: bool) -> String {
    let mut out = String::new();
    let (mut safe, mut destructive, mut manual) = (0, 0, 0);

    for change in changes {
        let risk = change.risk();
        match risk {
            Risk::Safe => safe += 1,
            Risk::Destructive => destructive += 1,
            Risk::Manual => manual += 1,
        }

        let line = format!("  {} {}", marker(risk), change);
        if color {
            let colored = match risk {
                Risk::Safe => line.green(),
                Risk::Destructive => line.red(),
                Risk::Manual => line.yellow(),
            };
            out.push_str(&colored.to_string());
        } else {
            out.push_str(&line);
        }
        out.push('\n');
    }

    out.push_str(&format!(
        "{} change(s): {} safe, {} destructive, {} manual\n",
        changes.len(),
        safe,
        destructive,
        manual
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnType, Table};

    #[test]
    fn test_summary_without_color() {
        let changes = vec![
            Change::create_table(Table::new("sessions")),
            Change::drop_column("users", Column::new("legacy", ColumnType::Text)),
            Change::manual("orders", Some("status".to_string()), "type change"),
        ];

        assert_eq!(
            summarize(&changes, false),
            "  + Create table 'sessions'\n\
             \x20 - Drop column 'legacy' from table 'users'\n\
             \x20 ! Manual change on 'orders.status': type change\n\
             3 change(s): 1 safe, 1 destructive, 1 manual\n"
        );
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(
            summarize(&[], false),
            "0 change(s): 0 safe, 0 destructive, 0 manual\n"
        );
    }
}

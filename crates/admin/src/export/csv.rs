//! RFC 4180 CSV.

use super::Table;

const LINE_END: &str = "\r\n";

/// Header row then data rows, CRLF-terminated.
pub(super) fn to_csv(table: &Table) -> String {
    let mut out = String::new();
    write_record(&mut out, &table.columns);
    for row in &table.rows {
        write_record(&mut out, row);
    }
    out
}

fn write_record(out: &mut String, fields: &[String]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_field(out, field);
    }
    out.push_str(LINE_END);
}

/// Quote fields containing a comma, quote, CR or LF; double inner quotes.
fn push_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\r', '\n']) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[&[&str]]) -> Table {
        Table {
            title: "t".to_string(),
            columns: vec!["Name".to_string(), "Note".to_string()],
            rows: rows
                .iter()
                .map(|r| r.iter().map(|f| (*f).to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_plain_fields_unquoted() {
        assert_eq!(
            to_csv(&table(&[&["Ink", "Black"]])),
            "Name,Note\r\nInk,Black\r\n"
        );
    }

    #[test]
    fn test_special_fields_quoted() {
        let csv = to_csv(&table(&[&["Smith, Jo", "says \"hi\""], &["a\nb", "x\ry"]]));
        assert_eq!(
            csv,
            "Name,Note\r\n\"Smith, Jo\",\"says \"\"hi\"\"\"\r\n\"a\nb\",\"x\ry\"\r\n"
        );
    }

    #[test]
    fn test_empty_field() {
        assert_eq!(to_csv(&table(&[&["", "x"]])), "Name,Note\r\n,x\r\n");
    }
}

//! Minimal XML: `<export><row><field name="..">value</field></row></export>`.

use super::Table;

pub(super) fn to_xml(table: &Table) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!("<export title=\"{}\">\n", escape(&table.title)));
    for row in &table.rows {
        out.push_str("  <row>\n");
        for (column, value) in table.columns.iter().zip(row) {
            out.push_str(&format!(
                "    <field name=\"{}\">{}</field>\n",
                escape(column),
                escape(value)
            ));
        }
        out.push_str("  </row>\n");
    }
    out.push_str("</export>\n");
    out
}

/// Escape the five XML special characters.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

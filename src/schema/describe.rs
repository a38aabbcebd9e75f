//! Schema description rendering

use crate::db::store::SchemaInfo;
use chrono::NaiveDate;
use itertools::Itertools;
use std::fmt;
use std::sync::Arc;

/// Conventions of the school database that are not visible from the catalog.
const DOMAIN_NOTES: &[&str] = &[
    "Monetary amounts (fees, payments, balances) are stored as integer cents; \
     divide by 100.0 for currency values.",
    "Columns marked `-> table.column` are foreign keys; \
     join on them rather than on matching names.",
    "Students belong to a family through `family_id`; \
     guardians are linked to the same family, not to individual students.",
    "Enumerated columns must be compared as text (`column::text = 'value'`).",
    "Names and other free text should be compared case-insensitively (ILIKE or lower()).",
];

/// Immutable rendered schema text. Cloning shares the same allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescription(Arc<str>);

impl SchemaDescription {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `## Notes` section, without its heading. Empty if there is none.
    pub fn notes(&self) -> &str {
        match self.0.split_once("## Notes\n") {
            Some((_, notes)) => notes.trim_end(),
            None => "",
        }
    }
}

impl fmt::Display for SchemaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render tables, columns, relationships and enums as markdown-like text,
/// followed by the fixed domain notes, any configured notes, and today's date.
pub fn render_schema_description(
    info: &SchemaInfo,
    today: NaiveDate,
    extra_notes: &[String],
) -> SchemaDescription {
    let mut out = String::from("# Database Schema\n\n## Tables\n");

    for table in &info.tables {
        out.push_str(&format!("\n### {}\n", table.name));
        for column in &table.columns {
            let mut line = format!("- {}: {}", column.name, column.data_type);
            if !column.nullable {
                line.push_str(" NOT NULL");
            }
            if let Some(fk) = &column.references {
                line.push_str(&format!(" -> {}.{}", fk.table, fk.column));
            }
            out.push_str(&line);
            out.push('\n');
        }
    }

    if !info.enums.is_empty() {
        out.push_str("\n## Enumerated Types\n");
        for e in &info.enums {
            let values = e.values.iter().map(|v| format!("'{}'", v)).join(", ");
            out.push_str(&format!("- {}: {}\n", e.name, values));
        }
    }

    out.push_str("\n## Notes\n");
    for note in DOMAIN_NOTES {
        out.push_str(&format!("- {}\n", note));
    }
    for note in extra_notes {
        out.push_str(&format!("- {}\n", note));
    }
    out.push_str(&format!(
        "- Current date: {} (use CURRENT_DATE for relative dates).\n",
        today.format("%Y-%m-%d")
    ));

    SchemaDescription::new(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::{ColumnInfo, EnumInfo, ForeignKeyRef, TableInfo};

    fn sample() -> SchemaInfo {
        SchemaInfo {
            tables: vec![TableInfo {
                name: "students".into(),
                columns: vec![
                    ColumnInfo {
                        name: "id".into(),
                        data_type: "uuid".into(),
                        nullable: false,
                        references: None,
                    },
                    ColumnInfo {
                        name: "family_id".into(),
                        data_type: "uuid".into(),
                        nullable: true,
                        references: Some(ForeignKeyRef {
                            table: "families".into(),
                            column: "id".into(),
                        }),
                    },
                ],
            }],
            enums: vec![EnumInfo {
                name: "belt_rank".into(),
                values: vec!["white".into(), "black".into()],
            }],
        }
    }

    #[test]
    fn test_render_includes_structure_and_notes() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let notes = vec!["Belt ranks are ordered by enum position.".to_string()];
        let text = render_schema_description(&sample(), today, &notes);
        let s = text.as_str();

        assert!(s.contains("### students"));
        assert!(s.contains("- id: uuid NOT NULL"));
        assert!(s.contains("- family_id: uuid -> families.id"));
        assert!(s.contains("- belt_rank: 'white', 'black'"));
        assert!(s.contains("integer cents"));
        assert!(s.contains("Belt ranks are ordered by enum position."));
        assert!(s.contains("Current date: 2026-10-18"));
    }

    #[test]
    fn test_notes_section() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let text = render_schema_description(&sample(), today, &[]);
        assert!(text.notes().starts_with("- Monetary amounts"));
        assert!(!text.notes().contains("### students"));
        assert_eq!(SchemaDescription::new("### t").notes(), "");
    }

    #[test]
    fn test_render_without_enums_omits_section() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let text = render_schema_description(&SchemaInfo::default(), today, &[]);
        assert!(!text.as_str().contains("Enumerated Types"));
    }
}

//! Structured HTML extraction
//!
//! Walks table and section structure into normalized records. Markup that does
//! not match the expected structure yields no record for that row or section;
//! extraction never fails.
//!
//! Columns are bound by position through a declarative table per schema, since
//! header text on the origin pages is not reliably parseable.

use crate::schema::{DegreeRecord, ExtractedRecord, RequirementRecord, Section};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;

/// How a cell's value is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellValue {
    /// Trimmed text content
    Text,
    /// Remainder of the first hyperlink target after `marker`
    LinkParam(&'static str),
}

/// Column position to named field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub index: usize,
    pub field: &'static str,
    pub value: CellValue,
}

/// A flat table: one record per body row with exactly `width` cells
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: &'static str,
    pub width: usize,
    pub columns: &'static [Column],
}

/// One independently located audit sub-region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionAnchor {
    pub section: Section,
    pub anchor: &'static str,
    pub rows: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSchema {
    pub heading: &'static str,
    pub sections: &'static [SectionAnchor],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionSchema {
    Table(TableSchema),
    Audit(AuditSchema),
}

const DEGREE_COLUMNS: &[Column] = &[
    Column { index: 0, field: "code", value: CellValue::Text },
    Column { index: 1, field: "name", value: CellValue::Text },
    Column { index: 2, field: "startTerm", value: CellValue::Text },
    Column { index: 3, field: "id", value: CellValue::LinkParam("degreeID=") },
];

const AUDIT_SECTIONS: &[SectionAnchor] = &[
    SectionAnchor {
        section: Section::Requirements,
        anchor: "#ctl00_mainContent_ctl13_panVizRequirements",
        rows: "tr.ReportGridItemA",
    },
    SectionAnchor {
        section: Section::Conditions,
        anchor: "#ctl00_mainContent_ctl13_panNonVisualRequirements",
        rows: "tr",
    },
    SectionAnchor {
        section: Section::Reuse,
        anchor: "#ctl00_mainContent_ctl13_panReuse",
        rows: "tr",
    },
];

/// Degree list grid. Four columns are required because the degree ID lives in the last one.
pub fn degree_schema() -> ExtractionSchema {
    ExtractionSchema::Table(TableSchema {
        table: "table.DeAcGridView",
        width: 4,
        columns: DEGREE_COLUMNS,
    })
}

/// Degree audit page with requirements, conditions and reuse panels
pub fn audit_schema() -> ExtractionSchema {
    ExtractionSchema::Audit(AuditSchema {
        heading: "h2",
        sections: AUDIT_SECTIONS,
    })
}

/// Extract every record `schema` describes from `html`
pub fn extract(html: &str, schema: &ExtractionSchema) -> Vec<ExtractedRecord> {
    let doc = Html::parse_document(html);
    match schema {
        ExtractionSchema::Table(table) => table_rows(&doc, table)
            .iter()
            .filter_map(degree_from_row)
            .map(ExtractedRecord::Degree)
            .collect(),
        ExtractionSchema::Audit(audit) => audit_records(&doc, audit)
            .into_iter()
            .map(ExtractedRecord::Requirement)
            .collect(),
    }
}

/// Rows of the first table matching the schema, as field maps
pub fn table_rows(doc: &Html, schema: &TableSchema) -> Vec<HashMap<&'static str, String>> {
    let Ok(table_sel) = Selector::parse(schema.table) else {
        return Vec::new();
    };
    let Some(table) = doc.select(&table_sel).next() else {
        return Vec::new();
    };

    let mut rows = Vec::new();
    for body in child_elements(table, "tbody") {
        for row in child_elements(body, "tr") {
            let cells: Vec<ElementRef> = child_elements(row, "td").collect();
            if cells.len() != schema.width {
                continue;
            }
            let fields: Option<HashMap<_, _>> = schema
                .columns
                .iter()
                .map(|col| {
                    cells
                        .get(col.index)
                        .and_then(|cell| read_cell(*cell, col.value))
                        .map(|v| (col.field, v))
                })
                .collect();
            if let Some(fields) = fields {
                rows.push(fields);
            }
        }
    }
    rows
}

fn degree_from_row(row: &HashMap<&'static str, String>) -> Option<DegreeRecord> {
    Some(DegreeRecord {
        code: row.get("code")?.clone(),
        name: row.get("name")?.clone(),
        id: row.get("id")?.clone(),
        start_term: row.get("startTerm")?.clone(),
    })
}

fn audit_records(doc: &Html, schema: &AuditSchema) -> Vec<RequirementRecord> {
    let Ok(heading_sel) = Selector::parse(schema.heading) else {
        return Vec::new();
    };
    let link_sel = Selector::parse("a[href]").expect("static selector");

    let mut records = Vec::new();
    for anchor in schema.sections {
        let (Ok(region_sel), Ok(row_sel)) =
            (Selector::parse(anchor.anchor), Selector::parse(anchor.rows))
        else {
            continue;
        };
        // Absent region: this degree simply has no such section
        let Some(region) = doc.select(&region_sel).next() else {
            continue;
        };

        for row in region.select(&row_sel) {
            let heading = row
                .select(&heading_sel)
                .find(|h| nearest_row(*h, &row_sel).is_some_and(|r| r.id() == row.id()));
            let Some(heading) = heading else {
                continue;
            };
            let link = heading
                .select(&link_sel)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(|href| href.trim().to_string());
            records.push(RequirementRecord {
                section: anchor.section,
                title: element_text(heading),
                link,
            });
        }
    }
    records
}

/// Closest ancestor matching the row selector; nested rows own their own headings
fn nearest_row<'a>(el: ElementRef<'a>, row_sel: &Selector) -> Option<ElementRef<'a>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| row_sel.matches(ancestor))
}

fn read_cell(cell: ElementRef, value: CellValue) -> Option<String> {
    match value {
        CellValue::Text => Some(element_text(cell)),
        CellValue::LinkParam(marker) => {
            let link_sel = Selector::parse("a[href]").expect("static selector");
            let href = cell.select(&link_sel).next()?.value().attr("href")?;
            href.split_once(marker).map(|(_, rest)| rest.trim().to_string())
        }
    }
}

/// Text content trimmed at the edges, inner whitespace untouched
fn element_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn child_elements<'a>(
    parent: ElementRef<'a>,
    tag: &'static str,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |el| el.value().name() == tag)
}

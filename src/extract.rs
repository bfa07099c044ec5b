//! Field extraction from a parsed source page.
//!
//! Uses the scraper crate for CSS queries. Extraction never fails outright:
//! every problem ends up in [`ExtractionOutcome`].

use crate::field::{Column, FieldDescriptor, FieldValue, Item, Rule};
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;

/// Result of extracting one field from one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Found(FieldValue),
    NotFound,
    Error(String),
}

impl ExtractionOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, ExtractionOutcome::Found(_))
    }
}

/// Extract a single field from a document.
pub fn extract(document: &Html, descriptor: &FieldDescriptor) -> ExtractionOutcome {
    let elements = match matched_elements(document, descriptor) {
        Ok(elements) => elements,
        Err(message) => return ExtractionOutcome::Error(message),
    };

    let value = match descriptor.rule.as_ref() {
        Some(Rule::Rows {
            max_items,
            columns,
            constants,
        }) => {
            let cell_selector = match parse_selector("td") {
                Ok(sel) => sel,
                Err(message) => return ExtractionOutcome::Error(message),
            };
            let items: Vec<Item> = elements
                .into_iter()
                .filter_map(|row| read_row(row, &cell_selector, columns, constants))
                .take(*max_items)
                .collect();
            (!items.is_empty()).then_some(FieldValue::Records(items))
        }
        rule => {
            let texts: Vec<String> = elements
                .into_iter()
                .map(element_text)
                .filter(|text| !text.is_empty())
                .collect();
            apply_rule(&texts, rule)
        }
    };

    match value {
        Some(value) => ExtractionOutcome::Found(value),
        None => ExtractionOutcome::NotFound,
    }
}

/// Every element holding a value, in document order.
fn matched_elements<'a>(
    document: &'a Html,
    descriptor: &FieldDescriptor,
) -> Result<Vec<ElementRef<'a>>, String> {
    let selector = parse_selector(&descriptor.selector)?;
    let value_selector = descriptor.value.as_deref().map(parse_selector).transpose()?;
    let label = descriptor.label.as_deref().map(str::to_lowercase);
    let header_selector = parse_selector("th")?;

    let mut elements = Vec::new();
    for element in document.select(&selector) {
        if let Some(label) = &label {
            let header = element
                .select(&header_selector)
                .next()
                .map(element_text)
                .unwrap_or_default();
            if !header.to_lowercase().contains(label) {
                continue;
            }
        }

        match &value_selector {
            Some(sel) => {
                if let Some(inner) = element.select(sel).next() {
                    elements.push(inner);
                }
            }
            None => elements.push(element),
        }
    }

    Ok(elements)
}

fn parse_selector(selector: &str) -> Result<Selector, String> {
    Selector::parse(selector).map_err(|e| format!("invalid selector `{}`: {}", selector, e))
}

/// Text content of an element with whitespace runs collapsed.
///
/// Text nodes are joined with a space so `Nairobi<br>1°16′S` does not fuse
/// into one word.
fn element_text(element: ElementRef<'_>) -> String {
    let raw = element.text().collect::<Vec<_>>().join(" ");
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One table row as an item. `None` when the row lacks a cell a column
/// needs or the first column is empty.
fn read_row(
    row: ElementRef<'_>,
    cell_selector: &Selector,
    columns: &[Column],
    constants: &BTreeMap<String, String>,
) -> Option<Item> {
    let cells: Vec<ElementRef<'_>> = row.select(cell_selector).collect();
    let mut item = constants.clone();
    for (i, column) in columns.iter().enumerate() {
        let text = strip_footnotes(&element_text(*cells.get(column.cell)?));
        let value = if column.digits {
            first_number(&text)
        } else {
            Some(text).filter(|t| !t.is_empty())
        };
        match value {
            Some(value) => {
                item.insert(column.name.clone(), value);
            }
            None if i == 0 => return None,
            None => {}
        }
    }
    Some(item)
}

fn apply_rule(matches: &[String], rule: Option<&Rule>) -> Option<FieldValue> {
    match rule {
        None => matches.first().cloned().map(FieldValue::Text),
        Some(Rule::Digits) => matches
            .first()
            .and_then(|text| first_number(text))
            .map(FieldValue::Text),
        Some(Rule::FirstLongerThan { min_chars }) => matches
            .iter()
            .find(|text| text.chars().count() > *min_chars)
            .cloned()
            .map(FieldValue::Text),
        Some(Rule::List {
            max_items,
            min_chars,
        }) => {
            let items: Vec<String> = matches
                .iter()
                .filter(|text| text.chars().count() > *min_chars)
                .take(*max_items)
                .cloned()
                .collect();
            (!items.is_empty()).then_some(FieldValue::List(items))
        }
        Some(Rule::StripFootnotes) => matches
            .first()
            .map(|text| strip_footnotes(text))
            .filter(|text| !text.is_empty())
            .map(FieldValue::Text),
        Some(Rule::Rows { .. }) => None,
    }
}

/// First run of digits and thousands separators, with the separators removed.
///
/// `"47,564,296 (2019 census)"` yields `"47564296"`.
pub fn first_number(text: &str) -> Option<String> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, ',' | '\u{a0}' | '\u{202f}'))
        .filter(|c| c.is_ascii_digit())
        .collect();
    (!digits.is_empty()).then_some(digits)
}

/// Remove bracketed footnote markers like `[1]`, `[a]` or `[citation needed]`.
pub fn strip_footnotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find(']') {
            Some(close) if close <= 20 && !after[..close].contains('[') => {
                rest = &after[close + 1..];
            }
            _ => {
                out.push('[');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFOBOX: &str = r#"
        <html><body>
        <h1 id="firstHeading">Kenya</h1>
        <table class="infobox">
          <tr><th>Capital<br>and largest city</th><td>Nairobi<br>1°16′S 36°48′E</td></tr>
          <tr><th>Official languages</th><td>English  Swahili</td></tr>
          <tr><th>Population</th></tr>
          <tr><th>• 2019 census</th><td>47,564,296<sup>[3]</sup> (27th)</td></tr>
          <tr><th>Currency</th><td>Kenyan shilling[4] (KES)</td></tr>
        </table>
        <table class="wikitable">
          <tbody>
            <tr><th>City</th><th>Population</th></tr>
            <tr><td>Nairobi</td><td>4,397,073[5]</td></tr>
            <tr><td>Mombasa</td><td>1,208,333</td></tr>
            <tr><td></td><td>12</td></tr>
            <tr><td>Kisumu</td><td>n/a</td></tr>
          </tbody>
        </table>
        <div class="mw-parser-output">
          <p>Short.</p>
          <p>Kenya, officially the Republic of Kenya, is a country located in East Africa.</p>
        </div>
        </body></html>
    "#;

    fn doc() -> Html {
        Html::parse_document(INFOBOX)
    }

    #[test]
    fn finds_heading_text() {
        let d = FieldDescriptor::new("country", "h1#firstHeading");
        assert_eq!(extract(&doc(), &d), ExtractionOutcome::Found("Kenya".into()));
    }

    #[test]
    fn label_selects_row_value() {
        let d = FieldDescriptor::row("capital", "table.infobox tr", "capital");
        assert_eq!(
            extract(&doc(), &d),
            ExtractionOutcome::Found("Nairobi 1°16′S 36°48′E".into())
        );

        let d = FieldDescriptor::row("official_languages", "table.infobox tr", "Official languages");
        assert_eq!(extract(&doc(), &d), ExtractionOutcome::Found("English Swahili".into()));
    }

    #[test]
    fn text_nodes_are_joined_with_spaces() {
        let html = Html::parse_document(
            "<table><tr><th>Languages</th><td>English<br>Swahili</td></tr>\
             <tr><th>Motto</th><td><i>Harambee</i>(\"All pull together\")</td></tr></table>",
        );
        let d = FieldDescriptor::row("official_languages", "tr", "Languages");
        assert_eq!(extract(&html, &d), ExtractionOutcome::Found("English Swahili".into()));

        let d = FieldDescriptor::row("motto", "tr", "Motto");
        assert_eq!(
            extract(&html, &d),
            ExtractionOutcome::Found("Harambee (\"All pull together\")".into())
        );
    }

    #[test]
    fn rows_rule_reads_table_into_items() {
        let mut constants = BTreeMap::new();
        constants.insert("population_year".to_string(), "2019".to_string());
        let d = FieldDescriptor::new("cities", "table.wikitable tbody tr").with_rule(Rule::Rows {
            max_items: 10,
            columns: vec![Column::text("name", 0), Column::number("population", 1)],
            constants,
        });

        let items = match extract(&doc(), &d) {
            ExtractionOutcome::Found(FieldValue::Records(items)) => items,
            other => panic!("unexpected outcome: {:?}", other),
        };
        // header row and the row with an empty name are skipped
        let names: Vec<&str> = items.iter().map(|i| i["name"].as_str()).collect();
        assert_eq!(names, vec!["Nairobi", "Mombasa", "Kisumu"]);
        assert_eq!(items[0]["population"], "4397073");
        assert_eq!(items[0]["population_year"], "2019");
        assert!(!items[2].contains_key("population"));
    }

    #[test]
    fn rows_rule_caps_items_and_needs_cells() {
        let d = FieldDescriptor::new("cities", "table.wikitable tbody tr").with_rule(Rule::Rows {
            max_items: 1,
            columns: vec![Column::text("name", 0)],
            constants: BTreeMap::new(),
        });
        match extract(&doc(), &d) {
            ExtractionOutcome::Found(FieldValue::Records(items)) => assert_eq!(items.len(), 1),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let d = FieldDescriptor::new("cities", "table.wikitable tbody tr").with_rule(Rule::Rows {
            max_items: 10,
            columns: vec![Column::text("name", 0), Column::text("area", 5)],
            constants: BTreeMap::new(),
        });
        assert_eq!(extract(&doc(), &d), ExtractionOutcome::NotFound);
    }

    #[test]
    fn digits_rule_keeps_first_number() {
        let d = FieldDescriptor::row("population", "table.infobox tr", "2019 census")
            .with_rule(Rule::Digits);
        assert_eq!(extract(&doc(), &d), ExtractionOutcome::Found("47564296".into()));
    }

    #[test]
    fn digits_rule_without_digits_is_not_found() {
        let d = FieldDescriptor::row("official_languages", "table.infobox tr", "Official languages")
            .with_rule(Rule::Digits);
        assert_eq!(extract(&doc(), &d), ExtractionOutcome::NotFound);
    }

    #[test]
    fn first_longer_than_skips_short_paragraphs() {
        let d = FieldDescriptor::new("introduction", ".mw-parser-output > p")
            .with_rule(Rule::FirstLongerThan { min_chars: 50 });
        match extract(&doc(), &d) {
            ExtractionOutcome::Found(FieldValue::Text(t)) => assert!(t.starts_with("Kenya, officially")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn zero_matches_is_not_found() {
        let d = FieldDescriptor::row("area", "table.infobox tr", "Total");
        assert_eq!(extract(&doc(), &d), ExtractionOutcome::NotFound);
    }

    #[test]
    fn malformed_selector_is_an_error() {
        let d = FieldDescriptor::new("capital", "th:has-text(\"Capital\") + td");
        assert!(matches!(extract(&doc(), &d), ExtractionOutcome::Error(_)));
    }

    #[test]
    fn list_rule_filters_and_caps() {
        let html = Html::parse_document(
            "<div class='w'><h2>Safari</h2><h2>Go</h2><h2>Beaches</h2><h2>Mountains</h2></div>",
        );
        let d = FieldDescriptor::new("tourism_highlights", ".w h2")
            .with_rule(Rule::List { max_items: 2, min_chars: 3 });
        assert_eq!(
            extract(&html, &d),
            ExtractionOutcome::Found(FieldValue::List(vec!["Safari".into(), "Beaches".into()]))
        );
    }

    #[test]
    fn first_number_handles_separators() {
        assert_eq!(first_number("47,564,296 (2019 census)").as_deref(), Some("47564296"));
        assert_eq!(first_number("580,367 km2 (224,081 sq mi)").as_deref(), Some("580367"));
        assert_eq!(first_number("no digits"), None);
    }

    #[test]
    fn strip_footnotes_removes_markers() {
        assert_eq!(strip_footnotes("Kenyan shilling[4] (KES)"), "Kenyan shilling (KES)");
        assert_eq!(strip_footnotes("Swahili[a][citation needed]"), "Swahili");
        assert_eq!(strip_footnotes("open [ bracket"), "open [ bracket");
    }
}

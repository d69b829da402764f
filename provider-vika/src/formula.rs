//! Rendering of [`RecordFilter`] into `filterByFormula` expressions

use bridge_traits::records::{FilterValue, RecordFilter};

use crate::error::{Result, VikaError};
use crate::schema::FieldSchema;

/// Logical key under which the primary record id is exposed
pub const RECORD_ID_KEY: &str = "recordId";

/// Render a filter as a Vika formula, translating logical keys to columns.
///
/// # Errors
///
/// Returns [`VikaError::UnsupportedFilter`] if the filter references the
/// record id, which the formula engine cannot match on.
///
/// # Example
///
/// ```
/// use bridge_traits::records::RecordFilter;
/// use provider_vika::{formula::render, FieldSchema};
///
/// let filter = RecordFilter::and(vec![
///     RecordFilter::is_true("abnormal"),
///     RecordFilter::is_empty("abnormalPhotos"),
/// ]);
/// let formula = render(&filter, &FieldSchema::receiving()).unwrap();
/// assert_eq!(formula, "AND({异常}=TRUE(), {异常图片}=BLANK())");
/// ```
pub fn render(filter: &RecordFilter, schema: &FieldSchema) -> Result<String> {
    if let Some(field) = filter.fields().into_iter().find(|f| *f == RECORD_ID_KEY) {
        return Err(VikaError::UnsupportedFilter(format!(
            "formula matching on `{}` is not supported; use a direct id lookup",
            field
        )));
    }
    Ok(render_node(filter, schema))
}

fn render_node(filter: &RecordFilter, schema: &FieldSchema) -> String {
    match filter {
        RecordFilter::Equals { field, value } => {
            format!("{{{}}}={}", schema.column(field), literal(value))
        }
        RecordFilter::IsEmpty(field) => format!("{{{}}}=BLANK()", schema.column(field)),
        RecordFilter::IsNotEmpty(field) => format!("NOT({{{}}}=BLANK())", schema.column(field)),
        RecordFilter::And(children) => combine("AND", "TRUE()", children, schema),
        RecordFilter::Or(children) => combine("OR", "FALSE()", children, schema),
    }
}

fn combine(op: &str, identity: &str, children: &[RecordFilter], schema: &FieldSchema) -> String {
    match children {
        [] => identity.to_string(),
        [only] => render_node(only, schema),
        _ => {
            let parts: Vec<String> = children.iter().map(|c| render_node(c, schema)).collect();
            format!("{}({})", op, parts.join(", "))
        }
    }
}

fn literal(value: &FilterValue) -> String {
    match value {
        FilterValue::Text(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        FilterValue::Bool(true) => "TRUE()".to_string(),
        FilterValue::Bool(false) => "FALSE()".to_string(),
        FilterValue::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
            format!("{}", *n as i64)
        }
        FilterValue::Number(n) => n.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_literals() {
        let schema = FieldSchema::receiving();

        assert_eq!(
            render(&RecordFilter::eq("packageNo", "B1"), &schema).unwrap(),
            "{入仓包裹单号}=\"B1\""
        );
        assert_eq!(
            render(&RecordFilter::eq("packageQty", 3.0), &schema).unwrap(),
            "{单个包裹数量}=3"
        );
        assert_eq!(
            render(&RecordFilter::eq("packageQty", 2.5), &schema).unwrap(),
            "{单个包裹数量}=2.5"
        );
        assert_eq!(
            render(&RecordFilter::eq("abnormal", false), &schema).unwrap(),
            "{异常}=FALSE()"
        );
    }

    #[test]
    fn test_text_is_escaped() {
        let formula = render(
            &RecordFilter::eq("remark", r#"say "hi" \ bye"#),
            &FieldSchema::default(),
        )
        .unwrap();

        assert_eq!(formula, r#"{remark}="say \"hi\" \\ bye""#);
    }

    #[test]
    fn test_nested_combinators() {
        let filter = RecordFilter::or(vec![
            RecordFilter::and(vec![
                RecordFilter::is_true("abnormal"),
                RecordFilter::is_not_empty("abnormalPhotos"),
            ]),
            RecordFilter::and(vec![RecordFilter::eq("packageNo", "B2")]),
        ]);

        assert_eq!(
            render(&filter, &FieldSchema::receiving()).unwrap(),
            "OR(AND({异常}=TRUE(), NOT({异常图片}=BLANK())), {入仓包裹单号}=\"B2\")"
        );
        assert_eq!(
            render(&RecordFilter::and(vec![]), &FieldSchema::default()).unwrap(),
            "TRUE()"
        );
    }

    #[test]
    fn test_record_id_is_rejected() {
        let filter = RecordFilter::and(vec![
            RecordFilter::is_true("abnormal"),
            RecordFilter::eq(RECORD_ID_KEY, "rec1"),
        ]);

        assert!(matches!(
            render(&filter, &FieldSchema::receiving()),
            Err(VikaError::UnsupportedFilter(_))
        ));
    }
}

//! Render an example subtree as the XML used in rule synthesis prompts:
//!
//! ```text
//! <card id="card1" x="60" y="77" width="434" height="58" parentId="example">
//!   <field id="field1" x="20" y="3" value="50" parentId="card2" />
//! </card>
//! ```

use crate::{ObjectId, ObjectRecord, ObjectStore, StoreResult};
use std::fmt::Write;

pub fn to_prompt_xml(store: &ObjectStore, id: &ObjectId) -> StoreResult<String> {
    let mut out = String::new();
    write_object(store, store.get(id)?, 0, &mut out);
    Ok(out)
}

fn write_object(store: &ObjectStore, record: &ObjectRecord, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let _ = write!(out, "{}<{} id=\"{}\"", indent, record.kind, escape(record.id.as_str()));

    for (key, value) in &record.properties {
        let _ = write!(out, " {}=\"{}\"", key, escape(&value.to_string()));
    }
    if let Some(parent_id) = &record.parent_id {
        let _ = write!(out, " parentId=\"{}\"", escape(parent_id.as_str()));
    }

    let children: Vec<&ObjectRecord> = record
        .child_ids
        .iter()
        .filter_map(|child| store.get(child).ok())
        .collect();

    if children.is_empty() {
        out.push_str(" />\n");
        return;
    }

    out.push_str(">\n");
    for child in children {
        write_object(store, child, depth + 1, out);
    }
    let _ = writeln!(out, "{}</{}>", indent, record.kind);
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IdGenerator, ObjectKind, Properties, Value};

    #[test]
    fn test_nested_xml() {
        let mut store = ObjectStore::with_id_generator(IdGenerator::sequential("x"));
        let mut props = Properties::new();
        props.insert("x".to_string(), Value::from(60));
        let card = store.create(ObjectKind::Card, props, None).unwrap();

        let mut props = Properties::new();
        props.insert("value".to_string(), Value::from("a < \"b\""));
        store.create(ObjectKind::Field, props, Some(&card)).unwrap();

        let xml = to_prompt_xml(&store, &card).unwrap();
        assert_eq!(
            xml,
            "<card id=\"x-2\" x=\"60\" parentId=\"x-1\">\n  <field id=\"x-3\" value=\"a &lt; &quot;b&quot;\" parentId=\"x-2\" />\n</card>\n"
        );
    }
}

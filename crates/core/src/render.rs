//! Structured-to-markdown renderer.
//!
//! Every tool response goes through here before it reaches the model. The
//! output is an indented bullet outline:
//!
//! ```text
//! - **next_page_token**: abc
//! - **results**:
//! 	- **name**: g1
//! 	---
//! ```
//!
//! Entries whose key is in the skip-set or whose value is falsy are dropped
//! at every depth, and a nested block that ends up empty drops its parent
//! entry too.

use crate::error::RenderError;
use crate::value::{Mapping, Value};
use std::collections::HashSet;

/// Nesting limit applied when none is configured.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Render `mapping` with the given skip keys and the default depth limit.
pub fn render(mapping: &Mapping, skip: &[&str]) -> Result<String, RenderError> {
    Renderer::new().skip(skip.iter().copied()).render(mapping)
}

/// Reusable renderer configuration.
#[derive(Debug, Clone)]
pub struct Renderer {
    skip: HashSet<String>,
    max_depth: usize,
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            skip: HashSet::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Add keys to omit at every nesting level.
    pub fn skip<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn render(&self, mapping: &Mapping) -> Result<String, RenderError> {
        self.mapping_block(mapping, 0)
    }

    fn check_depth(&self, depth: usize) -> Result<(), RenderError> {
        if depth > self.max_depth {
            return Err(RenderError::MalformedInput {
                depth,
                limit: self.max_depth,
            });
        }
        Ok(())
    }

    fn mapping_block(&self, mapping: &Mapping, depth: usize) -> Result<String, RenderError> {
        self.check_depth(depth)?;

        let mut out = String::new();
        for (key, value) in mapping.iter() {
            if self.skip.contains(key) || value.is_falsy() {
                continue;
            }

            let form = match value {
                Value::Empty => continue,
                Value::Scalar(scalar) => scalar.to_string(),
                Value::Mapping(inner) => {
                    let block = self.mapping_block(inner, depth + 1)?;
                    if block.is_empty() {
                        continue;
                    }
                    format!("\n{}", block)
                }
                Value::Sequence(items) => {
                    let block = self.sequence_block(items, depth)?;
                    if block.is_empty() {
                        continue;
                    }
                    format!("\n{}", block)
                }
            };

            push_indent(&mut out, depth);
            out.push_str("- **");
            out.push_str(key);
            out.push_str("**: ");
            out.push_str(&form);
            out.push('\n');
        }

        Ok(out)
    }

    /// Elements of a sequence owned by an entry at `depth` sit at `depth + 1`,
    /// each followed by a rule line.
    fn sequence_block(&self, items: &[Value], depth: usize) -> Result<String, RenderError> {
        let child = depth + 1;
        self.check_depth(child)?;

        let mut out = String::new();
        for item in items {
            if item.is_falsy() {
                continue;
            }

            match item {
                Value::Empty => continue,
                Value::Scalar(scalar) => {
                    push_indent(&mut out, child);
                    out.push_str("- ");
                    out.push_str(&scalar.to_string());
                    out.push('\n');
                }
                Value::Mapping(inner) => out.push_str(&self.mapping_block(inner, child)?),
                Value::Sequence(inner) => out.push_str(&self.sequence_block(inner, child)?),
            }

            push_indent(&mut out, child);
            out.push_str("---\n");
        }

        Ok(out)
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push('\t');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use serde_json::json;

    fn mapping(json: serde_json::Value) -> Mapping {
        Mapping::try_from(Value::from(json)).unwrap()
    }

    #[test]
    fn test_every_key_skipped_renders_empty() {
        let m = mapping(json!({"a": 1, "b": {"c": "x"}, "d": [1, 2]}));
        assert_eq!(render(&m, &["a", "b", "d"]).unwrap(), "");
    }

    #[test]
    fn test_falsy_entries_omitted() {
        let m = mapping(json!({"a": 0, "b": "", "c": null, "d": "x"}));
        assert_eq!(render(&m, &[]).unwrap(), "- **d**: x\n");
    }

    #[test]
    fn test_insertion_order_preserved() {
        let m = Mapping::new().with("k3", "c").with("k1", "a").with("k2", "b");
        assert_eq!(
            render(&m, &[]).unwrap(),
            "- **k3**: c\n- **k1**: a\n- **k2**: b\n"
        );
    }

    #[test]
    fn test_nested_mapping_indents_one_tab() {
        let m = mapping(json!({"outer": {"inner": "v"}}));
        assert_eq!(
            render(&m, &[]).unwrap(),
            "- **outer**: \n\t- **inner**: v\n\n"
        );
    }

    #[test]
    fn test_sequence_of_scalars() {
        let m = mapping(json!({"items": [1, 2]}));
        assert_eq!(
            render(&m, &[]).unwrap(),
            "- **items**: \n\t- 1\n\t---\n\t- 2\n\t---\n\n"
        );
    }

    #[test]
    fn test_empty_graph_collapses_parent() {
        let m = mapping(json!({"outer": {"inner": null}}));
        assert_eq!(render(&m, &[]).unwrap(), "");

        let m = mapping(json!({"items": [null, 0, "", {}]}));
        assert_eq!(render(&m, &[]).unwrap(), "");
    }

    #[test]
    fn test_log_group_listing() {
        let m = mapping(json!({
            "next_page_token": "abc",
            "results": [{"name": "g1"}, {"name": "g2"}]
        }));

        assert_eq!(
            render(&m, &[]).unwrap(),
            "- **next_page_token**: abc\n\
             - **results**: \n\
             \t- **name**: g1\n\
             \t---\n\
             \t- **name**: g2\n\
             \t---\n\n"
        );
    }

    #[test]
    fn test_skip_applies_at_every_depth() {
        let m = mapping(json!({
            "kind": "event",
            "summary": "Standup",
            "start": {"dateTime": "2025-05-16T10:00:00", "etag": "x"},
            "attendees": [{"email": "a@example.com", "etag": "y"}]
        }));

        let out = Renderer::new().skip(["kind", "etag"]).render(&m).unwrap();
        assert!(!out.contains("kind"));
        assert!(!out.contains("etag"));
        assert!(out.contains("\t- **dateTime**: 2025-05-16T10:00:00\n"));
        assert!(out.contains("\t- **email**: a@example.com\n"));
    }

    #[test]
    fn test_filtered_sequence_element_keeps_rule() {
        // A non-empty element that renders to nothing still gets its rule
        // line, so the entry survives.
        let m = mapping(json!({"rows": [{"etag": "x"}]}));
        assert_eq!(
            Renderer::new().skip(["etag"]).render(&m).unwrap(),
            "- **rows**: \n\t---\n\n"
        );
    }

    #[test]
    fn test_nested_sequence() {
        let m = mapping(json!({"grid": [[1, 2]]}));
        assert_eq!(
            render(&m, &[]).unwrap(),
            "- **grid**: \n\t\t- 1\n\t\t---\n\t\t- 2\n\t\t---\n\t---\n\n"
        );
    }

    #[test]
    fn test_scalars_render_as_text() {
        let m = Mapping::new()
            .with("ok", true)
            .with("rating", 4.5)
            .with("whole", 3.0)
            .with("count", 12)
            .with("big", 1e16)
            .with("tiny", 1e-5);
        assert_eq!(
            render(&m, &[]).unwrap(),
            "- **ok**: True\n- **rating**: 4.5\n- **whole**: 3.0\n- **count**: 12\n\
             - **big**: 1e+16\n- **tiny**: 1e-05\n"
        );
    }

    #[test]
    fn test_depth_limit() {
        let m = mapping(json!({"a": {"b": {"c": "x"}}}));
        assert!(Renderer::new().max_depth(2).render(&m).is_ok());

        let m = mapping(json!({"a": {"b": {"c": {"d": "x"}}}}));
        assert_eq!(
            Renderer::new().max_depth(2).render(&m).unwrap_err(),
            RenderError::MalformedInput { depth: 3, limit: 2 }
        );
    }

    #[test]
    fn test_default_depth_limit_rejects_deep_input() {
        let mut value = Value::from("leaf");
        for _ in 0..(DEFAULT_MAX_DEPTH + 5) {
            value = Mapping::new().with("n", value).into();
        }
        let m = Mapping::try_from(value).unwrap();

        assert!(matches!(
            render(&m, &[]),
            Err(RenderError::MalformedInput { limit: DEFAULT_MAX_DEPTH, .. })
        ));
    }
}

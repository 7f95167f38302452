use std::collections::BTreeMap;
use std::fmt;

/// An entry in the output for explaining a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainEntry {
    /// Name of the node.
    pub name: String,
    /// Items to display in the explain entry.
    ///
    /// Using a btree for consistent ordering in test output.
    pub items: BTreeMap<String, ExplainValue>,
}

impl ExplainEntry {
    pub fn new(name: impl Into<String>) -> Self {
        ExplainEntry {
            name: name.into(),
            items: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.items
            .insert(key.into(), ExplainValue::Value(value.to_string()));
        self
    }

    pub fn with_values<S: fmt::Display>(
        mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        let vals = ExplainValue::Values(values.into_iter().map(|s| s.to_string()).collect());
        self.items.insert(key.into(), vals);
        self
    }
}

impl fmt::Display for ExplainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.items.is_empty() {
            write!(f, " (")?;
            for (idx, (k, v)) in self.items.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k} = {v}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExplainValue {
    Value(String),
    Values(Vec<String>),
}

impl fmt::Display for ExplainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::Values(v) => write!(f, "[{}]", v.join(", ")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExplainConfig {
    /// Include resolved schemas.
    pub verbose: bool,
}

/// Explain a single node in a query tree.
pub trait Explainable {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry;
}

/// A tree of explain entries mirroring the shape of the explained plan.
#[derive(Debug)]
pub struct ExplainNode {
    pub entry: ExplainEntry,
    pub children: Vec<ExplainNode>,
}

impl ExplainNode {
    fn fmt_indented(&self, indent: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}{}", " ".repeat(indent), self.entry)?;
        for child in &self.children {
            child.fmt_indented(indent + 2, f)?;
        }
        Ok(())
    }
}

/// Indented text, two spaces per level.
impl fmt::Display for ExplainNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_display() {
        let entry = ExplainEntry::new("Projection")
            .with_values("expressions", ["a", "b"])
            .with_value("alias", "t");
        assert_eq!("Projection (alias = t, expressions = [a, b])", entry.to_string());
    }

    #[test]
    fn nested_text() {
        let node = ExplainNode {
            entry: ExplainEntry::new("Slice"),
            children: vec![ExplainNode {
                entry: ExplainEntry::new("Load").with_value("name", "employees"),
                children: Vec::new(),
            }],
        };
        assert_eq!("Slice\n  Load (name = employees)\n", node.to_string());
    }
}

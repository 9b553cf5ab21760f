//! Debug information: instruction-to-source mapping.
//!
//! The code compiler records the span of the resolved node each emitted
//! instruction came from; the table is queryable per function for
//! diagnostics and the back-end emitter.

use indexmap::IndexMap;

use crate::{objects::ObjectLocation, span::SpanInfo};

/// One instruction's source attribution.
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionSpan {
    /// Index of the instruction inside its function body
    pub instruction: usize,
    pub span: SpanInfo,
}

#[derive(Debug, Default)]
pub struct DebugInfo {
    tables: IndexMap<ObjectLocation, Vec<InstructionSpan>>,
}

impl DebugInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, function: ObjectLocation, instruction: usize, span: SpanInfo) {
        self.tables
            .entry(function)
            .or_default()
            .push(InstructionSpan { instruction, span });
    }

    /// The span table of one function, in emission order.
    pub fn spans_for(&self, function: ObjectLocation) -> &[InstructionSpan] {
        self.tables
            .get(&function)
            .map(|table| table.as_slice())
            .unwrap_or(&[])
    }

    /// The source span of a specific instruction, if recorded.
    pub fn span_of(&self, function: ObjectLocation, instruction: usize) -> Option<&SpanInfo> {
        self.spans_for(function)
            .iter()
            .rev()
            .find(|entry| entry.instruction <= instruction)
            .map(|entry| &entry.span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::SourceFile;

    #[test]
    fn span_lookup_finds_nearest_preceding_entry() {
        let mut debug = DebugInfo::new();
        let function = ObjectLocation(0);
        let file = SourceFile::new(vec!["test".into()], "a b".to_string());
        debug.record(function, 0, SpanInfo::new(0..1, file.clone()));
        debug.record(function, 2, SpanInfo::new(2..3, file));

        assert_eq!(debug.span_of(function, 0).unwrap().position, 0..1);
        assert_eq!(debug.span_of(function, 1).unwrap().position, 0..1);
        assert_eq!(debug.span_of(function, 2).unwrap().position, 2..3);
        assert!(debug.span_of(ObjectLocation(9), 0).is_none());
    }
}

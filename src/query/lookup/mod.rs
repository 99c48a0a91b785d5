//! Group lookup: locates ancestors and one descendant branch of each input
//! row through hierarchical keys.
//!
//! For each input row the hkey is obtained. For each ancestor table the hkey
//! is shortened to that table's depth and the group is searched for a row
//! with exactly that key; a missing row (an orphan) is skipped silently. If
//! descendants were requested, the hkey is extended with the ordinal of the
//! child table leading to them and that subtree is scanned. Output follows
//! hkey order: ancestors, then the input row when it is kept, then
//! descendants.
//!
//! Two executions share one [`LookupPlan`]: a serial one that performs the
//! lookups of one input row at a time, and a lookahead one that keeps up to a
//! quantum of group cursors open for rows further down the input, possibly
//! belonging to later outer-loop contexts.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::config::LookupConfig;
use crate::storage::{Group, RowType};
use crate::types::{Result, TableId};

use super::bindings::QueryContext;
use super::cursor::{BindingsCursor, Cursor, Operator};

#[cfg(test)]
mod fixtures;
mod lookahead;
mod resolver;
mod serial;

pub use lookahead::LookaheadExecution;
pub use resolver::{BranchPlan, LookupPlan};
pub use serial::{LookupState, SerialExecution};

/// Whether input rows appear in the output stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum InputPreservation {
    /// Input rows are emitted between their ancestors and descendants.
    KeepInput,
    /// Input rows are consumed.
    DiscardInput,
}

/// The group lookup operator.
pub struct GroupLookup {
    input: Arc<dyn Operator>,
    group: Arc<Group>,
    plan: Arc<LookupPlan>,
    lookahead_quantum: usize,
}

impl GroupLookup {
    /// Builds the operator, validating every argument.
    ///
    /// `lookahead_quantum <= 1` selects serial execution.
    pub fn new(
        input: Arc<dyn Operator>,
        group: Arc<Group>,
        input_row_type: RowType,
        output_tables: &[TableId],
        flag: InputPreservation,
        lookahead_quantum: usize,
    ) -> Result<Self> {
        let plan = LookupPlan::resolve(&group, &input_row_type, output_tables, flag)?;
        Ok(Self {
            input,
            group,
            plan: Arc::new(plan),
            lookahead_quantum,
        })
    }

    /// Builds the operator taking the lookahead quantum from `config`.
    pub fn with_config(
        input: Arc<dyn Operator>,
        group: Arc<Group>,
        input_row_type: RowType,
        output_tables: &[TableId],
        flag: InputPreservation,
        config: &LookupConfig,
    ) -> Result<Self> {
        Self::new(
            input,
            group,
            input_row_type,
            output_tables,
            flag,
            config.lookahead_quantum,
        )
    }

    /// Classification computed at construction.
    pub fn plan(&self) -> &LookupPlan {
        &self.plan
    }

    /// Group the lookups run against.
    pub fn group(&self) -> &Arc<Group> {
        &self.group
    }

    /// Configured lookahead quantum.
    pub fn lookahead_quantum(&self) -> usize {
        self.lookahead_quantum
    }

    /// Row types this operator adds to its input's, in emission order.
    pub fn output_row_types(&self) -> Vec<RowType> {
        self.plan
            .output_tables()
            .into_iter()
            .map(RowType::Table)
            .collect()
    }

    /// Structured description used by explain output.
    pub fn explain(&self) -> LookupExplain {
        LookupExplain {
            name: "GroupLookup",
            group: self.group.name().to_owned(),
            input_type: self.plan.input_row_type().display(&self.group).to_string(),
            output_types: self
                .plan
                .output_tables()
                .into_iter()
                .map(|id| self.group.table_name(id))
                .collect(),
            keep_input: self.plan.keep_input(),
            lookahead_quantum: self.lookahead_quantum,
        }
    }
}

impl Operator for GroupLookup {
    fn cursor(
        &self,
        context: &QueryContext,
        bindings: Box<dyn BindingsCursor>,
    ) -> Result<Box<dyn Cursor>> {
        let input = self.input.cursor(context, bindings)?;
        if self.lookahead_quantum <= 1 {
            Ok(Box::new(SerialExecution::new(
                context.clone(),
                input,
                &self.group,
                Arc::clone(&self.plan),
            )?))
        } else {
            Ok(Box::new(LookaheadExecution::new(
                context.clone(),
                input,
                &self.group,
                Arc::clone(&self.plan),
                self.lookahead_quantum,
            )?))
        }
    }

    fn describe_plan(&self) -> String {
        format!("{}\n{}", self.input.describe_plan(), self)
    }
}

impl fmt::Display for GroupLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GroupLookup({} -> [",
            self.plan.input_row_type().display(&self.group)
        )?;
        for (idx, table) in self.plan.output_tables().into_iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&self.group.table_name(table))?;
        }
        f.write_str("])")
    }
}

/// Serializable operator description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LookupExplain {
    /// Operator name.
    pub name: &'static str,
    /// Group searched.
    pub group: String,
    /// Input row type.
    pub input_type: String,
    /// Output tables in emission order.
    pub output_types: Vec<String>,
    /// Whether input rows are kept.
    pub keep_input: bool,
    /// Configured lookahead quantum.
    pub lookahead_quantum: usize,
}

impl LookupExplain {
    /// Renders the description as JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

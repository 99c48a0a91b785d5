//! Classification of requested output tables against the input row type.

use crate::storage::{Group, HKey, RowType, Table};
use crate::types::{LookupError, Ordinal, Result, TableId};

use super::InputPreservation;

/// Descendant tables found by one subtree scan per input row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchPlan {
    output_tables: Vec<TableId>,
    root_ordinal: Option<Ordinal>,
}

impl BranchPlan {
    /// Requested descendant tables, shallow to deep.
    pub fn output_tables(&self) -> &[TableId] {
        &self.output_tables
    }

    /// Ordinal of the child table the scan is confined to, or `None` when the
    /// scan covers the input row's whole subtree.
    pub fn root_ordinal(&self) -> Option<Ordinal> {
        self.root_ordinal
    }

    /// Returns `true` for rows the scan should emit.
    pub fn wants(&self, row_type: &RowType) -> bool {
        match row_type {
            RowType::Table(table) => self.output_tables.contains(table),
            _ => false,
        }
    }

    /// Writes the scan anchor for an input row with key `input` into `target`.
    pub fn anchor_into(&self, input: &HKey, target: &mut HKey) {
        input.copy_to(target);
        if let Some(ordinal) = self.root_ordinal {
            target.extend_with_ordinal(ordinal);
        }
    }
}

/// Immutable description of what a group lookup fetches for each input row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupPlan {
    input_row_type: RowType,
    input_table: TableId,
    ancestors: Vec<Table>,
    branch: Option<BranchPlan>,
    keep_input: bool,
}

impl LookupPlan {
    /// Classifies `outputs` as ancestors or descendants of `input_row_type`.
    pub fn resolve(
        group: &Group,
        input_row_type: &RowType,
        outputs: &[TableId],
        flag: InputPreservation,
    ) -> Result<Self> {
        if outputs.is_empty() {
            return Err(LookupError::Config("output row types must not be empty".into()));
        }
        let keep_input = flag == InputPreservation::KeepInput;
        let input_table = input_row_type.table();
        group.table(input_table)?;
        if !input_row_type.is_table() && keep_input {
            return Err(LookupError::Config(format!(
                "input rows of type {} cannot be kept",
                input_row_type.display(group)
            )));
        }

        let mut ancestors = Vec::with_capacity(outputs.len());
        let mut branch_outputs: Vec<TableId> = Vec::new();
        let mut branch_root: Option<TableId> = None;
        let mut output_input_table = false;
        for &output in outputs {
            let table = group.table(output)?;
            if output == input_table {
                if keep_input {
                    return Err(LookupError::Config(format!(
                        "output type {} is the input table; input rows must be discarded",
                        table.name()
                    )));
                }
                output_input_table = true;
            } else if group.is_ancestor(output, input_table) {
                ancestors.push(table.clone());
            } else if group.is_ancestor(input_table, output) {
                branch_outputs.push(output);
                if branch_root != Some(input_table) {
                    let child = group.child_toward(input_table, output)?;
                    branch_root = match branch_root {
                        None => Some(child),
                        Some(existing) if existing == child => Some(existing),
                        Some(_) => Some(input_table),
                    };
                }
            } else {
                return Err(LookupError::Config(format!(
                    "output type {} must be an ancestor or descendant of {}",
                    table.name(),
                    input_row_type.display(group)
                )));
            }
        }

        if output_input_table {
            if branch_root == Some(input_table) {
                branch_outputs.push(input_table);
            } else {
                ancestors.push(group.table(input_table)?.clone());
            }
        }
        ancestors.sort_by_key(Table::depth);
        let branch = match branch_root {
            None => None,
            Some(root) => {
                let mut with_depth = branch_outputs
                    .into_iter()
                    .map(|id| group.table(id).map(|t| (t.depth(), id)))
                    .collect::<Result<Vec<_>>>()?;
                with_depth.sort_by_key(|(depth, _)| *depth);
                let root_ordinal = if root == input_table {
                    None
                } else {
                    Some(group.table(root)?.ordinal())
                };
                Some(BranchPlan {
                    output_tables: with_depth.into_iter().map(|(_, id)| id).collect(),
                    root_ordinal,
                })
            }
        };

        Ok(Self {
            input_row_type: input_row_type.clone(),
            input_table,
            ancestors,
            branch,
            keep_input,
        })
    }

    /// Type of the rows this lookup expands.
    pub fn input_row_type(&self) -> &RowType {
        &self.input_row_type
    }

    /// Table the input rows belong to.
    pub fn input_table(&self) -> TableId {
        self.input_table
    }

    /// Tables fetched by exact point lookups, shallow to deep.
    pub fn ancestors(&self) -> &[Table] {
        &self.ancestors
    }

    /// Descendant scan, if any descendants were requested.
    pub fn branch(&self) -> Option<&BranchPlan> {
        self.branch.as_ref()
    }

    /// Whether input rows are passed through to the output.
    pub fn keep_input(&self) -> bool {
        self.keep_input
    }

    /// Number of group sub-cursors needed per input row.
    pub fn cursors_per_row(&self) -> usize {
        self.ancestors.len() + usize::from(self.branch.is_some())
    }

    /// Output tables in emission order.
    pub fn output_tables(&self) -> Vec<TableId> {
        let mut tables: Vec<TableId> = self.ancestors.iter().map(Table::id).collect();
        if let Some(branch) = &self.branch {
            tables.extend_from_slice(&branch.output_tables);
        }
        tables
    }
}

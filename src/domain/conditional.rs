//! Conditional block chains edited interactively and compiled to formulas.
//!
//! A chain is right-leaning: each block's `otherwise` is empty, a terminal
//! value, or the next block in an "IF / ELSE IF / ... / ELSE" sequence.
//! Every edit returns a new chain; the original is never mutated.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionalBlock {
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub then: String,
    #[serde(default, rename = "else")]
    pub otherwise: ElseBranch,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElseBranch {
    #[default]
    None,
    Value(String),
    Block(Box<ConditionalBlock>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockField {
    Condition,
    Then,
    Else,
}

/// Address of one editable text field. `depth` counts `ElseBranch::Block`
/// links followed from the root block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldPath {
    pub depth: usize,
    pub field: BlockField,
}

impl FieldPath {
    pub fn new(depth: usize, field: BlockField) -> Self {
        Self { depth, field }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuilderError {
    #[error("no block at depth {0}")]
    NoSuchBlock(usize),

    #[error("block at depth {0} already has an else branch")]
    ElseOccupied(usize),

    #[error("else branch at depth {0} is not a text value")]
    NotAValue(usize),
}

impl ConditionalBlock {
    pub fn new(condition: impl Into<String>, then: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            then: then.into(),
            otherwise: ElseBranch::None,
        }
    }

    pub fn with_else(mut self, otherwise: ElseBranch) -> Self {
        self.otherwise = otherwise;
        self
    }

    /// Number of blocks in the chain, including this one.
    pub fn chain_len(&self) -> usize {
        match &self.otherwise {
            ElseBranch::Block(next) => 1 + next.chain_len(),
            _ => 1,
        }
    }

    pub fn block_at(&self, depth: usize) -> Option<&ConditionalBlock> {
        match (depth, &self.otherwise) {
            (0, _) => Some(self),
            (d, ElseBranch::Block(next)) => next.block_at(d - 1),
            _ => None,
        }
    }

    /// Text currently stored at `path`, if that field exists.
    pub fn field(&self, path: FieldPath) -> Option<&str> {
        let block = self.block_at(path.depth)?;
        match path.field {
            BlockField::Condition => Some(&block.condition),
            BlockField::Then => Some(&block.then),
            BlockField::Else => match &block.otherwise {
                ElseBranch::Value(v) => Some(v),
                _ => None,
            },
        }
    }

    /// Rebuild the chain with `edit` applied to the block at `depth`.
    fn update_at<F>(&self, depth: usize, edit: F) -> Result<ConditionalBlock, BuilderError>
    where
        F: FnOnce(&ConditionalBlock) -> Result<ConditionalBlock, BuilderError>,
    {
        self.update_from(depth, depth, edit)
    }

    fn update_from<F>(
        &self,
        remaining: usize,
        target: usize,
        edit: F,
    ) -> Result<ConditionalBlock, BuilderError>
    where
        F: FnOnce(&ConditionalBlock) -> Result<ConditionalBlock, BuilderError>,
    {
        if remaining == 0 {
            return edit(self);
        }
        match &self.otherwise {
            ElseBranch::Block(next) => {
                let updated = next.update_from(remaining - 1, target, edit)?;
                Ok(ConditionalBlock {
                    condition: self.condition.clone(),
                    then: self.then.clone(),
                    otherwise: ElseBranch::Block(Box::new(updated)),
                })
            }
            _ => Err(BuilderError::NoSuchBlock(target)),
        }
    }

    /// Replace the text at `path`. Setting `Else` on a block whose else is
    /// empty turns it into a terminal value; setting it over a nested block
    /// is rejected.
    pub fn set_field(&self, path: FieldPath, text: &str) -> Result<ConditionalBlock, BuilderError> {
        self.update_at(path.depth, |block| {
            let mut next = block.clone();
            match path.field {
                BlockField::Condition => next.condition = text.to_string(),
                BlockField::Then => next.then = text.to_string(),
                BlockField::Else => match block.otherwise {
                    ElseBranch::Block(_) => return Err(BuilderError::NotAValue(path.depth)),
                    _ => next.otherwise = ElseBranch::Value(text.to_string()),
                },
            }
            Ok(next)
        })
    }

    pub fn set_condition(&self, depth: usize, text: &str) -> Result<ConditionalBlock, BuilderError> {
        self.set_field(FieldPath::new(depth, BlockField::Condition), text)
    }

    pub fn set_then(&self, depth: usize, text: &str) -> Result<ConditionalBlock, BuilderError> {
        self.set_field(FieldPath::new(depth, BlockField::Then), text)
    }

    pub fn set_else(&self, depth: usize, text: &str) -> Result<ConditionalBlock, BuilderError> {
        self.set_field(FieldPath::new(depth, BlockField::Else), text)
    }

    /// Add a terminal "OR ELSE" value to the block at `depth`.
    pub fn add_else_branch(&self, depth: usize) -> Result<ConditionalBlock, BuilderError> {
        self.update_at(depth, |block| match block.otherwise {
            ElseBranch::None => Ok(block.clone().with_else(ElseBranch::Value(String::new()))),
            _ => Err(BuilderError::ElseOccupied(depth)),
        })
    }

    /// Add a fresh "OR IF" block after the block at `depth`.
    pub fn add_else_if_branch(&self, depth: usize) -> Result<ConditionalBlock, BuilderError> {
        self.update_at(depth, |block| match block.otherwise {
            ElseBranch::None => Ok(block
                .clone()
                .with_else(ElseBranch::Block(Box::new(ConditionalBlock::default())))),
            _ => Err(BuilderError::ElseOccupied(depth)),
        })
    }

    /// Drop the else branch at `depth` along with any chain beneath it.
    pub fn remove_else(&self, depth: usize) -> Result<ConditionalBlock, BuilderError> {
        self.update_at(depth, |block| Ok(block.clone().with_else(ElseBranch::None)))
    }

    /// Append `token` to the text at `path`.
    pub fn append_to_field(&self, path: FieldPath, token: &str) -> Result<ConditionalBlock, BuilderError> {
        let current = match self.field(path) {
            Some(text) => text.to_string(),
            None if path.field == BlockField::Else => {
                if self.block_at(path.depth).is_none() {
                    return Err(BuilderError::NoSuchBlock(path.depth));
                }
                return Err(BuilderError::NotAValue(path.depth));
            }
            None => return Err(BuilderError::NoSuchBlock(path.depth)),
        };
        self.set_field(path, &(current + token))
    }
}

/// Editing session over one chain: the tree plus whichever field has focus.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionalBuilder {
    tree: ConditionalBlock,
    focus: Option<FieldPath>,
}

impl ConditionalBuilder {
    pub fn new(tree: ConditionalBlock) -> Self {
        Self { tree, focus: None }
    }

    pub fn tree(&self) -> &ConditionalBlock {
        &self.tree
    }

    pub fn focus(&self) -> Option<FieldPath> {
        self.focus
    }

    /// Focus a field. Paths that do not name an existing text field clear the focus.
    pub fn focus_field(&mut self, path: FieldPath) {
        self.focus = self.tree.field(path).map(|_| path);
    }

    pub fn clear_focus(&mut self) {
        self.focus = None;
    }

    pub fn apply<F>(&mut self, edit: F) -> Result<(), BuilderError>
    where
        F: FnOnce(&ConditionalBlock) -> Result<ConditionalBlock, BuilderError>,
    {
        self.tree = edit(&self.tree)?;
        if let Some(path) = self.focus {
            if self.tree.field(path).is_none() {
                self.focus = None;
            }
        }
        Ok(())
    }

    /// Append a variable token or operator to the focused field. Does nothing
    /// when no field has focus.
    pub fn insert_token(&mut self, token: &str) -> Result<(), BuilderError> {
        match self.focus {
            Some(path) => self.apply(|tree| tree.append_to_field(path, token)),
            None => Ok(()),
        }
    }

    pub fn compile(&self) -> String {
        crate::domain::formula_compiler::compile(&self.tree)
    }
}

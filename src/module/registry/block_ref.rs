//! Caller-facing block references

use std::fmt;
use std::str::FromStr;

use crate::module::traits::BlockError;

/// How a caller names a block
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockRef {
    /// A raw block identifier, no registry lookup
    Id(String),
    /// A component name in the global registry
    Name(String),
    /// A component name scoped to one author
    AuthorName { author: String, name: String },
}

impl BlockRef {
    pub fn id(block_id: impl Into<String>) -> Self {
        BlockRef::Id(block_id.into())
    }

    pub fn name(name: impl Into<String>) -> Self {
        BlockRef::Name(name.into())
    }

    pub fn author_name(author: impl Into<String>, name: impl Into<String>) -> Self {
        BlockRef::AuthorName {
            author: author.into(),
            name: name.into(),
        }
    }
}

/// Parses `id:<blockId>`, `<author>/<name>` or `<name>`
impl FromStr for BlockRef {
    type Err = BlockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(block_id) = s.strip_prefix("id:") {
            let block_id = block_id.trim();
            if block_id.is_empty() {
                return Err(BlockError::InvalidReference(s.to_string()));
            }
            return Ok(BlockRef::id(block_id));
        }

        match s.split_once('/') {
            Some((author, name)) => {
                let (author, name) = (author.trim(), name.trim());
                if author.is_empty() || name.is_empty() || name.contains('/') {
                    return Err(BlockError::InvalidReference(s.to_string()));
                }
                Ok(BlockRef::author_name(author, name))
            }
            None if s.is_empty() => Err(BlockError::InvalidReference(s.to_string())),
            None => Ok(BlockRef::name(s)),
        }
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockRef::Id(block_id) => write!(f, "id:{block_id}"),
            BlockRef::Name(name) => f.write_str(name),
            BlockRef::AuthorName { author, name } => write!(f, "{author}/{name}"),
        }
    }
}

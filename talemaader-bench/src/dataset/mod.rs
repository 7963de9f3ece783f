//! Idiom items, definitions and the gold label invariant

pub mod loader;

pub use loader::{load_dataset, load_dataset_from_str, LoadError};

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable, order-preserving identifier of an idiom item
pub type ItemId = u32;

/// Position of a definition among the four candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Letter {
    A,
    B,
    C,
    D,
}

impl Letter {
    pub const ALL: [Letter; 4] = [Letter::A, Letter::B, Letter::C, Letter::D];

    /// Zero-based position (A = 0)
    pub fn index(self) -> usize {
        match self {
            Letter::A => 0,
            Letter::B => 1,
            Letter::C => 2,
            Letter::D => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Letter> {
        Letter::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Letter::A => "A",
            Letter::B => "B",
            Letter::C => "C",
            Letter::D => "D",
        }
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Letter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(Letter::A),
            "B" => Ok(Letter::B),
            "C" => Ok(Letter::C),
            "D" => Ok(Letter::D),
            other => Err(format!("Not a definition letter: {}", other)),
        }
    }
}

/// Kind of a candidate definition.
///
/// The dataset marks each distractor with the way it misreads the idiom;
/// the discrepancy report uses this to classify wrong answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    True,
    /// Literal reading of the idiom's words
    Concrete,
    /// Figurative but wrong reading
    Abstract,
    /// Definition of an unrelated idiom
    Random,
    Unclassified,
}

impl DefinitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefinitionKind::True => "true definition",
            DefinitionKind::Concrete => "concrete misinterpretation",
            DefinitionKind::Abstract => "abstract misinterpretation",
            DefinitionKind::Random => "random definition",
            DefinitionKind::Unclassified => "unknown",
        }
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub text: String,
    pub is_true: bool,
    pub kind: DefinitionKind,
}

impl Definition {
    pub fn correct(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_true: true,
            kind: DefinitionKind::True,
        }
    }

    pub fn distractor(text: impl Into<String>, kind: DefinitionKind) -> Self {
        Self {
            text: text.into(),
            is_true: false,
            kind,
        }
    }
}

/// A malformed dataset row. Fatal for that item only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataIntegrityError {
    #[error("item {item_id}: expected 4 definitions, found {found}")]
    WrongDefinitionCount { item_id: ItemId, found: usize },

    #[error("item {item_id}: definition {letter} is empty")]
    MissingDefinition { item_id: ItemId, letter: Letter },

    #[error("item {item_id}: no definition is flagged as true")]
    NoTrueDefinition { item_id: ItemId },

    #[error("item {item_id}: {count} definitions are flagged as true")]
    MultipleTrueDefinitions { item_id: ItemId, count: usize },

    #[error("item {item_id}: idiom text is empty")]
    MissingIdiom { item_id: ItemId },

    #[error("no gold label found for idiom '{idiom}'")]
    MissingLabel { idiom: String },

    #[error("item {item_id}: invalid gold label '{value}'")]
    InvalidLabel { item_id: ItemId, value: String },

    #[error("item {item_id}: duplicate item id")]
    DuplicateId { item_id: ItemId },

    #[error("row {row}: unreadable record: {message}")]
    Unreadable { row: usize, message: String },
}

/// An idiom with its four candidate definitions, exactly one of them true
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdiomItem {
    id: ItemId,
    idiom: String,
    definitions: [Definition; 4],
    gold: Letter,
}

impl IdiomItem {
    /// Build an item, checking the one-true-definition invariant
    pub fn new(
        id: ItemId,
        idiom: impl Into<String>,
        definitions: Vec<Definition>,
    ) -> Result<Self, DataIntegrityError> {
        let idiom = idiom.into();
        if idiom.trim().is_empty() {
            return Err(DataIntegrityError::MissingIdiom { item_id: id });
        }

        let found = definitions.len();
        let definitions: [Definition; 4] = definitions
            .try_into()
            .map_err(|_| DataIntegrityError::WrongDefinitionCount { item_id: id, found })?;

        if let Some(letter) = Letter::ALL
            .into_iter()
            .find(|l| definitions[l.index()].text.trim().is_empty())
        {
            return Err(DataIntegrityError::MissingDefinition { item_id: id, letter });
        }

        let true_positions: Vec<Letter> = Letter::ALL
            .into_iter()
            .filter(|l| definitions[l.index()].is_true)
            .collect();

        let gold = match true_positions.as_slice() {
            [single] => *single,
            [] => return Err(DataIntegrityError::NoTrueDefinition { item_id: id }),
            many => {
                return Err(DataIntegrityError::MultipleTrueDefinitions {
                    item_id: id,
                    count: many.len(),
                })
            }
        };

        Ok(Self {
            id,
            idiom,
            definitions,
            gold,
        })
    }

    /// Build an item from four option texts and the position of the true one
    pub fn from_options(
        id: ItemId,
        idiom: impl Into<String>,
        options: [&str; 4],
        correct: Letter,
    ) -> Result<Self, DataIntegrityError> {
        let definitions = Letter::ALL
            .into_iter()
            .map(|l| {
                if l == correct {
                    Definition::correct(options[l.index()])
                } else {
                    Definition::distractor(options[l.index()], DefinitionKind::Unclassified)
                }
            })
            .collect();
        Self::new(id, idiom, definitions)
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn idiom(&self) -> &str {
        &self.idiom
    }

    pub fn definitions(&self) -> &[Definition; 4] {
        &self.definitions
    }

    pub fn definition(&self, letter: Letter) -> &Definition {
        &self.definitions[letter.index()]
    }

    /// Letter of the definition flagged as true
    pub fn gold_label(&self) -> Letter {
        self.gold
    }
}

/// A dataset row that failed validation and was skipped
#[derive(Debug, Clone)]
pub struct RejectedRow {
    /// 1-based data row (header excluded)
    pub row: usize,
    pub error: DataIntegrityError,
}

/// Validated idiom items in dataset order, plus the rows that were skipped
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    items: Vec<IdiomItem>,
    index: HashMap<ItemId, usize>,
    rejected: Vec<RejectedRow>,
}

impl Dataset {
    /// Build a dataset. Items repeating an earlier id are moved to `rejected`.
    pub fn new(items: Vec<IdiomItem>, mut rejected: Vec<RejectedRow>) -> Self {
        let mut kept = Vec::with_capacity(items.len());
        let mut index = HashMap::with_capacity(items.len());

        for (position, item) in items.into_iter().enumerate() {
            if index.contains_key(&item.id) {
                rejected.push(RejectedRow {
                    row: position + 1,
                    error: DataIntegrityError::DuplicateId { item_id: item.id },
                });
                continue;
            }
            index.insert(item.id, kept.len());
            kept.push(item);
        }

        Self {
            items: kept,
            index,
            rejected,
        }
    }

    pub fn from_items(items: Vec<IdiomItem>) -> Self {
        Self::new(items, Vec::new())
    }

    pub fn items(&self) -> &[IdiomItem] {
        &self.items
    }

    pub fn rejected(&self) -> &[RejectedRow] {
        &self.rejected
    }

    pub fn get(&self, id: ItemId) -> Option<&IdiomItem> {
        self.index.get(&id).map(|&i| &self.items[i])
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs(true_at: &[usize]) -> Vec<Definition> {
        (0..4)
            .map(|i| Definition {
                text: format!("definition {}", i),
                is_true: true_at.contains(&i),
                kind: DefinitionKind::Unclassified,
            })
            .collect()
    }

    #[test]
    fn test_gold_label_follows_true_position() {
        for position in 0..4 {
            let item = IdiomItem::new(1, "at gå som katten om den varme grød", defs(&[position])).unwrap();
            assert_eq!(item.gold_label(), Letter::from_index(position).unwrap());
            assert!(item.definition(item.gold_label()).is_true);
        }
    }

    #[test]
    fn test_rejects_zero_or_many_true_flags() {
        assert_eq!(
            IdiomItem::new(7, "idiom", defs(&[])).unwrap_err(),
            DataIntegrityError::NoTrueDefinition { item_id: 7 }
        );
        assert_eq!(
            IdiomItem::new(7, "idiom", defs(&[0, 2])).unwrap_err(),
            DataIntegrityError::MultipleTrueDefinitions { item_id: 7, count: 2 }
        );
    }

    #[test]
    fn test_rejects_missing_definition() {
        let mut definitions = defs(&[0]);
        definitions[2].text = "  ".to_string();
        assert_eq!(
            IdiomItem::new(3, "idiom", definitions).unwrap_err(),
            DataIntegrityError::MissingDefinition { item_id: 3, letter: Letter::C }
        );

        let short = defs(&[0]).into_iter().take(3).collect();
        assert!(matches!(
            IdiomItem::new(3, "idiom", short),
            Err(DataIntegrityError::WrongDefinitionCount { found: 3, .. })
        ));
    }

    #[test]
    fn test_dataset_rejects_duplicate_ids() {
        let a = IdiomItem::from_options(1, "x", ["a", "b", "c", "d"], Letter::A).unwrap();
        let b = IdiomItem::from_options(1, "y", ["a", "b", "c", "d"], Letter::B).unwrap();
        let c = IdiomItem::from_options(2, "z", ["a", "b", "c", "d"], Letter::C).unwrap();

        let dataset = Dataset::from_items(vec![a, b, c]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(1).unwrap().idiom(), "x");
        assert_eq!(dataset.rejected().len(), 1);
        assert_eq!(dataset.rejected()[0].row, 2);
    }

    #[test]
    fn test_letter_parsing() {
        assert_eq!("b".parse::<Letter>().unwrap(), Letter::B);
        assert_eq!(" D ".parse::<Letter>().unwrap(), Letter::D);
        assert!("E".parse::<Letter>().is_err());
        assert_eq!(Letter::from_index(4), None);
    }
}

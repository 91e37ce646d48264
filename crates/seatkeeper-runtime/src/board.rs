//! Board: a shared id ↔ value registry.
//!
//! Lets two parties that share no reference agree on which brand,
//! instance, installation or timer they mean. The board is constructed
//! explicitly and handed to whoever needs it.
//!
//! Ids look like `board0742`: prefix, sequence number, then two checksum
//! digits derived from SHA-256 of the prefix and sequence.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use seatkeeper_types::{
    Brand, InstallationId, InstanceId, Result, SeatkeeperError, TimerId, constants,
};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

/// Anything that can be published on the board.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BoardValue {
    Brand(Brand),
    Instance(InstanceId),
    Installation(InstallationId),
    Timer(TimerId),
}

/// A published board identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoardId(String);

impl BoardId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Default)]
struct BoardState {
    by_id: HashMap<String, BoardValue>,
    by_value: HashMap<BoardValue, BoardId>,
    next_seq: u64,
}

/// Registry service. Clones share the same entries.
#[derive(Debug, Clone)]
pub struct Board {
    prefix: String,
    state: Arc<RwLock<BoardState>>,
}

fn checksum(prefix: &str, seq: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(seq.as_bytes());
    let digest = hasher.finalize();
    format!(
        "{:0width$}",
        u16::from(digest[0]) % 100,
        width = constants::BOARD_CHECKSUM_DIGITS
    )
}

impl Board {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            state: Arc::new(RwLock::new(BoardState::default())),
        }
    }

    /// Publish `value`. Registering the same value again returns the same id.
    pub async fn register(&self, value: BoardValue) -> BoardId {
        if let Some(existing) = self.state.read().await.by_value.get(&value) {
            return existing.clone();
        }
        let mut state = self.state.write().await;
        // Lost a race with another registration of the same value.
        if let Some(existing) = state.by_value.get(&value) {
            return existing.clone();
        }
        let seq = state.next_seq.to_string();
        state.next_seq += 1;
        let id = BoardId(format!("{}{seq}{}", self.prefix, checksum(&self.prefix, &seq)));
        state.by_id.insert(id.0.clone(), value.clone());
        state.by_value.insert(value, id.clone());
        debug!(id = %id, "registered on board");
        id
    }

    /// Resolve an id.
    ///
    /// # Errors
    /// `InvalidBoardId` if the id is malformed or fails its checksum,
    /// `BoardIdNotFound` if it was never issued.
    pub async fn lookup(&self, id: &str) -> Result<BoardValue> {
        let invalid = || SeatkeeperError::InvalidBoardId(id.to_string());
        let digits = id.strip_prefix(self.prefix.as_str()).ok_or_else(invalid)?;
        if digits.len() <= constants::BOARD_CHECKSUM_DIGITS
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let (seq, check) = digits.split_at(digits.len() - constants::BOARD_CHECKSUM_DIGITS);
        if checksum(&self.prefix, seq) != check {
            return Err(invalid());
        }
        self.state
            .read()
            .await
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| SeatkeeperError::BoardIdNotFound(id.to_string()))
    }

    /// Number of published values.
    pub async fn len(&self) -> usize {
        self.state.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new(constants::DEFAULT_BOARD_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatkeeper_types::AssetKind;

    #[tokio::test]
    async fn register_is_idempotent() {
        let board = Board::default();
        let brand = Brand::new("Moola", AssetKind::Nat);
        let first = board.register(BoardValue::Brand(brand.clone())).await;
        let second = board.register(BoardValue::Brand(brand.clone())).await;
        assert_eq!(first, second);
        assert_eq!(board.len().await, 1);
        assert_eq!(
            board.lookup(first.as_str()).await.unwrap(),
            BoardValue::Brand(brand)
        );
    }

    #[tokio::test]
    async fn distinct_values_get_distinct_ids() {
        let board = Board::default();
        let a = board.register(BoardValue::Timer(TimerId::new())).await;
        let b = board.register(BoardValue::Instance(InstanceId::new())).await;
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("board"));
    }

    #[tokio::test]
    async fn corrupted_id_is_invalid() {
        let board = Board::default();
        let id = board.register(BoardValue::Timer(TimerId::new())).await;
        let mut corrupted = id.to_string();
        let last = corrupted.pop().unwrap();
        corrupted.push(if last == '9' { '0' } else { '9' });
        assert!(matches!(
            board.lookup(&corrupted).await.unwrap_err(),
            SeatkeeperError::InvalidBoardId(_)
        ));
        assert!(matches!(
            board.lookup("elsewhere012").await.unwrap_err(),
            SeatkeeperError::InvalidBoardId(_)
        ));
        assert!(matches!(
            board.lookup("board1").await.unwrap_err(),
            SeatkeeperError::InvalidBoardId(_)
        ));
    }

    #[tokio::test]
    async fn unissued_valid_id_is_not_found() {
        let board = Board::default();
        let seq = "41";
        let id = format!("board{seq}{}", checksum("board", seq));
        assert!(matches!(
            board.lookup(&id).await.unwrap_err(),
            SeatkeeperError::BoardIdNotFound(_)
        ));
    }
}

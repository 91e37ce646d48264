//! Proposals: the give/want terms and exit rule a seat is opened with.
//!
//! A proposal is declared once when an invitation is redeemed and is
//! immutable for the seat's lifetime.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use crate::{Allocation, Amount, Keyword, Result, SeatkeeperError, TimerId};

/// When and how a seat may be closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitRule {
    /// The owner may exit at any time with the current allocation.
    #[default]
    OnDemand,
    /// Forced exit once the referenced timer reaches `deadline`.
    AfterDeadline { timer: TimerId, deadline: u64 },
    /// Only contract logic may close the seat.
    Waived,
}

impl ExitRule {
    #[must_use]
    pub fn kind(&self) -> ExitKind {
        match self {
            Self::OnDemand => ExitKind::OnDemand,
            Self::AfterDeadline { .. } => ExitKind::AfterDeadline,
            Self::Waived => ExitKind::Waived,
        }
    }
}

/// Discriminant of [`ExitRule`], used by proposal shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitKind {
    OnDemand,
    AfterDeadline,
    Waived,
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnDemand => write!(f, "ON_DEMAND"),
            Self::AfterDeadline => write!(f, "AFTER_DEADLINE"),
            Self::Waived => write!(f, "WAIVED"),
        }
    }
}

/// A seat's declared terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub give: Allocation,
    pub want: Allocation,
    pub exit: ExitRule,
}

impl Proposal {
    #[must_use]
    pub fn new(give: Allocation, want: Allocation, exit: ExitRule) -> Self {
        Self { give, want, exit }
    }

    /// Builder: add a `give` entry.
    #[must_use]
    pub fn give(mut self, keyword: impl Into<Keyword>, amount: Amount) -> Self {
        self.give.insert(keyword.into(), amount);
        self
    }

    /// Builder: add a `want` entry.
    #[must_use]
    pub fn want(mut self, keyword: impl Into<Keyword>, amount: Amount) -> Self {
        self.want.insert(keyword.into(), amount);
        self
    }

    /// Builder: set the exit rule.
    #[must_use]
    pub fn exit(mut self, exit: ExitRule) -> Self {
        self.exit = exit;
        self
    }

    /// A keyword may not appear in both `give` and `want`.
    ///
    /// # Errors
    /// `ProposalShapeMismatch` naming the first overlapping keyword.
    pub fn check_keywords(&self) -> Result<()> {
        if let Some(keyword) = self.give.keys().find(|k| self.want.contains_key(*k)) {
            return Err(SeatkeeperError::ProposalShapeMismatch {
                reason: format!("keyword {keyword} is in both give and want"),
            });
        }
        Ok(())
    }
}

/// The give/want keywords and exit kind a handler requires.
///
/// `None` means "anything goes"; `Some(set)` requires exactly that key set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalShape {
    pub give: Option<BTreeSet<Keyword>>,
    pub want: Option<BTreeSet<Keyword>>,
    pub exit: Option<ExitKind>,
}

impl ProposalShape {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn give<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Keyword>,
    {
        self.give = Some(keywords.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn want<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Keyword>,
    {
        self.want = Some(keywords.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn exit(mut self, kind: ExitKind) -> Self {
        self.exit = Some(kind);
        self
    }

    /// # Errors
    /// `ProposalShapeMismatch` describing the first unmet requirement.
    pub fn check(&self, proposal: &Proposal) -> Result<()> {
        check_keys("give", self.give.as_ref(), &proposal.give)?;
        check_keys("want", self.want.as_ref(), &proposal.want)?;
        if let Some(kind) = self.exit {
            if proposal.exit.kind() != kind {
                return Err(SeatkeeperError::ProposalShapeMismatch {
                    reason: format!("exit must be {kind}, got {}", proposal.exit.kind()),
                });
            }
        }
        Ok(())
    }
}

fn check_keys(side: &str, required: Option<&BTreeSet<Keyword>>, actual: &Allocation) -> Result<()> {
    let Some(required) = required else {
        return Ok(());
    };
    let actual: BTreeSet<&Keyword> = actual.keys().collect();
    let expected: BTreeSet<&Keyword> = required.iter().collect();
    if actual != expected {
        return Err(SeatkeeperError::ProposalShapeMismatch {
            reason: format!("{side} keywords must be {expected:?}, got {actual:?}"),
        });
    }
    Ok(())
}

//! Asset model: brands, amounts, and their arithmetic.
//!
//! A [`Brand`] names a resource type. Fungible (`Nat`) brands measure
//! amounts as non-negative integers; non-fungible (`Set`) brands measure
//! amounts as sets of unique tokens. Arithmetic is only defined between
//! amounts of the same brand.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::{Deserialize, Serialize};

use crate::{BrandId, Result, SeatkeeperError};

/// Contract-chosen label for a slot in a proposal or allocation
/// (e.g., `"Tip"`, `"UnderlyingAsset"`).
pub type Keyword = String;

/// Per-keyword amounts held by a seat.
pub type Allocation = BTreeMap<Keyword, Amount>;

/// How amounts of a brand are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    /// Fungible: a non-negative integer.
    Nat,
    /// Non-fungible: a set of unique string tokens.
    Set,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nat => write!(f, "NAT"),
            Self::Set => write!(f, "SET"),
        }
    }
}

/// Identity of an asset type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Brand {
    pub id: BrandId,
    /// Display name (e.g., "Moola"). Not unique.
    pub name: String,
    pub kind: AssetKind,
}

impl Brand {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: AssetKind) -> Self {
        Self {
            id: BrandId::new(),
            name: name.into(),
            kind,
        }
    }
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The magnitude of an amount.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AmountValue {
    Nat(u64),
    Set(BTreeSet<String>),
}

/// An immutable `(brand, value)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    brand: Brand,
    value: AmountValue,
}

impl Amount {
    /// The additive identity for `brand`.
    #[must_use]
    pub fn empty(brand: &Brand) -> Self {
        let value = match brand.kind {
            AssetKind::Nat => AmountValue::Nat(0),
            AssetKind::Set => AmountValue::Set(BTreeSet::new()),
        };
        Self {
            brand: brand.clone(),
            value,
        }
    }

    /// A fungible amount.
    ///
    /// # Errors
    /// `KindMismatch` if `brand` is not a `Nat` brand.
    pub fn nat(brand: &Brand, value: u64) -> Result<Self> {
        if brand.kind != AssetKind::Nat {
            return Err(SeatkeeperError::KindMismatch {
                expected: format!("{brand} ({})", brand.kind),
                actual: AssetKind::Nat.to_string(),
            });
        }
        Ok(Self {
            brand: brand.clone(),
            value: AmountValue::Nat(value),
        })
    }

    /// A non-fungible amount made of `tokens`.
    ///
    /// # Errors
    /// - `KindMismatch` if `brand` is not a `Set` brand
    /// - `DuplicateToken` if a token is listed twice
    pub fn set<I, S>(brand: &Brand, tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if brand.kind != AssetKind::Set {
            return Err(SeatkeeperError::KindMismatch {
                expected: format!("{brand} ({})", brand.kind),
                actual: AssetKind::Set.to_string(),
            });
        }
        let mut set = BTreeSet::new();
        for token in tokens {
            let token = token.into();
            if set.contains(&token) {
                return Err(SeatkeeperError::DuplicateToken { token });
            }
            set.insert(token);
        }
        Ok(Self {
            brand: brand.clone(),
            value: AmountValue::Set(set),
        })
    }

    #[must_use]
    pub fn brand(&self) -> &Brand {
        &self.brand
    }

    #[must_use]
    pub fn value(&self) -> &AmountValue {
        &self.value
    }

    /// The integer magnitude, if this is a fungible amount.
    #[must_use]
    pub fn as_nat(&self) -> Option<u64> {
        match &self.value {
            AmountValue::Nat(n) => Some(*n),
            AmountValue::Set(_) => None,
        }
    }

    /// The tokens, if this is a non-fungible amount.
    #[must_use]
    pub fn tokens(&self) -> Option<&BTreeSet<String>> {
        match &self.value {
            AmountValue::Nat(_) => None,
            AmountValue::Set(tokens) => Some(tokens),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.value {
            AmountValue::Nat(n) => *n == 0,
            AmountValue::Set(tokens) => tokens.is_empty(),
        }
    }

    fn check_brand(&self, other: &Self) -> Result<()> {
        if self.brand.id != other.brand.id {
            return Err(self.mismatch(other));
        }
        Ok(())
    }

    fn mismatch(&self, other: &Self) -> SeatkeeperError {
        SeatkeeperError::KindMismatch {
            expected: format!("{} ({})", self.brand, self.brand.kind),
            actual: format!("{} ({})", other.brand, other.brand.kind),
        }
    }

    /// `self + other`. Set union refuses overlapping tokens.
    ///
    /// # Errors
    /// `KindMismatch`, `DuplicateToken`, or `AmountOverflow`.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.check_brand(other)?;
        let value = match (&self.value, &other.value) {
            (AmountValue::Nat(a), AmountValue::Nat(b)) => {
                AmountValue::Nat(a.checked_add(*b).ok_or(SeatkeeperError::AmountOverflow)?)
            }
            (AmountValue::Set(a), AmountValue::Set(b)) => {
                if let Some(token) = a.intersection(b).next() {
                    return Err(SeatkeeperError::DuplicateToken {
                        token: token.clone(),
                    });
                }
                AmountValue::Set(a.union(b).cloned().collect())
            }
            _ => return Err(self.mismatch(other)),
        };
        Ok(Self {
            brand: self.brand.clone(),
            value,
        })
    }

    /// `self - other`.
    ///
    /// # Errors
    /// `KindMismatch`, or `Underflow` if `other` is larger than `self`
    /// (for sets: not a subset of `self`).
    pub fn subtract(&self, other: &Self) -> Result<Self> {
        self.check_brand(other)?;
        let value = match (&self.value, &other.value) {
            (AmountValue::Nat(a), AmountValue::Nat(b)) => {
                AmountValue::Nat(a.checked_sub(*b).ok_or_else(|| self.underflow(other))?)
            }
            (AmountValue::Set(a), AmountValue::Set(b)) => {
                if !b.is_subset(a) {
                    return Err(self.underflow(other));
                }
                AmountValue::Set(a.difference(b).cloned().collect())
            }
            _ => return Err(self.mismatch(other)),
        };
        Ok(Self {
            brand: self.brand.clone(),
            value,
        })
    }

    fn underflow(&self, other: &Self) -> SeatkeeperError {
        SeatkeeperError::Underflow {
            needed: other.to_string(),
            available: self.to_string(),
        }
    }

    /// `self >= other` (for sets: `other ⊆ self`).
    ///
    /// # Errors
    /// `KindMismatch` if the brands differ.
    pub fn is_gte(&self, other: &Self) -> Result<bool> {
        self.check_brand(other)?;
        match (&self.value, &other.value) {
            (AmountValue::Nat(a), AmountValue::Nat(b)) => Ok(a >= b),
            (AmountValue::Set(a), AmountValue::Set(b)) => Ok(b.is_subset(a)),
            _ => Err(self.mismatch(other)),
        }
    }

    /// # Errors
    /// `KindMismatch` if the brands differ.
    pub fn is_equal(&self, other: &Self) -> Result<bool> {
        self.check_brand(other)?;
        Ok(self.value == other.value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            AmountValue::Nat(n) => write!(f, "{n} {}", self.brand),
            AmountValue::Set(tokens) => {
                let list: Vec<&str> = tokens.iter().map(String::as_str).collect();
                write!(f, "[{}] {}", list.join(", "), self.brand)
            }
        }
    }
}

/// Test fixtures. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Brand {
    /// A brand with a random name suffix.
    pub fn dummy(kind: AssetKind) -> Self {
        Self::new(format!("dummy-{}", rand::random::<u16>()), kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moola() -> Brand {
        Brand::new("Moola", AssetKind::Nat)
    }

    fn magic() -> Brand {
        Brand::new("MagicItem", AssetKind::Set)
    }

    #[test]
    fn empty_is_additive_identity() {
        let brand = moola();
        let five = Amount::nat(&brand, 5).unwrap();
        let empty = Amount::empty(&brand);
        assert!(empty.is_empty());
        assert_eq!(five.add(&empty).unwrap(), five);

        let items = magic();
        assert_eq!(Amount::empty(&items).tokens().map(BTreeSet::len), Some(0));
    }

    #[test]
    fn nat_arithmetic() {
        let brand = moola();
        let a = Amount::nat(&brand, 20).unwrap();
        let b = Amount::nat(&brand, 5).unwrap();
        assert_eq!(a.add(&b).unwrap().as_nat(), Some(25));
        assert_eq!(a.subtract(&b).unwrap().as_nat(), Some(15));
        assert!(a.is_gte(&b).unwrap());
        assert!(!b.is_gte(&a).unwrap());
        assert!(a.is_equal(&Amount::nat(&brand, 20).unwrap()).unwrap());
    }

    #[test]
    fn nat_underflow() {
        let brand = moola();
        let a = Amount::nat(&brand, 2).unwrap();
        let b = Amount::nat(&brand, 3).unwrap();
        let err = a.subtract(&b).unwrap_err();
        assert!(matches!(err, SeatkeeperError::Underflow { .. }));
    }

    #[test]
    fn nat_overflow() {
        let brand = moola();
        let a = Amount::nat(&brand, u64::MAX).unwrap();
        let one = Amount::nat(&brand, 1).unwrap();
        assert!(matches!(
            a.add(&one).unwrap_err(),
            SeatkeeperError::AmountOverflow
        ));
    }

    #[test]
    fn different_brands_mismatch() {
        let a = Amount::nat(&moola(), 1).unwrap();
        let b = Amount::nat(&Brand::new("Moola", AssetKind::Nat), 1).unwrap();
        // Same display name, different identity.
        for err in [
            a.add(&b).unwrap_err(),
            a.subtract(&b).unwrap_err(),
            a.is_gte(&b).unwrap_err(),
            a.is_equal(&b).unwrap_err(),
        ] {
            assert!(matches!(err, SeatkeeperError::KindMismatch { .. }));
        }
    }

    #[test]
    fn wrong_constructor_for_kind() {
        assert!(matches!(
            Amount::nat(&magic(), 1).unwrap_err(),
            SeatkeeperError::KindMismatch { .. }
        ));
        assert!(matches!(
            Amount::set(&moola(), ["x"]).unwrap_err(),
            SeatkeeperError::KindMismatch { .. }
        ));
    }

    #[test]
    fn set_operations_use_token_identity() {
        let brand = magic();
        let all = Amount::set(&brand, ["magicWand8281", "sword1", "sword2"]).unwrap();
        let wand = Amount::set(&brand, ["magicWand8281"]).unwrap();
        let sword = Amount::set(&brand, ["sword3"]).unwrap();

        let rest = all.subtract(&wand).unwrap();
        assert_eq!(rest.tokens().unwrap().len(), 2);
        assert!(all.is_gte(&wand).unwrap());
        // Same cardinality, different token: not a subset.
        assert!(!all.is_gte(&sword).unwrap());
        assert!(matches!(
            all.subtract(&sword).unwrap_err(),
            SeatkeeperError::Underflow { .. }
        ));
    }

    #[test]
    fn duplicate_tokens_rejected() {
        let brand = magic();
        let err = Amount::set(&brand, ["a", "a"]).unwrap_err();
        assert!(matches!(err, SeatkeeperError::DuplicateToken { ref token } if token == "a"));

        let a = Amount::set(&brand, ["a", "b"]).unwrap();
        let b = Amount::set(&brand, ["b"]).unwrap();
        assert!(matches!(
            a.add(&b).unwrap_err(),
            SeatkeeperError::DuplicateToken { .. }
        ));
    }

    #[test]
    fn display_formats() {
        assert_eq!(Amount::nat(&moola(), 20).unwrap().to_string(), "20 Moola");
        let set = Amount::set(&magic(), ["b", "a"]).unwrap();
        assert_eq!(set.to_string(), "[a, b] MagicItem");
    }

    #[test]
    fn amount_serde_roundtrip() {
        let amount = Amount::set(&magic(), ["sword1"]).unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(amount, back);
    }
}

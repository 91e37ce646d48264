//! Supply conservation invariant checker.
//!
//! Invariant enforced per brand:
//! ```text
//! ∀ brand: Σ(live payments + held allocations) == Σ(minted) - Σ(burned)
//! ```
//!
//! Only mints and burns move the expected supply. Escrow, reallocation and
//! payout just carry the same amounts around.

use std::collections::HashMap;

use seatkeeper_types::{Amount, Brand, BrandId, Result, SeatkeeperError};

/// Per-brand running totals.
#[derive(Debug, Clone)]
struct SupplyEntry {
    /// Minted minus burned.
    outstanding: Amount,
    mint_calls: u64,
    burn_calls: u64,
}

/// Tracks per-brand supply and validates conservation on demand.
#[derive(Debug, Default)]
pub struct SupplyConservation {
    entries: HashMap<BrandId, SupplyEntry>,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, brand: &Brand) -> &mut SupplyEntry {
        self.entries.entry(brand.id).or_insert_with(|| SupplyEntry {
            outstanding: Amount::empty(brand),
            mint_calls: 0,
            burn_calls: 0,
        })
    }

    /// Record a mint.
    ///
    /// # Errors
    /// `DuplicateToken` if a set token is already outstanding,
    /// `AmountOverflow` for fungible overflow.
    pub fn record_mint(&mut self, amount: &Amount) -> Result<()> {
        let entry = self.entry(amount.brand());
        entry.outstanding = entry.outstanding.add(amount)?;
        entry.mint_calls += 1;
        Ok(())
    }

    /// Record a burn.
    ///
    /// # Errors
    /// `Underflow` if more is burned than is outstanding.
    pub fn record_burn(&mut self, amount: &Amount) -> Result<()> {
        let entry = self.entry(amount.brand());
        entry.outstanding = entry.outstanding.subtract(amount)?;
        entry.burn_calls += 1;
        Ok(())
    }

    /// Expected supply for a brand: minted minus burned.
    #[must_use]
    pub fn expected_supply(&self, brand: &Brand) -> Amount {
        self.entries
            .get(&brand.id)
            .map_or_else(|| Amount::empty(brand), |e| e.outstanding.clone())
    }

    /// Number of `(mint, burn)` calls recorded for a brand.
    #[must_use]
    pub fn call_counts(&self, brand: &Brand) -> (u64, u64) {
        self.entries
            .get(&brand.id)
            .map_or((0, 0), |e| (e.mint_calls, e.burn_calls))
    }

    /// Verify that `actual_supply` matches the expected supply.
    ///
    /// # Errors
    /// Returns [`SeatkeeperError::SupplyInvariantViolation`] if actual ≠ expected.
    pub fn verify(&self, actual_supply: &Amount) -> Result<()> {
        let brand = actual_supply.brand();
        let expected = self.expected_supply(brand);
        if !actual_supply.is_equal(&expected)? {
            let (mints, burns) = self.call_counts(brand);
            return Err(SeatkeeperError::SupplyInvariantViolation {
                reason: format!(
                    "Brand {brand}: actual supply {actual_supply} != expected {expected} \
                     (mint_calls={mints}, burn_calls={burns})"
                ),
            });
        }
        Ok(())
    }

    /// All brands that have seen at least one mint or burn.
    #[must_use]
    pub fn tracked_brands(&self) -> Vec<BrandId> {
        self.entries.keys().copied().collect()
    }
}

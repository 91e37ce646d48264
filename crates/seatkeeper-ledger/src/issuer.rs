//! Issuers, mints and payments.
//!
//! An [`IssuerKit`] is the only authority that can create or destroy
//! amounts of its brand. Every live [`Payment`] traces back to a
//! `mint_payment` call or to a seat payout (which only re-carries amounts
//! that were escrowed earlier).

use std::collections::BTreeMap;

use seatkeeper_types::{Amount, AssetKind, Brand, Keyword, Result, SeatkeeperError};
use tracing::debug;

use crate::supply_conservation::SupplyConservation;

/// A non-forgeable carrier of one amount.
///
/// Not `Clone`: depositing a payment consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct Payment {
    amount: Amount,
}

impl Payment {
    pub(crate) fn new(amount: Amount) -> Self {
        Self { amount }
    }

    #[must_use]
    pub fn amount(&self) -> &Amount {
        &self.amount
    }

    #[must_use]
    pub fn brand(&self) -> &Brand {
        self.amount.brand()
    }

    pub(crate) fn into_amount(self) -> Amount {
        self.amount
    }
}

/// Keyword-indexed payments handed to or returned from a seat.
pub type PaymentRecord = BTreeMap<Keyword, Payment>;

/// Mint authority plus supply tracker for one brand.
#[derive(Debug)]
pub struct IssuerKit {
    brand: Brand,
    supply: SupplyConservation,
}

impl IssuerKit {
    /// Create a brand and the sole authority over it.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: AssetKind) -> Self {
        Self {
            brand: Brand::new(name, kind),
            supply: SupplyConservation::new(),
        }
    }

    #[must_use]
    pub fn brand(&self) -> &Brand {
        &self.brand
    }

    fn check_brand(&self, amount: &Amount) -> Result<()> {
        if amount.brand().id != self.brand.id {
            return Err(SeatkeeperError::KindMismatch {
                expected: self.brand.to_string(),
                actual: amount.brand().to_string(),
            });
        }
        Ok(())
    }

    /// Mint a new payment.
    ///
    /// # Errors
    /// `KindMismatch` for a foreign brand; `DuplicateToken` if a set token
    /// is already live.
    pub fn mint_payment(&mut self, amount: Amount) -> Result<Payment> {
        self.check_brand(&amount)?;
        self.supply.record_mint(&amount)?;
        debug!(amount = %amount, "minted payment");
        Ok(Payment::new(amount))
    }

    /// Destroy a payment, returning the burned amount.
    ///
    /// # Errors
    /// `KindMismatch` for a foreign brand.
    pub fn burn(&mut self, payment: Payment) -> Result<Amount> {
        self.check_brand(payment.amount())?;
        self.supply.record_burn(payment.amount())?;
        debug!(amount = %payment.amount(), "burned payment");
        Ok(payment.into_amount())
    }

    /// The amount a payment carries, checked against this issuer's brand.
    ///
    /// # Errors
    /// `KindMismatch` for a foreign brand.
    pub fn get_amount_of(&self, payment: &Payment) -> Result<Amount> {
        self.check_brand(payment.amount())?;
        Ok(payment.amount().clone())
    }

    /// Minted minus burned.
    #[must_use]
    pub fn outstanding(&self) -> Amount {
        self.supply.expected_supply(&self.brand)
    }

    /// Check that `actual` (live payments plus held allocations, as
    /// counted by the caller) equals the outstanding supply.
    ///
    /// # Errors
    /// `SupplyInvariantViolation` on mismatch.
    pub fn verify_supply(&self, actual: &Amount) -> Result<()> {
        self.check_brand(actual)?;
        self.supply.verify(actual)
    }
}

//! Atomic, conservation-checked reallocation.
//!
//! Mathematical invariant enforced on every commit:
//! ```text
//! ∀ brand: Σ(current allocations of named seats) == Σ(staged allocations)
//! ```
//!
//! Validation runs against one snapshot of the ledger before anything is
//! written. The commit then replaces every named seat's allocation; on any
//! error no seat is touched.

use std::collections::{BTreeSet, HashMap, HashSet};

use seatkeeper_types::{Allocation, Amount, BrandId, Result, SeatId, SeatkeeperError};
use tracing::{debug, info};

use crate::seat_ledger::SeatLedger;

/// One side of a two-seat [`trade`](SeatLedger::trade), in that seat's own
/// keywords.
#[derive(Debug, Clone, Default)]
pub struct TradeLeg {
    pub seat: SeatId,
    pub gains: Allocation,
    pub losses: Allocation,
}

impl TradeLeg {
    #[must_use]
    pub fn new(seat: SeatId) -> Self {
        Self {
            seat,
            gains: Allocation::new(),
            losses: Allocation::new(),
        }
    }

    #[must_use]
    pub fn gains(mut self, gains: Allocation) -> Self {
        self.gains = gains;
        self
    }

    #[must_use]
    pub fn losses(mut self, losses: Allocation) -> Self {
        self.losses = losses;
        self
    }
}

/// Keyword-wise `base + extra`.
///
/// # Errors
/// `KindMismatch`, `DuplicateToken`, or `AmountOverflow`.
pub fn add_records(base: &Allocation, extra: &Allocation) -> Result<Allocation> {
    let mut sum = base.clone();
    for (keyword, amount) in extra {
        let total = match sum.get(keyword) {
            Some(existing) => existing.add(amount)?,
            None => amount.clone(),
        };
        sum.insert(keyword.clone(), total);
    }
    Ok(sum)
}

/// Keyword-wise `base - taken`.
///
/// # Errors
/// `KindMismatch`, or `Underflow` if `base` does not hold enough under a
/// keyword.
pub fn subtract_records(base: &Allocation, taken: &Allocation) -> Result<Allocation> {
    let mut rest = base.clone();
    for (keyword, amount) in taken {
        if amount.is_empty() && !rest.contains_key(keyword) {
            continue;
        }
        let remaining = rest
            .get(keyword)
            .ok_or_else(|| SeatkeeperError::Underflow {
                needed: amount.to_string(),
                available: format!("nothing under {keyword}"),
            })?
            .subtract(amount)?;
        rest.insert(keyword.clone(), remaining);
    }
    Ok(rest)
}

fn accumulate<'a>(
    totals: &mut HashMap<BrandId, Amount>,
    amounts: impl Iterator<Item = &'a Amount>,
) -> Result<()> {
    for amount in amounts {
        let sum = match totals.get(&amount.brand().id) {
            Some(sum) => sum.add(amount)?,
            None => amount.clone(),
        };
        totals.insert(amount.brand().id, sum);
    }
    Ok(())
}

fn violation(reason: impl Into<String>) -> SeatkeeperError {
    SeatkeeperError::ConservationViolation {
        reason: reason.into(),
    }
}

impl SeatLedger {
    /// Atomically replace the allocations of the named seats.
    ///
    /// # Errors
    /// - `SeatNotFound` / `SeatClosed` for a missing or non-active seat
    /// - `SeatStagedTwice` if a seat is named more than once
    /// - `ConservationViolation` if any brand's total changes
    pub fn reallocate(&mut self, staged: Vec<(SeatId, Allocation)>) -> Result<()> {
        let mut seen = HashSet::with_capacity(staged.len());
        for (id, _) in &staged {
            let seat = self.seat(*id)?;
            if !seat.is_active() {
                return Err(SeatkeeperError::SeatClosed(*id));
            }
            if !seen.insert(*id) {
                return Err(SeatkeeperError::SeatStagedTwice(*id));
            }
        }

        let mut before = HashMap::new();
        let mut after = HashMap::new();
        for (id, proposed) in &staged {
            let current = &self.seat(*id)?.allocation;
            accumulate(&mut before, current.values())
                .map_err(|e| violation(format!("current allocations do not sum: {e}")))?;
            accumulate(&mut after, proposed.values())
                .map_err(|e| violation(format!("staged allocations do not sum: {e}")))?;
        }

        let brands: BTreeSet<BrandId> = before.keys().chain(after.keys()).copied().collect();
        for brand in brands {
            let balanced = match (before.get(&brand), after.get(&brand)) {
                (Some(was), Some(now)) => was.is_equal(now)?,
                (Some(only), None) | (None, Some(only)) => only.is_empty(),
                (None, None) => true,
            };
            if !balanced {
                let show = |m: &HashMap<BrandId, Amount>| {
                    m.get(&brand).map_or_else(|| "nothing".to_string(), ToString::to_string)
                };
                return Err(violation(format!(
                    "brand total changed from {} to {}",
                    show(&before),
                    show(&after)
                )));
            }
        }

        let count = staged.len();
        for (id, proposed) in staged {
            self.active_seat_mut(id)?.allocation = proposed;
            debug!(seat = %id, "allocation replaced");
        }
        info!(seats = count, "reallocation committed");
        Ok(())
    }

    /// Move value between exactly two seats: each ends with
    /// `current + gains - losses`.
    ///
    /// # Errors
    /// As [`reallocate`](Self::reallocate), plus `Underflow` if a seat
    /// cannot cover its losses.
    pub fn trade(&mut self, left: &TradeLeg, right: &TradeLeg) -> Result<()> {
        let target = |ledger: &Self, leg: &TradeLeg| -> Result<Allocation> {
            let current = ledger.current_allocation(leg.seat)?;
            subtract_records(&add_records(&current, &leg.gains)?, &leg.losses)
        };
        let left_target = target(self, left)?;
        let right_target = target(self, right)?;
        self.reallocate(vec![(left.seat, left_target), (right.seat, right_target)])
    }

    /// `left` receives exactly its `want` for exactly its `give`. `right`
    /// pays and receives the same amounts under its own keywords, matched
    /// by brand against its proposal. Whatever `right` paid beyond
    /// `left`'s want stays with `right`.
    ///
    /// # Errors
    /// - `ProposalShapeMismatch` if `right`'s proposal names no keyword for
    ///   a brand being swapped
    /// - `OfferRejected` if `right` would not receive its own `want`
    /// - as [`trade`](Self::trade) otherwise
    pub fn swap_exact(&mut self, left: SeatId, right: SeatId) -> Result<()> {
        let left_proposal = self.seat(left)?.proposal.clone();
        let right_proposal = self.seat(right)?.proposal.clone();

        let right_gains = rekey(&left_proposal.give, &right_proposal.want)?;
        let right_losses = rekey(&left_proposal.want, &right_proposal.give)?;

        for (keyword, wanted) in &right_proposal.want {
            let satisfied = match right_gains.get(keyword) {
                Some(got) => got.is_gte(wanted)?,
                None => wanted.is_empty(),
            };
            if !satisfied {
                return Err(SeatkeeperError::OfferRejected {
                    reason: format!("seat {right} would not receive its want {keyword}"),
                });
            }
        }

        self.trade(
            &TradeLeg::new(left)
                .gains(left_proposal.want)
                .losses(left_proposal.give),
            &TradeLeg::new(right).gains(right_gains).losses(right_losses),
        )
    }
}

/// Re-key `amounts` into the keywords `target` uses for the same brands.
fn rekey(amounts: &Allocation, target: &Allocation) -> Result<Allocation> {
    let mut rekeyed = Allocation::new();
    for amount in amounts.values() {
        let keyword = target
            .iter()
            .find(|(_, candidate)| candidate.brand().id == amount.brand().id)
            .map(|(keyword, _)| keyword.clone())
            .ok_or_else(|| SeatkeeperError::ProposalShapeMismatch {
                reason: format!("no keyword for brand {}", amount.brand()),
            })?;
        let total = match rekeyed.get(&keyword) {
            Some(existing) => existing.add(amount)?,
            None => amount.clone(),
        };
        rekeyed.insert(keyword, total);
    }
    Ok(rekeyed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::{IssuerKit, PaymentRecord};
    use seatkeeper_types::{AssetKind, ExitRule, Proposal};

    struct Market {
        moola: IssuerKit,
        items: IssuerKit,
        ledger: SeatLedger,
    }

    fn market() -> Market {
        let moola = IssuerKit::new("Moola", AssetKind::Nat);
        let items = IssuerKit::new("MagicItem", AssetKind::Set);
        let ledger = SeatLedger::with_brands([moola.brand(), items.brand()]);
        Market {
            moola,
            items,
            ledger,
        }
    }

    fn alloc(entries: &[(&str, &Amount)]) -> Allocation {
        entries
            .iter()
            .map(|(k, a)| ((*k).to_string(), (*a).clone()))
            .collect()
    }

    /// Seat A gives 5 Moola for a wand; seat B gives the wand for 5 Moola.
    fn two_offers(m: &mut Market) -> (SeatId, SeatId, Amount, Amount) {
        let five = Amount::nat(m.moola.brand(), 5).unwrap();
        let wand = Amount::set(m.items.brand(), ["wand"]).unwrap();
        let pay_a = m.moola.mint_payment(five.clone()).unwrap();
        let pay_b = m.items.mint_payment(wand.clone()).unwrap();
        let a = m
            .ledger
            .create_seat(
                Proposal::default().give("Price", five.clone()).want("Item", wand.clone()),
                PaymentRecord::from([("Price".into(), pay_a)]),
            )
            .unwrap();
        let b = m
            .ledger
            .create_seat(
                Proposal::default().give("Asset", wand.clone()).want("Ask", five.clone()),
                PaymentRecord::from([("Asset".into(), pay_b)]),
            )
            .unwrap();
        (a, b, five, wand)
    }

    #[test]
    fn swap_preserves_totals() {
        let mut m = market();
        let (a, b, five, wand) = two_offers(&mut m);
        let empty_m = Amount::empty(m.moola.brand());
        let empty_i = Amount::empty(m.items.brand());

        m.ledger
            .reallocate(vec![
                (a, alloc(&[("Price", &empty_m), ("Item", &wand)])),
                (b, alloc(&[("Asset", &empty_i), ("Ask", &five)])),
            ])
            .unwrap();

        assert_eq!(m.ledger.current_allocation(a).unwrap()["Item"], wand);
        assert_eq!(m.ledger.current_allocation(b).unwrap()["Ask"], five);
        assert!(m.moola.verify_supply(&m.ledger.total_held(m.moola.brand()).unwrap()).is_ok());
        assert!(m.items.verify_supply(&m.ledger.total_held(m.items.brand()).unwrap()).is_ok());
    }

    #[test]
    fn imbalance_mutates_nothing() {
        let mut m = market();
        let (a, b, _five, wand) = two_offers(&mut m);
        let six = Amount::nat(m.moola.brand(), 6).unwrap();
        let before_a = m.ledger.current_allocation(a).unwrap();
        let before_b = m.ledger.current_allocation(b).unwrap();

        let err = m
            .ledger
            .reallocate(vec![
                (a, alloc(&[("Item", &wand)])),
                (b, alloc(&[("Ask", &six)])),
            ])
            .unwrap_err();
        assert!(matches!(err, SeatkeeperError::ConservationViolation { .. }));
        assert_eq!(m.ledger.current_allocation(a).unwrap(), before_a);
        assert_eq!(m.ledger.current_allocation(b).unwrap(), before_b);
    }

    #[test]
    fn dropping_a_brand_is_a_violation() {
        let mut m = market();
        let (a, b, five, _wand) = two_offers(&mut m);
        // The wand disappears.
        let err = m
            .ledger
            .reallocate(vec![(a, Allocation::new()), (b, alloc(&[("Ask", &five)]))])
            .unwrap_err();
        assert!(matches!(err, SeatkeeperError::ConservationViolation { .. }));
    }

    #[test]
    fn duplicated_token_is_a_violation() {
        let mut m = market();
        let (a, b, five, wand) = two_offers(&mut m);
        let err = m
            .ledger
            .reallocate(vec![
                (a, alloc(&[("Item", &wand)])),
                (b, alloc(&[("Asset", &wand), ("Ask", &five)])),
            ])
            .unwrap_err();
        assert!(matches!(err, SeatkeeperError::ConservationViolation { .. }));
    }

    #[test]
    fn same_seat_twice_rejected() {
        let mut m = market();
        let (a, _b, _five, _wand) = two_offers(&mut m);
        let current = m.ledger.current_allocation(a).unwrap();
        let err = m
            .ledger
            .reallocate(vec![(a, current.clone()), (a, current)])
            .unwrap_err();
        assert!(matches!(err, SeatkeeperError::SeatStagedTwice(id) if id == a));
    }

    #[test]
    fn unknown_and_closed_seats_rejected() {
        let mut m = market();
        let ghost = SeatId::new();
        assert!(matches!(
            m.ledger.reallocate(vec![(ghost, Allocation::new())]).unwrap_err(),
            SeatkeeperError::SeatNotFound(_)
        ));

        let closed = m.ledger.create_empty_seat(ExitRule::OnDemand).unwrap();
        m.ledger.exit_seat(closed).unwrap();
        assert!(matches!(
            m.ledger.reallocate(vec![(closed, Allocation::new())]).unwrap_err(),
            SeatkeeperError::SeatClosed(_)
        ));
    }

    #[test]
    fn swap_exact_moves_wants() {
        let mut m = market();
        let (a, b, five, wand) = two_offers(&mut m);
        m.ledger.swap_exact(a, b).unwrap();
        let a_alloc = m.ledger.current_allocation(a).unwrap();
        let b_alloc = m.ledger.current_allocation(b).unwrap();
        assert_eq!(a_alloc["Item"], wand);
        assert!(a_alloc["Price"].is_empty());
        assert_eq!(b_alloc["Ask"], five);
        assert!(b_alloc["Asset"].is_empty());
    }

    #[test]
    fn swap_exact_matches_keywords_by_brand() {
        let mut m = market();
        let wand = Amount::set(m.items.brand(), ["magicWand8281"]).unwrap();
        let twenty = Amount::nat(m.moola.brand(), 20).unwrap();
        let twenty_five = Amount::nat(m.moola.brand(), 25).unwrap();

        let seller = m
            .ledger
            .create_seat(
                Proposal::default().give("Magic", wand.clone()).want("Moola", twenty.clone()),
                PaymentRecord::from([("Magic".into(), m.items.mint_payment(wand.clone()).unwrap())]),
            )
            .unwrap();
        // The buyer overpays and names everything differently.
        let buyer = m
            .ledger
            .create_seat(
                Proposal::default()
                    .give("StrikePrice", twenty_five.clone())
                    .want("UnderlyingAsset", wand.clone()),
                PaymentRecord::from([(
                    "StrikePrice".into(),
                    m.moola.mint_payment(twenty_five).unwrap(),
                )]),
            )
            .unwrap();

        m.ledger.swap_exact(seller, buyer).unwrap();
        let seller_alloc = m.ledger.current_allocation(seller).unwrap();
        let buyer_alloc = m.ledger.current_allocation(buyer).unwrap();
        assert_eq!(seller_alloc["Moola"], twenty);
        assert!(seller_alloc["Magic"].is_empty());
        assert_eq!(buyer_alloc["UnderlyingAsset"], wand);
        assert_eq!(buyer_alloc["StrikePrice"].as_nat(), Some(5));
    }

    #[test]
    fn swap_exact_rejects_unsatisfied_want() {
        let mut m = market();
        let (_a, b, five, _wand) = two_offers(&mut m);
        let greedy_want = Amount::set(m.items.brand(), ["wand", "sword"]).unwrap();
        let greedy = m
            .ledger
            .create_seat(
                Proposal::default().give("Price", five.clone()).want("Item", greedy_want),
                PaymentRecord::from([("Price".into(), m.moola.mint_payment(five).unwrap())]),
            )
            .unwrap();
        // `b` only gives one wand; `greedy` wants two items.
        let before = m.ledger.current_allocation(greedy).unwrap();
        let err = m.ledger.swap_exact(b, greedy).unwrap_err();
        assert!(matches!(err, SeatkeeperError::OfferRejected { .. }));
        assert_eq!(m.ledger.current_allocation(greedy).unwrap(), before);
    }

    #[test]
    fn trade_with_gains_and_losses() {
        let mut m = market();
        let (a, b, _five, wand) = two_offers(&mut m);
        let two = Amount::nat(m.moola.brand(), 2).unwrap();
        m.ledger
            .trade(
                &TradeLeg::new(a).gains(alloc(&[("Item", &wand)])).losses(alloc(&[("Price", &two)])),
                &TradeLeg::new(b).gains(alloc(&[("Ask", &two)])).losses(alloc(&[("Asset", &wand)])),
            )
            .unwrap();
        assert_eq!(m.ledger.current_allocation(a).unwrap()["Price"].as_nat(), Some(3));
        assert_eq!(m.ledger.current_allocation(b).unwrap()["Ask"].as_nat(), Some(2));
    }

    #[test]
    fn record_helpers() {
        let m = market();
        let two = Amount::nat(m.moola.brand(), 2).unwrap();
        let three = Amount::nat(m.moola.brand(), 3).unwrap();
        let sum = add_records(&alloc(&[("A", &two)]), &alloc(&[("A", &three), ("B", &two)])).unwrap();
        assert_eq!(sum["A"].as_nat(), Some(5));
        assert_eq!(sum["B"].as_nat(), Some(2));

        let rest = subtract_records(&sum, &alloc(&[("A", &three)])).unwrap();
        assert_eq!(rest["A"].as_nat(), Some(2));
        assert!(matches!(
            subtract_records(&rest, &alloc(&[("C", &two)])).unwrap_err(),
            SeatkeeperError::Underflow { .. }
        ));
    }
}

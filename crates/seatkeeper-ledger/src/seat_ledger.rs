//! Seat ledger: the set of seats of one contract instance.
//!
//! The ledger owns every seat's allocation. Allocations change only through
//! [`SeatLedger::reallocate`](crate::reallocation), exits, and contract
//! mints ([`SeatLedger::mint_gains`]). Everything else reads.
//!
//! ## Seat creation
//!
//! 1. Payments are escrowed as the initial allocation (want keywords start
//!    at the empty amount of their brand).
//! 2. The seat is registered as ACTIVE.
//! 3. The proposal is validated against the escrow. On failure the seat is
//!    kicked out immediately, so the caller gets the escrow back as payouts.

use std::collections::HashMap;

use seatkeeper_types::{
    Allocation, Amount, Brand, BrandId, ExitRule, Proposal, Result, Seat, SeatId, SeatStatus,
    SeatkeeperError,
};
use tracing::{debug, info};

use crate::exit::PayoutBook;
use crate::issuer::{IssuerKit, PaymentRecord};
use crate::reallocation::{add_records, subtract_records};

/// A seat that was opened and immediately kicked out.
///
/// The escrow is available as payouts of `seat`.
#[derive(Debug)]
pub struct Rejection {
    pub seat: SeatId,
    pub error: SeatkeeperError,
}

impl From<Rejection> for SeatkeeperError {
    fn from(rejection: Rejection) -> Self {
        rejection.error
    }
}

/// All seats of one contract instance.
#[derive(Debug, Default)]
pub struct SeatLedger {
    pub(crate) seats: HashMap<SeatId, Seat>,
    /// Brands this instance accepts in escrow.
    accepted: HashMap<BrandId, Brand>,
    pub(crate) payouts: HashMap<SeatId, PayoutBook>,
}

impl SeatLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A ledger that accepts exactly `brands`.
    #[must_use]
    pub fn with_brands<'a>(brands: impl IntoIterator<Item = &'a Brand>) -> Self {
        let mut ledger = Self::new();
        for brand in brands {
            ledger.accept_brand(brand.clone());
        }
        ledger
    }

    pub fn accept_brand(&mut self, brand: Brand) {
        self.accepted.insert(brand.id, brand);
    }

    #[must_use]
    pub fn accepts(&self, brand: &Brand) -> bool {
        self.accepted.contains_key(&brand.id)
    }

    /// Open a seat by escrowing `payments`.
    ///
    /// # Errors
    /// A [`Rejection`] carrying `IssuerNotAccepted` or
    /// `ProposalShapeMismatch`. The rejected seat has already exited.
    pub fn create_seat(
        &mut self,
        proposal: Proposal,
        payments: PaymentRecord,
    ) -> std::result::Result<SeatId, Rejection> {
        let mut allocation: Allocation = payments
            .into_iter()
            .map(|(keyword, payment)| (keyword, payment.into_amount()))
            .collect();
        for (keyword, wanted) in &proposal.want {
            allocation
                .entry(keyword.clone())
                .or_insert_with(|| Amount::empty(wanted.brand()));
        }

        let seat = Seat::new(proposal, allocation);
        let id = seat.id;
        self.seats.insert(id, seat);
        debug!(seat = %id, "escrowed seat");

        if let Err(error) = self.validate_seat(id) {
            let error = self.kick_out(id, error);
            return Err(Rejection { seat: id, error });
        }
        info!(seat = %id, "seat created");
        Ok(id)
    }

    fn validate_seat(&self, id: SeatId) -> Result<()> {
        let seat = self.seat(id)?;
        let proposal = &seat.proposal;

        let brands = seat
            .allocation
            .values()
            .chain(proposal.give.values())
            .chain(proposal.want.values())
            .map(Amount::brand);
        for brand in brands {
            if !self.accepts(brand) {
                return Err(SeatkeeperError::IssuerNotAccepted {
                    brand: brand.to_string(),
                });
            }
        }

        proposal.check_keywords()?;

        for (keyword, escrowed) in &seat.allocation {
            if proposal.want.contains_key(keyword) {
                continue;
            }
            let paid_exactly = proposal
                .give
                .get(keyword)
                .is_some_and(|given| matches!(given.is_equal(escrowed), Ok(true)));
            if !paid_exactly {
                return Err(SeatkeeperError::ProposalShapeMismatch {
                    reason: format!("payment {keyword} does not match the proposal's give"),
                });
            }
        }
        if let Some(unpaid) = proposal
            .give
            .keys()
            .find(|k| !seat.allocation.contains_key(*k))
        {
            return Err(SeatkeeperError::ProposalShapeMismatch {
                reason: format!("give {unpaid} has no payment"),
            });
        }
        Ok(())
    }

    /// Open a contract-owned seat holding nothing.
    ///
    /// Only offers arm deadline timers, so a contract seat must be
    /// `OnDemand` or `Waived`.
    ///
    /// # Errors
    /// `ExitRuleViolation` for an `AfterDeadline` rule.
    pub fn create_empty_seat(&mut self, exit: ExitRule) -> Result<SeatId> {
        let timed = matches!(exit, ExitRule::AfterDeadline { .. });
        let seat = Seat::new(Proposal::default().exit(exit), Allocation::new());
        let id = seat.id;
        if timed {
            return Err(SeatkeeperError::ExitRuleViolation {
                seat: id,
                reason: "contract seats cannot exit after a deadline".to_string(),
            });
        }
        self.seats.insert(id, seat);
        debug!(seat = %id, "empty seat created");
        Ok(id)
    }

    /// # Errors
    /// `SeatNotFound` if the seat does not exist.
    pub fn seat(&self, id: SeatId) -> Result<&Seat> {
        self.seats.get(&id).ok_or(SeatkeeperError::SeatNotFound(id))
    }

    pub(crate) fn active_seat_mut(&mut self, id: SeatId) -> Result<&mut Seat> {
        let seat = self
            .seats
            .get_mut(&id)
            .ok_or(SeatkeeperError::SeatNotFound(id))?;
        if !seat.is_active() {
            return Err(SeatkeeperError::SeatClosed(id));
        }
        Ok(seat)
    }

    /// # Errors
    /// `SeatNotFound` if the seat does not exist.
    pub fn current_allocation(&self, id: SeatId) -> Result<Allocation> {
        Ok(self.seat(id)?.allocation.clone())
    }

    /// The seat's amount under `keyword`, or the empty amount of `brand`.
    ///
    /// # Errors
    /// `SeatNotFound` if the seat does not exist.
    pub fn amount_allocated(&self, id: SeatId, keyword: &str, brand: &Brand) -> Result<Amount> {
        Ok(self
            .seat(id)?
            .allocation
            .get(keyword)
            .cloned()
            .unwrap_or_else(|| Amount::empty(brand)))
    }

    /// # Errors
    /// `SeatNotFound` if the seat does not exist.
    pub fn has_exited(&self, id: SeatId) -> Result<bool> {
        Ok(self.seat(id)?.has_exited())
    }

    /// Merge `changes` over the seat's current allocation, producing a
    /// staged allocation for [`reallocate`](Self::reallocate).
    ///
    /// # Errors
    /// `SeatNotFound` if the seat does not exist.
    pub fn stage(&self, id: SeatId, changes: Allocation) -> Result<Allocation> {
        let mut staged = self.current_allocation(id)?;
        staged.extend(changes);
        Ok(staged)
    }

    /// Everything of `brand` still held by this ledger: allocations of
    /// unexited seats plus payouts not yet withdrawn.
    ///
    /// # Errors
    /// `DuplicateToken` if a set token is held twice, which means the
    /// ledger is corrupt.
    pub fn total_held(&self, brand: &Brand) -> Result<Amount> {
        let held = self
            .seats
            .values()
            .filter(|seat| !seat.has_exited())
            .flat_map(|seat| seat.allocation.values());
        let pending = self
            .payouts
            .values()
            .flat_map(PayoutBook::pending_amounts);
        held.chain(pending)
            .filter(|amount| amount.brand().id == brand.id)
            .try_fold(Amount::empty(brand), |sum, amount| sum.add(amount))
    }

    #[must_use]
    pub fn seat_count(&self) -> usize {
        self.seats.len()
    }

    #[must_use]
    pub fn active_seat_count(&self) -> usize {
        self.seats
            .values()
            .filter(|seat| seat.status == SeatStatus::Active)
            .count()
    }

    /// Mint `amount` with `kit` straight into the seat under `keyword`.
    ///
    /// # Errors
    /// `SeatNotFound`, `SeatClosed`, or any mint error. Nothing is minted
    /// when the seat cannot receive it.
    pub fn mint_gains(
        &mut self,
        kit: &mut IssuerKit,
        id: SeatId,
        keyword: &str,
        amount: Amount,
    ) -> Result<()> {
        self.active_seat_mut(id)?;
        let current = self.amount_allocated(id, keyword, kit.brand())?;
        let total = current.add(&amount)?;
        let minted = kit.mint_payment(amount)?.into_amount();
        self.accept_brand(kit.brand().clone());
        debug!(seat = %id, keyword, amount = %minted, "minted gains");

        self.active_seat_mut(id)?
            .allocation
            .insert(keyword.to_string(), total);
        Ok(())
    }

    /// Move `payments` into an active seat.
    ///
    /// # Errors
    /// A [`Rejection`] naming the holding seat the payments were escrowed
    /// in; its payouts return them.
    pub fn deposit_to_seat(
        &mut self,
        id: SeatId,
        payments: PaymentRecord,
    ) -> std::result::Result<(), Rejection> {
        let give: Allocation = payments
            .iter()
            .map(|(keyword, payment)| (keyword.clone(), payment.amount().clone()))
            .collect();
        let proposal = Proposal::new(give, Allocation::new(), ExitRule::Waived);
        let holding = self.create_seat(proposal, payments)?;

        let moved = self.move_all(holding, id);
        match moved {
            Ok(()) => {
                self.exit_seat(holding)
                    .map_err(|error| Rejection { seat: holding, error })?;
                self.forget_drained(holding);
                info!(seat = %id, "deposited into seat");
                Ok(())
            }
            Err(error) => {
                let error = self.kick_out(holding, error);
                Err(Rejection {
                    seat: holding,
                    error,
                })
            }
        }
    }

    fn move_all(&mut self, from: SeatId, to: SeatId) -> Result<()> {
        let gains = self.current_allocation(from)?;
        let emptied: Allocation = gains
            .iter()
            .map(|(keyword, amount)| (keyword.clone(), Amount::empty(amount.brand())))
            .collect();
        let target = add_records(&self.current_allocation(to)?, &gains)?;
        self.reallocate(vec![(from, emptied), (to, target)])
    }

    /// Take `amounts` out of an active seat as payments.
    ///
    /// # Errors
    /// `SeatNotFound`, `SeatClosed`, or `Underflow`. Nothing moves on error.
    pub fn withdraw_from_seat(&mut self, id: SeatId, amounts: Allocation) -> Result<PaymentRecord> {
        self.active_seat_mut(id)?;
        let remaining = subtract_records(&self.current_allocation(id)?, &amounts)?;

        let holding = self.create_empty_seat(ExitRule::Waived)?;
        if let Err(error) = self.reallocate(vec![(id, remaining), (holding, amounts)]) {
            let error = self.kick_out(holding, error);
            self.forget_drained(holding);
            return Err(error);
        }
        self.exit_seat(holding)?;
        let payments = self.withdraw_all_payouts(holding)?;
        self.forget_drained(holding);
        info!(seat = %id, count = payments.len(), "withdrew from seat");
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatkeeper_types::{AssetKind, TimerId};

    struct Fixture {
        moola: IssuerKit,
        items: IssuerKit,
        ledger: SeatLedger,
    }

    fn fixture() -> Fixture {
        let moola = IssuerKit::new("Moola", AssetKind::Nat);
        let items = IssuerKit::new("MagicItem", AssetKind::Set);
        let ledger = SeatLedger::with_brands([moola.brand(), items.brand()]);
        Fixture {
            moola,
            items,
            ledger,
        }
    }

    fn nat(kit: &IssuerKit, n: u64) -> Amount {
        Amount::nat(kit.brand(), n).unwrap()
    }

    #[test]
    fn create_seat_escrows_and_zeroes_wants() {
        let mut f = fixture();
        let five = nat(&f.moola, 5);
        let wand = Amount::set(f.items.brand(), ["wand"]).unwrap();
        let payment = f.moola.mint_payment(five.clone()).unwrap();

        let proposal = Proposal::default()
            .give("Price", five.clone())
            .want("Item", wand);
        let id = f
            .ledger
            .create_seat(proposal, PaymentRecord::from([("Price".into(), payment)]))
            .unwrap();

        let alloc = f.ledger.current_allocation(id).unwrap();
        assert_eq!(alloc["Price"], five);
        assert!(alloc["Item"].is_empty());
        assert_eq!(f.ledger.active_seat_count(), 1);
        assert!(f.moola.verify_supply(&f.ledger.total_held(f.moola.brand()).unwrap()).is_ok());
    }

    #[test]
    fn unaccepted_brand_is_kicked_out_with_refund() {
        let mut f = fixture();
        let mut foreign = IssuerKit::new("Simolean", AssetKind::Nat);
        let amount = Amount::nat(foreign.brand(), 3).unwrap();
        let payment = foreign.mint_payment(amount.clone()).unwrap();

        let rejection = f
            .ledger
            .create_seat(
                Proposal::default().give("Coin", amount.clone()),
                PaymentRecord::from([("Coin".into(), payment)]),
            )
            .unwrap_err();
        assert!(matches!(
            rejection.error,
            SeatkeeperError::IssuerNotAccepted { .. }
        ));
        assert!(f.ledger.has_exited(rejection.seat).unwrap());
        let refund = f.ledger.withdraw_payout(rejection.seat, "Coin").unwrap();
        assert_eq!(refund.amount(), &amount);
    }

    #[test]
    fn wanting_an_unaccepted_brand_is_rejected() {
        let mut f = fixture();
        let stranger = Brand::dummy(AssetKind::Set);
        let rejection = f
            .ledger
            .create_seat(
                Proposal::default().want("Loot", Amount::set(&stranger, ["gem"]).unwrap()),
                PaymentRecord::new(),
            )
            .unwrap_err();
        assert!(matches!(
            rejection.error,
            SeatkeeperError::IssuerNotAccepted { .. }
        ));
        assert_eq!(f.ledger.active_seat_count(), 0);
    }

    #[test]
    fn underpaid_give_is_rejected() {
        let mut f = fixture();
        let payment = f.moola.mint_payment(nat(&f.moola, 4)).unwrap();
        let rejection = f
            .ledger
            .create_seat(
                Proposal::default().give("Price", nat(&f.moola, 5)),
                PaymentRecord::from([("Price".into(), payment)]),
            )
            .unwrap_err();
        assert!(matches!(
            rejection.error,
            SeatkeeperError::ProposalShapeMismatch { .. }
        ));
        assert_eq!(
            f.ledger.final_allocation(rejection.seat).unwrap()["Price"].as_nat(),
            Some(4)
        );
    }

    #[test]
    fn unpaid_give_is_rejected() {
        let mut f = fixture();
        let rejection = f
            .ledger
            .create_seat(
                Proposal::default().give("Price", nat(&f.moola, 5)),
                PaymentRecord::new(),
            )
            .unwrap_err();
        assert!(matches!(
            rejection.error,
            SeatkeeperError::ProposalShapeMismatch { .. }
        ));
    }

    #[test]
    fn mint_gains_deposits_into_seat() {
        let mut f = fixture();
        let id = f.ledger.create_empty_seat(ExitRule::Waived).unwrap();
        let wand = Amount::set(f.items.brand(), ["wand"]).unwrap();
        f.ledger
            .mint_gains(&mut f.items, id, "Item", wand.clone())
            .unwrap();
        assert_eq!(f.ledger.current_allocation(id).unwrap()["Item"], wand);
        assert!(f.items.verify_supply(&wand).is_ok());
    }

    #[test]
    fn mint_gains_into_exited_seat_mints_nothing() {
        let mut f = fixture();
        let id = f.ledger.create_empty_seat(ExitRule::OnDemand).unwrap();
        f.ledger.exit_seat(id).unwrap();
        let one = nat(&f.moola, 1);
        let err = f
            .ledger
            .mint_gains(&mut f.moola, id, "Coin", one)
            .unwrap_err();
        assert!(matches!(err, SeatkeeperError::SeatClosed(_)));
        assert!(f.moola.outstanding().is_empty());
    }

    #[test]
    fn deposit_then_withdraw() {
        let mut f = fixture();
        let inventory = f.ledger.create_empty_seat(ExitRule::Waived).unwrap();
        let payment = f.moola.mint_payment(nat(&f.moola, 20)).unwrap();
        f.ledger
            .deposit_to_seat(inventory, PaymentRecord::from([("Moola".into(), payment)]))
            .unwrap();
        assert_eq!(
            f.ledger.current_allocation(inventory).unwrap()["Moola"].as_nat(),
            Some(20)
        );

        assert_eq!(f.ledger.seat_count(), 1);

        let out = f
            .ledger
            .withdraw_from_seat(inventory, Allocation::from([("Moola".into(), nat(&f.moola, 15))]))
            .unwrap();
        // Neither move leaves a holding seat behind.
        assert_eq!(f.ledger.seat_count(), 1);
        assert!(f.ledger.payouts.is_empty());
        assert_eq!(out["Moola"].amount().as_nat(), Some(15));
        assert_eq!(
            f.ledger.current_allocation(inventory).unwrap()["Moola"].as_nat(),
            Some(5)
        );
        let held = f.ledger.total_held(f.moola.brand()).unwrap();
        // 5 held + 15 live outside the ledger.
        let outside = out["Moola"].amount();
        assert!(f.moola.verify_supply(&held.add(outside).unwrap()).is_ok());
    }

    #[test]
    fn overdraw_moves_nothing() {
        let mut f = fixture();
        let inventory = f.ledger.create_empty_seat(ExitRule::Waived).unwrap();
        let seats_before = f.ledger.seat_count();
        let err = f
            .ledger
            .withdraw_from_seat(inventory, Allocation::from([("Moola".into(), nat(&f.moola, 1))]))
            .unwrap_err();
        assert!(matches!(err, SeatkeeperError::Underflow { .. }));
        assert_eq!(f.ledger.seat_count(), seats_before);
    }

    #[test]
    fn repeated_deposits_and_withdrawals_keep_ledger_size() {
        let mut f = fixture();
        let inventory = f.ledger.create_empty_seat(ExitRule::Waived).unwrap();
        for _ in 0..10 {
            let payment = f.moola.mint_payment(nat(&f.moola, 3)).unwrap();
            f.ledger
                .deposit_to_seat(inventory, PaymentRecord::from([("Moola".into(), payment)]))
                .unwrap();
            let out = f
                .ledger
                .withdraw_from_seat(inventory, Allocation::from([("Moola".into(), nat(&f.moola, 2))]))
                .unwrap();
            f.moola.burn(out.into_values().next().unwrap()).unwrap();
        }
        assert_eq!(f.ledger.seat_count(), 1);
        assert!(f.ledger.payouts.is_empty());
        assert_eq!(
            f.ledger.current_allocation(inventory).unwrap()["Moola"].as_nat(),
            Some(10)
        );
    }

    #[test]
    fn rejected_deposit_keeps_its_refund() {
        let mut f = fixture();
        let inventory = f.ledger.create_empty_seat(ExitRule::Waived).unwrap();
        f.ledger.exit_seat(inventory).unwrap();
        let payment = f.moola.mint_payment(nat(&f.moola, 4)).unwrap();
        let rejection = f
            .ledger
            .deposit_to_seat(inventory, PaymentRecord::from([("Moola".into(), payment)]))
            .unwrap_err();
        assert!(matches!(rejection.error, SeatkeeperError::SeatClosed(_)));
        let refund = f.ledger.withdraw_payout(rejection.seat, "Moola").unwrap();
        assert_eq!(refund.amount().as_nat(), Some(4));
    }

    #[test]
    fn contract_seats_cannot_use_deadlines() {
        let mut f = fixture();
        let err = f
            .ledger
            .create_empty_seat(ExitRule::AfterDeadline {
                timer: TimerId::new(),
                deadline: 5,
            })
            .unwrap_err();
        assert!(matches!(err, SeatkeeperError::ExitRuleViolation { .. }));
        assert_eq!(f.ledger.seat_count(), 0);
    }

    #[test]
    fn stage_merges_over_current() {
        let mut f = fixture();
        let id = f.ledger.create_empty_seat(ExitRule::Waived).unwrap();
        let three = nat(&f.moola, 3);
        f.ledger.mint_gains(&mut f.moola, id, "A", three).unwrap();
        let staged = f
            .ledger
            .stage(id, Allocation::from([("B".into(), nat(&f.moola, 1))]))
            .unwrap();
        assert_eq!(staged.len(), 2);
        assert_eq!(staged["A"].as_nat(), Some(3));
    }
}

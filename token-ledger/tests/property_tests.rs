//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Balances never go negative and never exceed the supply on the origin
//! - A rejected request leaves the state untouched
//! - Lock on the origin plus apply on the destination conserves value
//! - Key derivation never collides

use proptest::prelude::*;
use std::sync::Arc;
use token_ledger::{
    auth::AllowAll, balance_key, owner_key, total_supply_key, Address, ChainRole, Direction,
    LedgerState, Request, RequestEngine, StorageKey, Word,
};

fn addr(byte: u8) -> Address {
    Address::new([byte; 20])
}

fn owner() -> Address {
    addr(0xee)
}

fn engine(role: ChainRole) -> RequestEngine {
    RequestEngine::new(role, LedgerState::new(owner()).unwrap(), Arc::new(AllowAll))
}

/// Strategy for generating holder identities
fn address_strategy() -> impl Strategy<Value = Address> {
    any::<[u8; 20]>().prop_map(Address::new)
}

/// Strategy for generating holders from a small set (forces reuse)
fn holder_strategy() -> impl Strategy<Value = Address> {
    (1u8..6).prop_map(addr)
}

fn direction_strategy() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Enter), Just(Direction::Exit)]
}

fn balance_request(direction: Direction, id: u64, holder: Address, amount: u128) -> Request {
    Request::new(
        direction,
        id,
        holder,
        &StorageKey::Balance(holder),
        Word::from_amount(amount),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: balance keys never collide with each other or the fixed slots
    #[test]
    fn prop_balance_keys_distinct(a in address_strategy(), b in address_strategy()) {
        prop_assert_ne!(balance_key(&a), owner_key());
        prop_assert_ne!(balance_key(&a), total_supply_key());
        if a != b {
            prop_assert_ne!(balance_key(&a), balance_key(&b));
        }
        prop_assert_eq!(
            StorageKey::resolve(&balance_key(&a), &a).unwrap(),
            StorageKey::Balance(a)
        );
    }

    /// Property: validate+lock succeeds exactly when amount <= balance
    #[test]
    fn prop_lock_checks_balance(minted in 0u128..1_000_000, amount in 0u128..2_000_000) {
        let mut root = engine(ChainRole::Root);
        let holder = addr(1);
        root.mint(&owner(), &holder, minted).unwrap();
        let before = root.state().clone();

        let result = root.apply_request(&holder, &balance_request(Direction::Enter, 0, holder, amount));

        if amount <= minted {
            prop_assert!(result.is_ok());
            prop_assert_eq!(root.state().balance_of(&holder), minted - amount);
        } else {
            prop_assert!(result.is_err());
            prop_assert_eq!(root.state(), &before);
        }
    }

    /// Property: any sequence of lock requests keeps balances within supply
    #[test]
    fn prop_origin_never_exceeds_supply(
        mints in prop::collection::vec((holder_strategy(), 0u128..1_000), 1..10),
        requests in prop::collection::vec((holder_strategy(), 0u128..1_500), 1..30),
    ) {
        let mut root = engine(ChainRole::Root);
        for (holder, amount) in &mints {
            root.mint(&owner(), holder, *amount).unwrap();
        }

        for (id, (holder, amount)) in requests.iter().enumerate() {
            let before = root.state().balance_of(holder);
            let request = balance_request(Direction::Enter, id as u64, *holder, *amount);
            match root.apply_request(holder, &request) {
                Ok(_) => prop_assert_eq!(root.state().balance_of(holder), before - amount),
                Err(_) => prop_assert_eq!(root.state().balance_of(holder), before),
            }

            let sum = root.state().balance_sum().unwrap();
            prop_assert!(sum <= root.state().total_supply());
        }
    }

    /// Property: locking on the origin and applying on the destination conserves value
    #[test]
    fn prop_round_trip_conserves_value(
        direction in direction_strategy(),
        holder in holder_strategy(),
        held in 0u128..1_000_000,
        moved in 0u128..1_000_000,
    ) {
        let (origin_role, destination_role) = match direction {
            Direction::Enter => (ChainRole::Root, ChainRole::Child),
            Direction::Exit => (ChainRole::Child, ChainRole::Root),
        };
        let mut origin = engine(origin_role);
        let mut destination = engine(destination_role);
        origin.mint(&owner(), &holder, held).unwrap();

        let request = balance_request(direction, 1, holder, moved);
        match origin.apply_request(&holder, &request) {
            Ok(event) => {
                destination.apply_request(&addr(0x99), &event.to_request()).unwrap();
                prop_assert_eq!(
                    origin.state().balance_of(&holder) + destination.state().balance_of(&holder),
                    held
                );
            }
            Err(_) => {
                prop_assert!(moved > held);
                prop_assert_eq!(origin.state().balance_of(&holder), held);
                prop_assert_eq!(destination.state().balance_of(&holder), 0);
            }
        }
    }

    /// Property: owner validate+lock only succeeds for the current owner
    #[test]
    fn prop_owner_lock_requires_owner(requestor in address_strategy(), value in address_strategy()) {
        prop_assume!(!value.is_zero());
        let mut root = engine(ChainRole::Root);
        let request = Request::new(
            Direction::Enter,
            0,
            requestor,
            &StorageKey::Owner,
            Word::from_address(&value),
        );

        let result = root.apply_request(&requestor, &request);
        prop_assert_eq!(result.is_ok(), requestor == owner());
        prop_assert_eq!(root.state().owner(), owner());
    }

    /// Property: owner apply always sets the decoded identity
    #[test]
    fn prop_owner_apply_sets_owner(caller in address_strategy(), value in address_strategy()) {
        prop_assume!(!value.is_zero());
        let mut child = engine(ChainRole::Child);
        let request = Request::new(
            Direction::Enter,
            0,
            caller,
            &StorageKey::Owner,
            Word::from_address(&value),
        );

        child.apply_request(&caller, &request).unwrap();
        prop_assert_eq!(child.state().owner(), value);
    }
}

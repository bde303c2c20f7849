//! Typed bitmask algebra.

use proptest::prelude::*;
use ruleweave_foundation::{AlphaConditionBits, Mask, MemoryAddressBits};

type Addresses = Mask<MemoryAddressBits>;

#[test]
fn masks_grow_across_words() {
    let mut mask = Addresses::new();
    mask.set(3);
    mask.set(130);
    assert!(mask.get(130));
    assert!(!mask.get(64));
    assert_eq!(mask.iter().collect::<Vec<_>>(), vec![3, 130]);
    assert_eq!(mask.cardinality(), 2);
}

#[test]
fn trailing_zero_words_do_not_matter() {
    let mut a = Addresses::from_bits([1]);
    a.set(200);
    a.clear_bit(200);
    assert_eq!(a, Addresses::from_bits([1]));
}

#[test]
fn alpha_requirements() {
    // address: condition 0 must pass, condition 2 must fail
    let scope: Mask<AlphaConditionBits> = [0, 2].into_iter().collect();
    let expected: Mask<AlphaConditionBits> = [0].into_iter().collect();

    let passing: Mask<AlphaConditionBits> = [0, 1].into_iter().collect();
    let failing: Mask<AlphaConditionBits> = [0, 2].into_iter().collect();
    assert!(passing.agrees_on(&scope, &expected));
    assert!(!failing.agrees_on(&scope, &expected));
    assert!(Mask::<AlphaConditionBits>::new().agrees_on(&Mask::new(), &Mask::new()));
}

proptest! {
    #[test]
    fn union_contains_both(a in prop::collection::vec(0usize..300, 0..20),
                           b in prop::collection::vec(0usize..300, 0..20)) {
        let ma = Addresses::from_bits(a.iter().copied());
        let mb = Addresses::from_bits(b.iter().copied());
        let u = ma.union(&mb);
        prop_assert!(u.contains_all(&ma));
        prop_assert!(u.contains_all(&mb));
        prop_assert_eq!(ma.intersects(&mb), a.iter().any(|x| b.contains(x)));
    }
}

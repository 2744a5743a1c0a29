use vcfr::cards::*;
use vcfr::error::CfrError;

fn standard() -> Deck {
    Deck::new(13, 4).unwrap()
}

#[test]
fn test_card_index_layout() {
    let d = standard();
    let c = d.parse_card("As").unwrap();
    assert_eq!(d.rank(c), 12);
    assert_eq!(d.suit(c), 0);
    assert_eq!(c.index(), 48);
}

#[test]
fn test_round_trip_notation() {
    let d = standard();
    for c in d.cards() {
        assert_eq!(d.parse_card(&d.format_card(c)).unwrap(), c);
    }
}

#[test]
fn test_parse_cards_ignores_separators() {
    let d = standard();
    let cards = d.parse_cards("As, Kd 7c").unwrap();
    assert_eq!(d.format_cards(&cards), "AsKd7c");
}

#[test]
fn test_invalid_rank() {
    assert!(matches!(
        standard().parse_card("Xs"),
        Err(CfrError::InvalidCard(_))
    ));
}

#[test]
fn test_invalid_suit() {
    assert!(standard().parse_card("Ax").is_err());
}

#[test]
fn test_rank_outside_small_deck() {
    let leduc = Deck::new(3, 2).unwrap();
    assert!(leduc.parse_card("Ts").is_err());
    assert!(leduc.parse_card("Jd").is_err());
    assert_eq!(leduc.format_card(leduc.card(0, 1)), "Jh");
}

#[test]
fn test_deck_bounds() {
    assert!(Deck::new(0, 4).is_err());
    assert!(Deck::new(14, 4).is_err());
    assert!(Deck::new(13, 5).is_err());
}

#[test]
fn test_suit_permutations() {
    let d = standard();
    let perms = d.suit_permutations();
    assert_eq!(perms.len(), 24);
    assert!(perms[0].is_identity());
    for p in &perms {
        let inv = p.inverse();
        for c in d.cards() {
            assert_eq!(d.permute(d.permute(c, p), &inv), c);
        }
    }
}

#[test]
fn test_permute_keeps_rank_and_missing_card() {
    let d = standard();
    let p = &d.suit_permutations()[5];
    let c = d.parse_card("Td").unwrap();
    assert_eq!(d.rank(d.permute(c, p)), d.rank(c));
    assert!(d.permute(NO_CARD, p).is_none());
}

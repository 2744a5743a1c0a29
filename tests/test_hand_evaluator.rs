use std::cmp::Ordering;

use vcfr::cards::*;
use vcfr::hand_evaluator::*;

fn deck() -> Deck {
    Deck::new(13, 4).unwrap()
}

fn cards(notation: &str) -> Vec<Card> {
    deck().parse_cards(notation).unwrap()
}

fn eval(notation: &str) -> HandResult {
    evaluate(&deck(), &cards(notation))
}

#[test]
fn test_royal_flush() {
    let result = eval("AsKsQsTsJs2h3d");
    assert_eq!(result.category, HandCategory::RoyalFlush);
}

#[test]
fn test_straight_flush() {
    let result = eval("9h8h7h6h5hAcKd");
    assert_eq!(result.category, HandCategory::StraightFlush);
    assert_eq!(result.kickers, vec![9]);
}

#[test]
fn test_four_of_a_kind() {
    let result = eval("KsKhKdKc5s2h3d");
    assert_eq!(result.category, HandCategory::FourOfAKind);
    assert_eq!(result.kickers, vec![13, 5]);
}

#[test]
fn test_full_house() {
    let result = eval("AsAhAdKsKh2c3d");
    assert_eq!(result.category, HandCategory::FullHouse);
    assert_eq!(result.kickers, vec![14, 13]);
}

#[test]
fn test_flush() {
    let result = eval("AsTs8s5s2sKdQh");
    assert_eq!(result.category, HandCategory::Flush);
    assert_eq!(result.kickers, vec![14, 10, 8, 5, 2]);
}

#[test]
fn test_straight() {
    let result = eval("9s8h7d6c5sAhKd");
    assert_eq!(result.category, HandCategory::Straight);
    assert_eq!(result.kickers, vec![9]);
}

#[test]
fn test_wheel() {
    let result = eval("As2h3d4c5sKhQd");
    assert_eq!(result.category, HandCategory::Straight);
    assert_eq!(result.kickers, vec![5]);
}

#[test]
fn test_two_pair_kicker() {
    let result = eval("AsAhKdKc9s2h3d");
    assert_eq!(result.category, HandCategory::TwoPair);
    assert_eq!(result.kickers, vec![14, 13, 9]);
}

#[test]
fn test_short_hands_have_no_straights() {
    // Four to a straight and four to a flush is still just high card.
    let result = eval("9s8s7s6s");
    assert_eq!(result.category, HandCategory::HighCard);
}

#[test]
fn test_single_card_strength_follows_rank() {
    let d = Deck::new(3, 2).unwrap();
    let j = d.parse_cards("Js").unwrap();
    let k = d.parse_cards("Kh").unwrap();
    assert_eq!(compare_hands(&d, &k, &j, &[]), Ordering::Greater);
}

#[test]
fn test_small_deck_ends_at_king() {
    let d = Deck::new(3, 2).unwrap();
    let k = d.parse_cards("Ks").unwrap();
    assert_eq!(evaluate(&d, &k).kickers, vec![13]);
}

#[test]
fn test_compare_split_pot() {
    let board = cards("AsKdQh7c2s");
    let h1 = cards("3h4d");
    let h2 = cards("3d4h");
    assert_eq!(compare_hands(&deck(), &h1, &h2, &board), Ordering::Equal);
}

#[test]
fn test_strength_skips_missing_card() {
    let d = Deck::new(3, 2).unwrap();
    let hole = [d.parse_card("Qs").unwrap(), NO_CARD];
    let board = d.parse_cards("Qh").unwrap();
    let packed = strength(&d, &hole, &board);
    assert_eq!(packed >> 20, HandCategory::OnePair as u32);
}

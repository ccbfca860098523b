//! The card shoe shared by every session at the table.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DECK_SIZE: usize = 52;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suit {
    Clubs,
    Diamonds,
    Hearts,
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Suit::Clubs => "clubs",
            Suit::Diamonds => "diamonds",
            Suit::Hearts => "hearts",
            Suit::Spades => "spades",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    Ace,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Ace,
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
    ];
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Rank::Ace => "ace",
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "jack",
            Rank::Queen => "queen",
            Rank::King => "king",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.rank, self.suit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeckError {
    #[error("the deck is exhausted")]
    Exhausted,
}

/// A single 52-card deck. Cards are dealt from the top until none remain;
/// nothing reshuffles automatically.
pub struct Deck {
    cards: Vec<Card>,
    rng: StdRng,
}

impl Default for Deck {
    fn default() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl Deck {
    pub fn new() -> Self {
        Self::default()
    }

    /// A deck whose shuffles are reproducible for a given seed.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            cards: Vec::with_capacity(DECK_SIZE),
            rng,
        }
    }

    /// Refills the deck with all 52 cards in suit order.
    pub fn build(&mut self) {
        self.cards.clear();
        for suit in Suit::ALL {
            for rank in Rank::ALL {
                self.cards.push(Card { rank, suit });
            }
        }
    }

    pub fn shuffle(&mut self) {
        self.cards.shuffle(&mut self.rng);
    }

    pub fn draw(&mut self) -> Result<Card, DeckError> {
        self.cards.pop().ok_or(DeckError::Exhausted)
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }
}

/// Handle to the table's deck. Clones share one deck; every draw takes the
/// lock so two sessions can never deal the same card.
#[derive(Clone)]
pub struct SharedDeck {
    inner: Arc<Mutex<Deck>>,
}

impl SharedDeck {
    pub fn new(deck: Deck) -> Self {
        Self {
            inner: Arc::new(Mutex::new(deck)),
        }
    }

    /// Builds and shuffles a fresh deck, seeded when `seed` is given.
    pub fn shuffled(seed: Option<u64>) -> Self {
        let mut deck = match seed {
            Some(seed) => Deck::with_seed(seed),
            None => Deck::new(),
        };
        deck.build();
        deck.shuffle();
        Self::new(deck)
    }

    pub fn draw(&self) -> Result<Card, DeckError> {
        self.lock().draw()
    }

    pub fn remaining(&self) -> usize {
        self.lock().remaining()
    }

    fn lock(&self) -> MutexGuard<'_, Deck> {
        // Deck operations never panic midway, so a poisoned lock still guards a valid deck.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

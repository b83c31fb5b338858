use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
enum Source {
    Scripted { outcomes: Vec<u8>, index: usize },
    Seeded(StdRng),
}

/// Random source for battle resolution.
///
/// Every draw is expressed as a percent roll in `1..=100`, so a scripted
/// sequence of rolls fully determines a turn. Seeded sources draw each roll
/// on demand from a `StdRng`.
#[derive(Debug, Clone)]
pub struct TurnRng {
    source: Source,
}

impl TurnRng {
    pub fn new_for_test(outcomes: Vec<u8>) -> Self {
        Self {
            source: Source::Scripted { outcomes, index: 0 },
        }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            source: Source::Seeded(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn new_random() -> Self {
        Self::from_seed(rand::rng().random())
    }

    fn scripted(outcomes: &[u8], index: &mut usize, reason: &str) -> u8 {
        if *index >= outcomes.len() {
            panic!(
                "TurnRng exhausted! Tried to get a value for: '{}'. Need more random values.",
                reason
            );
        }
        let outcome = outcomes[*index];

        #[cfg(test)]
        println!("[RNG] Consumed {} for: {}", outcome, reason);

        *index += 1;
        outcome
    }

    /// A percent roll in `1..=100`.
    pub fn next_outcome(&mut self, reason: &str) -> u8 {
        match &mut self.source {
            Source::Scripted { outcomes, index } => Self::scripted(outcomes, index, reason),
            Source::Seeded(rng) => rng.random_range(1..=100),
        }
    }

    /// A value in `0..bound`. Scripted rolls map onto the range proportionally.
    pub fn next_below(&mut self, bound: u32, reason: &str) -> u32 {
        if bound <= 1 {
            return 0;
        }
        match &mut self.source {
            Source::Scripted { outcomes, index } => {
                let roll = Self::scripted(outcomes, index, reason) as u32;
                (roll.clamp(1, 100) - 1) * bound / 100
            }
            Source::Seeded(rng) => rng.random_range(0..bound),
        }
    }

    /// A value in `[0, 1)`.
    pub fn next_fraction(&mut self, reason: &str) -> f64 {
        match &mut self.source {
            Source::Scripted { outcomes, index } => {
                let roll = Self::scripted(outcomes, index, reason) as f64;
                (roll.clamp(1.0, 100.0) - 0.5) / 100.0
            }
            Source::Seeded(rng) => rng.random::<f64>(),
        }
    }

    /// True with the given percent chance. Certain and impossible outcomes
    /// do not consume a roll.
    pub fn chance(&mut self, percent: u8, reason: &str) -> bool {
        match percent {
            0 => false,
            100.. => true,
            _ => self.next_outcome(reason) <= percent,
        }
    }

    pub fn coin_flip(&mut self, reason: &str) -> bool {
        self.next_below(2, reason) == 0
    }

    pub fn in_range(&mut self, range: std::ops::RangeInclusive<u8>, reason: &str) -> u8 {
        let (low, high) = (*range.start(), *range.end());
        if high <= low {
            return low;
        }
        low + self.next_below((high - low) as u32 + 1, reason) as u8
    }

    /// Index chosen in proportion to `weights`. `None` when every weight is zero.
    pub fn weighted_index(&mut self, weights: &[u32], reason: &str) -> Option<usize> {
        let total: u32 = weights.iter().sum();
        if total == 0 {
            return None;
        }
        let mut target = self.next_below(total, reason);
        for (i, &weight) in weights.iter().enumerate() {
            if target < weight {
                return Some(i);
            }
            target -= weight;
        }
        None
    }
}

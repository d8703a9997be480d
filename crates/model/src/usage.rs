use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Token accounting reported by the model provider.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub input_tokens: u64,
    /// Tokens generated by the model.
    pub output_tokens: u64,
    /// Total tokens billed for the request.
    pub total_tokens: u64,
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        TokenUsage {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate() {
        let mut usage = TokenUsage::default();
        usage += TokenUsage {
            input_tokens: 10,
            output_tokens: 2,
            total_tokens: 12,
        };
        usage += TokenUsage {
            input_tokens: 5,
            output_tokens: 1,
            total_tokens: 6,
        };
        assert_eq!(usage.input_tokens, 15);
        assert_eq!(usage.output_tokens, 3);
        assert_eq!(usage.total_tokens, 18);
    }
}

use std::str::FromStr;

/// Refill behavior selected by a rate spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Tokens regenerate continuously and fractionally as time elapses.
    Sliding,
    /// Tokens reset to full only at discrete window boundaries.
    Fixed,
}

/// Errors raised while parsing a rate spec string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateError {
    /// The spec string was empty.
    #[error("rate spec is empty")]
    Empty,

    /// The spec string had no `/` between the request count and period.
    #[error("rate spec is missing a '/' separator")]
    MissingSeparator,

    /// The request count was not a positive number.
    #[error("rate numerator must be a positive number, got {0:?}")]
    InvalidNumerator(String),

    /// The period count was not a positive integer.
    #[error("rate period count must be a positive integer, got {0:?}")]
    InvalidPeriod(String),

    /// The period unit was not part of the unit vocabulary.
    #[error("unrecognized time unit {0:?}")]
    UnknownUnit(String),

    /// Something other than `:fixed` followed the rate.
    #[error("unrecognized rate suffix {0:?}")]
    UnknownSuffix(String),
}

/// A parsed rate specification: how many tokens regenerate over which
/// period, and under which refill [`Mode`].
///
/// Specs follow the grammar `X/Yt(:fixed)`, where `X` is a positive
/// integer or decimal number of requests, `Y` is a positive integer
/// count of time units (defaulting to 1 when omitted), and `t` is one
/// of `ms`, `s`, `sec`, `second`, `m`, `min`, `minute`, `h`, `hour`,
/// `d`, `day`. Appending the literal `:fixed` selects fixed-window
/// refill; otherwise tokens trickle back continuously.
///
/// ```rust
/// use drip_limit::Mode;
/// use drip_limit::RateSpec;
///
/// let rate: RateSpec = "2.5/s".parse().unwrap();
/// assert_eq!(rate.mode(), Mode::Sliding);
///
/// let rate: RateSpec = "100/5min:fixed".parse().unwrap();
/// assert_eq!(rate.mode(), Mode::Fixed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSpec {
    numerator: f64,
    denominator_ms: u64,
    mode: Mode,
}

impl RateSpec {
    /// Requests regenerated per period.
    pub fn numerator(&self) -> f64 {
        self.numerator
    }

    /// Period length in milliseconds.
    pub fn denominator_ms(&self) -> u64 {
        self.denominator_ms
    }

    /// The refill mode this spec selects.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Tokens regenerated per elapsed millisecond.
    pub fn per_ms(&self) -> f64 {
        self.numerator / self.denominator_ms as f64
    }

    /// Time to regenerate exactly one token, in milliseconds.
    ///
    /// Sizes the reset window in fixed mode.
    pub fn window_ms(&self) -> f64 {
        self.denominator_ms as f64 / self.numerator
    }
}

impl FromStr for RateSpec {
    type Err = RateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RateError::Empty);
        }

        let (body, mode) = match s.split_once(':') {
            Some((body, "fixed")) => (body, Mode::Fixed),
            Some((_, suffix)) => return Err(RateError::UnknownSuffix(suffix.to_string())),
            None => (s, Mode::Sliding),
        };

        let (num, period) = body.split_once('/').ok_or(RateError::MissingSeparator)?;

        let numerator: f64 = num
            .parse()
            .map_err(|_| RateError::InvalidNumerator(num.to_string()))?;
        if !numerator.is_finite() || numerator <= 0.0 {
            return Err(RateError::InvalidNumerator(num.to_string()));
        }

        // The period is an optional digit run followed by the unit token.
        let unit_at = period
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(period.len());
        let (count, unit) = period.split_at(unit_at);

        let count: u64 = if count.is_empty() {
            1
        } else {
            count
                .parse()
                .map_err(|_| RateError::InvalidPeriod(count.to_string()))?
        };
        if count == 0 {
            return Err(RateError::InvalidPeriod(count.to_string()));
        }

        let unit_ms: u64 = match unit {
            "ms" => 1,
            "s" | "sec" | "second" => 1_000,
            "m" | "min" | "minute" => 60_000,
            "h" | "hour" => 3_600_000,
            "d" | "day" => 86_400_000,
            _ => return Err(RateError::UnknownUnit(unit.to_string())),
        };
        let denominator_ms = count
            .checked_mul(unit_ms)
            .ok_or_else(|| RateError::InvalidPeriod(count.to_string()))?;

        Ok(RateSpec {
            numerator,
            denominator_ms,
            mode,
        })
    }
}

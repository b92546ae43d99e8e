use crate::rate::Mode;
use crate::rate::RateSpec;

/// The persisted state of one rate-limited key.
///
/// This is the storage boundary: adapters must round-trip exactly these
/// three fields. Timestamps are integer milliseconds since the Unix
/// epoch so that buckets survive handoff between store backends.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    /// Tokens currently available. Held within `0..=burst` by
    /// [`Bucket::refill`].
    pub tokens: f64,
    /// When the bucket was last modified.
    pub mtime: u64,
    /// When the bucket reports as fully reset. In fixed mode this is
    /// the window boundary; in sliding mode it is advisory, for
    /// client-facing reporting.
    pub rtime: u64,
}

impl Bucket {
    /// A full bucket for a key seen for the first time.
    pub fn full(burst: f64, now_ms: u64) -> Self {
        Self {
            tokens: burst,
            mtime: now_ms,
            rtime: now_ms,
        }
    }

    /// Bring the bucket up to `now_ms` under `rate`.
    ///
    /// Pure: the receiver is untouched, and refilling twice at the same
    /// `now_ms` gains nothing over refilling once.
    ///
    /// Sliding mode trickles tokens back continuously and fractionally;
    /// intermediate values are never rounded, so fractional accumulation
    /// carries across calls. Fixed mode leaves the bucket untouched
    /// until the window boundary at `rtime`, then resets it to full.
    #[must_use]
    pub fn refill(&self, rate: &RateSpec, burst: f64, now_ms: u64) -> Self {
        match rate.mode() {
            Mode::Sliding => {
                let elapsed = now_ms.saturating_sub(self.mtime) as f64;
                let tokens = (self.tokens + elapsed * rate.per_ms()).min(burst);
                let deficit_ms = (burst - tokens) / rate.per_ms();
                Self {
                    tokens,
                    mtime: now_ms,
                    rtime: now_ms + deficit_ms.ceil() as u64,
                }
            }
            Mode::Fixed => {
                if now_ms >= self.rtime {
                    Self {
                        tokens: burst,
                        mtime: now_ms,
                        rtime: now_ms + rate.window_ms().ceil() as u64,
                    }
                } else {
                    self.clone()
                }
            }
        }
    }
}

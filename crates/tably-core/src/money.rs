//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely, plus the
//! largest-remainder allocation routine every split in the system goes
//! through.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  In many restaurant systems:                                            │
//! │    $100.00 / 3 = $33.33 (×3 = $99.99)  → Lost $0.01!                   │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Minor Units + Largest-Remainder Allocation       │
//! │    allocate(10000, [1,1,1]) = [3334, 3333, 3333]                       │
//! │    The leftover cent is handed out deterministically — the shares      │
//! │    ALWAYS sum back to the exact total                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tably_core::money::{allocate, Money, RateBps};
//!
//! // Create from cents (preferred)
//! let subtotal = Money::from_cents(4_000); // $40.00
//!
//! // Percentage math stays in fixed point
//! let tax = subtotal.apply_rate(RateBps::from_bps(825)); // 8.25%
//! assert_eq!(tax.cents(), 330);
//!
//! // NEVER do this:
//! // let bad = Money::from_float(10.99); // NO SUCH METHOD EXISTS!
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (cents for USD).
///
/// ## Design Decisions
/// - **i64 (signed)**: `Bill::remaining()` is allowed to go negative on
///   overpay, and the sign must survive so staff can see the discrepancy
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support for JSON serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    ///
    /// ## Why Cents?
    /// Using the smallest unit eliminates all floating-point concerns.
    /// The ledger, the chain payload, and the API all use cents.
    /// Only the UI converts to dollars for display.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents (smallest currency unit).
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (dollars) portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit (cents) portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Applies a fractional rate (tax or service fee), rounding half-up to
    /// the nearest minor unit.
    ///
    /// ## Implementation
    /// Integer math in i128: `(cents * bps + 5000) / 10000`.
    /// The +5000 provides half-up rounding (5000/10000 = 0.5), and i128
    /// prevents overflow on large amounts.
    ///
    /// ## Example
    /// ```rust
    /// use tably_core::money::{Money, RateBps};
    ///
    /// let subtotal = Money::from_cents(1000); // $10.00
    /// let rate = RateBps::from_bps(825);      // 8.25%
    ///
    /// // $10.00 × 8.25% = $0.825 → rounds up to $0.83 (83 cents)
    /// assert_eq!(subtotal.apply_rate(rate).cents(), 83);
    /// ```
    pub fn apply_rate(&self, rate: RateBps) -> Money {
        let cents = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money::from_cents(cents as i64)
    }

    /// Multiplies money by a quantity (line totals).
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Rate Type
// =============================================================================

/// A fractional rate (tax, service fee) in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 825 bps = 8.25% (e.g., Texas sales tax)
///
/// Storing the rate as an integer keeps every percentage computation in
/// fixed point; the fractional form (0.0825) never exists at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RateBps(u32);

impl RateBps {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        RateBps(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        RateBps(0)
    }

    /// Checks if the rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for RateBps {
    fn default() -> Self {
        RateBps::zero()
    }
}

// =============================================================================
// Largest-Remainder Allocation
// =============================================================================

/// Splits `total` across `weights` using the largest-remainder method.
///
/// ## Algorithm
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  LARGEST-REMAINDER ALLOCATION                                           │
/// │                                                                         │
/// │  1. floor_i   = floor(total × weight_i / Σweights)                     │
/// │  2. leftover  = total − Σfloor_i          (0 ≤ leftover < n)           │
/// │  3. Hand the leftover out one minor unit at a time to the shares       │
/// │     with the LARGEST fractional remainder, ties broken by index        │
/// │     ascending                                                           │
/// │                                                                         │
/// │  allocate(10000, [1,1,1])                                              │
/// │    floors    = [3333, 3333, 3333]   leftover = 1                       │
/// │    remainders all equal → index 0 wins the tie                         │
/// │    result    = [3334, 3333, 3333]   Σ = 10000 ✓                        │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
///
/// ## Postcondition
/// `Σ result == total` exactly, for any weights. This single routine
/// underlies equal splits, by-item tax/fee proration, and keeps every
/// derived plan consistent to the cent.
///
/// ## Edge Cases
/// - Empty `weights` returns an empty vector.
/// - An all-zero weight vector is treated as equal weights (weight 1 each)
///   rather than dividing by zero.
pub fn allocate(total: Money, weights: &[i64]) -> Vec<Money> {
    if weights.is_empty() {
        return Vec::new();
    }

    let weight_sum: i128 = weights.iter().map(|w| *w as i128).sum();

    // Degenerate all-zero weights: fall back to an equal split.
    if weight_sum == 0 {
        let ones = vec![1i64; weights.len()];
        return allocate(total, &ones);
    }

    let total_cents = total.cents() as i128;

    // Pass 1: floors and fractional remainders.
    let mut floors: Vec<i64> = Vec::with_capacity(weights.len());
    let mut remainders: Vec<(usize, i128)> = Vec::with_capacity(weights.len());
    let mut floor_sum: i128 = 0;

    for (index, weight) in weights.iter().enumerate() {
        let numerator = total_cents * *weight as i128;
        let floor = numerator.div_euclid(weight_sum);
        let remainder = numerator.rem_euclid(weight_sum);
        floors.push(floor as i64);
        remainders.push((index, remainder));
        floor_sum += floor;
    }

    // Pass 2: distribute the leftover minor units.
    // Largest remainder first; ties broken by ascending share index.
    remainders.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut leftover = (total_cents - floor_sum) as i64;
    for (index, _) in &remainders {
        if leftover == 0 {
            break;
        }
        floors[*index] += 1;
        leftover -= 1;
    }

    floors.into_iter().map(Money::from_cents).collect()
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation shows money in a human-readable format.
///
/// ## Note
/// This is for debugging and logs. Use frontend formatting for actual UI
/// display to handle localization properly.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.major().abs(), self.minor())
    }
}

/// Default money is zero.
impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

/// Addition of two Money values.
impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

/// Addition assignment (+=).
impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

/// Subtraction of two Money values.
impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

/// Subtraction assignment (-=).
impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Multiplication by i64 (for quantity calculations).
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "$10.99");
        assert_eq!(format!("{}", Money::from_cents(500)), "$5.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(format!("{}", Money::from_cents(0)), "$0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);
        assert_eq!(a.multiply_quantity(4).cents(), 4000);
    }

    #[test]
    fn test_apply_rate_basic() {
        // $10.00 at 10% = $1.00
        let amount = Money::from_cents(1000);
        assert_eq!(amount.apply_rate(RateBps::from_bps(1000)).cents(), 100);
    }

    #[test]
    fn test_apply_rate_rounds_half_up() {
        // $10.00 at 8.25% = $0.825 → $0.83
        let amount = Money::from_cents(1000);
        assert_eq!(amount.apply_rate(RateBps::from_bps(825)).cents(), 83);

        // $10.01 at 8.25% = $0.825825 → $0.83
        let amount = Money::from_cents(1001);
        assert_eq!(amount.apply_rate(RateBps::from_bps(825)).cents(), 83);

        // $0.30 at 15% = $0.045 → exactly half, rounds up to $0.05
        let amount = Money::from_cents(30);
        assert_eq!(amount.apply_rate(RateBps::from_bps(1500)).cents(), 5);
    }

    #[test]
    fn test_allocate_three_equal_participants() {
        // $100.00 across three diners: leftover cent goes to index 0.
        let shares = allocate(Money::from_cents(10_000), &[1, 1, 1]);
        let cents: Vec<i64> = shares.iter().map(Money::cents).collect();
        assert_eq!(cents, vec![3334, 3333, 3333]);
        assert_eq!(cents.iter().sum::<i64>(), 10_000);
    }

    #[test]
    fn test_allocate_weighted() {
        // Weights 2:1 over $1.00 → 67/33, largest remainder decides the
        // leftover cent.
        let shares = allocate(Money::from_cents(100), &[2, 1]);
        let cents: Vec<i64> = shares.iter().map(Money::cents).collect();
        assert_eq!(cents.iter().sum::<i64>(), 100);
        assert_eq!(cents, vec![67, 33]);
    }

    #[test]
    fn test_allocate_always_sums_to_total() {
        let cases: &[(i64, &[i64])] = &[
            (1, &[1, 1, 1, 1, 1, 1, 1]),
            (4250, &[3, 5, 7]),
            (9999, &[1, 2, 3, 4, 5]),
            (10_000, &[999, 1]),
            (1234, &[1299, 450, 875, 2200]),
        ];

        for (total, weights) in cases {
            let shares = allocate(Money::from_cents(*total), weights);
            let sum: i64 = shares.iter().map(Money::cents).sum();
            assert_eq!(sum, *total, "weights {:?} broke the total", weights);
            assert_eq!(shares.len(), weights.len());
        }
    }

    #[test]
    fn test_allocate_tie_break_by_index() {
        // Five equal weights over 3 cents: the three lowest indices win.
        let shares = allocate(Money::from_cents(3), &[1, 1, 1, 1, 1]);
        let cents: Vec<i64> = shares.iter().map(Money::cents).collect();
        assert_eq!(cents, vec![1, 1, 1, 0, 0]);
    }

    #[test]
    fn test_allocate_empty_and_zero_weights() {
        assert!(allocate(Money::from_cents(100), &[]).is_empty());

        // All-zero weights degrade to an equal split.
        let shares = allocate(Money::from_cents(100), &[0, 0]);
        let cents: Vec<i64> = shares.iter().map(Money::cents).collect();
        assert_eq!(cents, vec![50, 50]);
    }

    #[test]
    fn test_allocate_zero_weight_share_gets_nothing() {
        let shares = allocate(Money::from_cents(100), &[1, 0, 1]);
        let cents: Vec<i64> = shares.iter().map(Money::cents).collect();
        assert_eq!(cents, vec![50, 0, 50]);
    }

    #[test]
    fn test_zero_and_checks() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());

        let negative = Money::from_cents(-250);
        assert!(negative.is_negative());
        assert_eq!(negative.abs().cents(), 250);
    }
}

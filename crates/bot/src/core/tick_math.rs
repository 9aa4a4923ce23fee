//! Pure concentrated-liquidity math: tick ↔ √price, range ratios, alignment.
//!
//! All price math follows the canonical relation `sqrtPrice(tick) =
//! 1.0001^(tick/2)`. Doubles are only used for ratio decisions, where
//! relative error well below 1e-12 is acceptable; minimum-output bounds
//! always come from quoter output, never from this module.

use crate::constants::{BASE_HALF_WIDTH_TICKS, MAX_TICK, MIN_TICK};
use crate::errors::BotError;
use crate::types::{RangeRatio, TickRange};

/// `sqrt(1.0001^tick)`.
pub fn sqrt_price(tick: i32) -> f64 {
    1.0001_f64.powf(tick as f64 / 2.0)
}

/// token1-per-token0 price in decimal-adjusted units: `1.0001^tick ·
/// 10^(dec0 − dec1)`. Diagnostics and ratio math only.
pub fn human_price(tick: i32, dec0: u8, dec1: u8) -> f64 {
    1.0001_f64.powi(tick) * 10_f64.powi(dec0 as i32 - dec1 as i32)
}

/// Target value split between token0 and token1 for a range at the current
/// tick.
///
/// Outside the range the split is degenerate: all token0 below, all token1
/// above. Inside, the raw amount ratio `(1/√cur − 1/√upper) / (√cur −
/// √lower)` is decimal-adjusted and priced into value fractions.
pub fn ratio_for_range(
    current_tick: i32,
    range: TickRange,
    dec0: u8,
    dec1: u8,
) -> RangeRatio {
    if current_tick < range.lower {
        return RangeRatio {
            token0_ratio: 1.0,
            token1_ratio: 0.0,
            in_range: false,
            below_range: true,
        };
    }
    if current_tick > range.upper {
        return RangeRatio {
            token0_ratio: 0.0,
            token1_ratio: 1.0,
            in_range: false,
            below_range: false,
        };
    }

    let sqrt_cur = sqrt_price(current_tick);
    let sqrt_lower = sqrt_price(range.lower);
    let sqrt_upper = sqrt_price(range.upper);

    // At the lower boundary the token1 leg vanishes entirely.
    if sqrt_cur - sqrt_lower <= f64::EPSILON * sqrt_cur {
        return RangeRatio {
            token0_ratio: 1.0,
            token1_ratio: 0.0,
            in_range: true,
            below_range: false,
        };
    }

    let raw_ratio = (1.0 / sqrt_cur - 1.0 / sqrt_upper) / (sqrt_cur - sqrt_lower);
    let human_ratio = raw_ratio * 10_f64.powi(dec1 as i32 - dec0 as i32);
    let price = human_price(current_tick, dec0, dec1);

    let value0 = human_ratio * price;
    let value1 = 1.0;
    let total = value0 + value1;

    RangeRatio {
        token0_ratio: value0 / total,
        token1_ratio: value1 / total,
        in_range: true,
        below_range: false,
    }
}

/// Raw token amounts backing `liquidity` over a range, by the standard V3
/// three-branch formulas. Observability only; slippage bounds use quoter
/// output instead.
pub fn amounts_for_liquidity(
    liquidity: u128,
    current_tick: i32,
    range: TickRange,
) -> (f64, f64) {
    let l = liquidity as f64;
    let sqrt_lower = sqrt_price(range.lower);
    let sqrt_upper = sqrt_price(range.upper);

    if current_tick < range.lower {
        (l * (1.0 / sqrt_lower - 1.0 / sqrt_upper), 0.0)
    } else if current_tick >= range.upper {
        (0.0, l * (sqrt_upper - sqrt_lower))
    } else {
        let sqrt_cur = sqrt_price(current_tick);
        (
            l * (1.0 / sqrt_cur - 1.0 / sqrt_upper),
            l * (sqrt_cur - sqrt_lower),
        )
    }
}

/// Rounding direction for [`align_to_spacing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Floor,
    Ceil,
}

/// Snap a tick onto the pool's grid, clamped inside the chain tick bounds.
pub fn align_to_spacing(tick: i32, spacing: i32, mode: Align) -> i32 {
    debug_assert!(spacing > 0);
    let aligned = if tick.rem_euclid(spacing) == 0 {
        tick
    } else {
        match mode {
            Align::Floor => tick.div_euclid(spacing) * spacing,
            Align::Ceil => (tick.div_euclid(spacing) + 1) * spacing,
        }
    };

    if aligned < MIN_TICK {
        (MIN_TICK.div_euclid(spacing) + 1) * spacing
    } else if aligned > MAX_TICK {
        MAX_TICK.div_euclid(spacing) * spacing
    } else {
        aligned
    }
}

/// Build a fresh range around the current tick.
///
/// The half-width is a ~30-tick base scaled by the configured multiplier;
/// spacings coarser than the base saturate at it so wide-spaced pools still
/// get a non-degenerate range.
pub fn compute_new_range(
    current_tick: i32,
    spacing: i32,
    range_multiplier: f64,
) -> Result<TickRange, BotError> {
    let base = if spacing >= BASE_HALF_WIDTH_TICKS {
        BASE_HALF_WIDTH_TICKS
    } else {
        spacing * (BASE_HALF_WIDTH_TICKS / spacing)
    };
    let half_width = (base as f64 * range_multiplier).round() as i32;

    let lower = align_to_spacing(current_tick - half_width, spacing, Align::Floor);
    let upper = align_to_spacing(current_tick + half_width, spacing, Align::Ceil);

    if lower >= upper {
        return Err(BotError::InvalidRange { lower, upper });
    }
    Ok(TickRange { lower, upper })
}

/// Drift past the nearest range boundary, as a percentage of the range
/// width. Zero while in range.
pub fn percent_out(range: TickRange, current_tick: i32) -> f64 {
    if range.contains(current_tick) {
        return 0.0;
    }
    let width = range.width() as f64;
    let boundary = if current_tick < range.lower {
        range.lower
    } else {
        range.upper
    };
    (current_tick - boundary).abs() as f64 / width * 100.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- alignment ----------------------------------------------------------

    #[test]
    fn alignment_properties_hold_over_sweep() {
        let spacings = [1, 10, 50, 60, 100, 200];
        let multipliers = [0.5, 1.0, 2.6, 10.0];
        let ticks = [
            -800_004, -196_320, -60, -1, 0, 1, 59, 60, 100_003, 800_004,
        ];

        for &spacing in &spacings {
            for &m in &multipliers {
                for &tick in &ticks {
                    let range = compute_new_range(tick, spacing, m)
                        .expect("range must not collapse in sweep");
                    assert_eq!(range.lower.rem_euclid(spacing), 0);
                    assert_eq!(range.upper.rem_euclid(spacing), 0);
                    assert!(range.lower < range.upper);
                    assert!(range.lower <= tick && tick <= range.upper);
                    assert!(range.lower >= MIN_TICK && range.upper <= MAX_TICK);
                }
            }
        }
    }

    #[test]
    fn aligned_tick_is_fixed_point_of_ceil() {
        for &spacing in &[10, 60, 200] {
            for &tick in &[-196_398, -61, 0, 61, 100_003] {
                let floored = align_to_spacing(tick, spacing, Align::Floor);
                assert_eq!(align_to_spacing(floored, spacing, Align::Ceil), floored);
            }
        }
    }

    #[test]
    fn alignment_clamps_to_bounds() {
        let below = align_to_spacing(MIN_TICK - 1_000, 60, Align::Floor);
        assert!(below >= MIN_TICK);
        assert_eq!(below.rem_euclid(60), 0);

        let above = align_to_spacing(MAX_TICK + 1_000, 60, Align::Ceil);
        assert!(above <= MAX_TICK);
        assert_eq!(above.rem_euclid(60), 0);
    }

    #[test]
    fn drifted_position_gets_expected_fresh_range() {
        // tickSpacing 60 pool, price drifted to -196320.
        let range = compute_new_range(-196_320, 60, 2.6).unwrap();
        assert_eq!(range.lower, -196_440);
        assert_eq!(range.upper, -196_200);
        assert!(range.contains(-196_320));
    }

    // -- ratio --------------------------------------------------------------

    #[test]
    fn ratio_is_all_token0_below_range() {
        let range = TickRange {
            lower: -195_000,
            upper: -194_400,
        };
        let ratio = ratio_for_range(-196_800, range, 9, 6);
        assert!(ratio.below_range);
        assert!(!ratio.in_range);
        assert_eq!(ratio.token0_ratio, 1.0);
        assert_eq!(ratio.token1_ratio, 0.0);
    }

    #[test]
    fn ratio_is_all_token1_above_range() {
        let range = TickRange {
            lower: -196_560,
            upper: -196_440,
        };
        let ratio = ratio_for_range(-196_320, range, 9, 6);
        assert!(!ratio.below_range);
        assert!(!ratio.in_range);
        assert_eq!(ratio.token0_ratio, 0.0);
        assert_eq!(ratio.token1_ratio, 1.0);
    }

    #[test]
    fn in_range_ratio_sums_to_one() {
        let range = TickRange {
            lower: -196_440,
            upper: -196_200,
        };
        let ratio = ratio_for_range(-196_320, range, 9, 6);
        assert!(ratio.in_range);
        assert!(ratio.token0_ratio > 0.0 && ratio.token0_ratio < 1.0);
        assert!((ratio.token0_ratio + ratio.token1_ratio - 1.0).abs() < 1e-12);
    }

    #[test]
    fn raising_lower_bound_shifts_mix_toward_token0() {
        // As tickLower approaches the current tick the required token1 leg
        // shrinks; at the boundary the mix is all token0 (the below-range
        // degenerate case). token0Ratio must be non-decreasing along the way.
        let current = 0;
        let upper = 600;
        let mut prev = -1.0;
        for lower in (-6_000..=-60).step_by(60) {
            let ratio = ratio_for_range(current, TickRange { lower, upper }, 18, 6);
            assert!(
                ratio.token0_ratio >= prev - 1e-12,
                "ratio regressed at lower={lower}"
            );
            prev = ratio.token0_ratio;
        }
    }

    #[test]
    fn lowering_upper_bound_shifts_mix_toward_token1() {
        let current = 0;
        let lower = -600;
        let mut prev = -1.0;
        for upper in (60..=6_000).step_by(60).rev() {
            let ratio = ratio_for_range(current, TickRange { lower, upper }, 18, 6);
            assert!(
                ratio.token1_ratio >= prev - 1e-12,
                "ratio regressed at upper={upper}"
            );
            prev = ratio.token1_ratio;
        }
    }

    #[test]
    fn ratio_at_lower_boundary_is_all_token0() {
        let range = TickRange {
            lower: -600,
            upper: 600,
        };
        let ratio = ratio_for_range(-600, range, 18, 18);
        assert!(ratio.in_range);
        assert_eq!(ratio.token0_ratio, 1.0);
    }

    // -- prices & amounts ---------------------------------------------------

    #[test]
    fn human_price_decimal_adjustment() {
        // At tick 0 the raw price is 1; decimals shift it by powers of ten.
        assert!((human_price(0, 6, 6) - 1.0).abs() < 1e-15);
        assert!((human_price(0, 9, 6) - 1_000.0).abs() < 1e-9);
        assert!((human_price(0, 6, 9) - 0.001).abs() < 1e-15);
    }

    #[test]
    fn amounts_follow_price_position() {
        let range = TickRange {
            lower: -600,
            upper: 600,
        };
        let liquidity = 1_000_000_000_000_000_000_u128;

        let (a0, a1) = amounts_for_liquidity(liquidity, -1_200, range);
        assert!(a0 > 0.0 && a1 == 0.0);

        let (a0, a1) = amounts_for_liquidity(liquidity, 1_200, range);
        assert!(a0 == 0.0 && a1 > 0.0);

        let (a0, a1) = amounts_for_liquidity(liquidity, 0, range);
        assert!(a0 > 0.0 && a1 > 0.0);
    }

    // -- classification -----------------------------------------------------

    #[test]
    fn percent_out_at_full_width_drift() {
        // Width-120 range, price 120 ticks past the upper bound.
        let range = TickRange {
            lower: -196_560,
            upper: -196_440,
        };
        assert!((percent_out(range, -196_320) - 100.0).abs() < 1e-12);
        assert_eq!(percent_out(range, -196_500), 0.0);
    }

    #[test]
    fn percent_out_below_range() {
        let range = TickRange {
            lower: -195_000,
            upper: -194_400,
        };
        // 1800 ticks below a width-600 range.
        assert!((percent_out(range, -196_800) - 300.0).abs() < 1e-12);
    }
}

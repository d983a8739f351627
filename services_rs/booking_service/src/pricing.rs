use serde::Serialize;

pub const TAX_RATE: f64 = 0.18;
pub const PLATFORM_FEE_RATE: f64 = 0.05;

/// Price breakdown for a stay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pricing {
    pub nightly_rate: f64,
    pub nightly_price: f64,
    pub number_of_nights: i32,
    pub tax: f64,
    pub platform_fee: f64,
    pub total_price: f64,
}

/// Rounds to two decimals, half away from zero.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Whole minor currency units (paise, cents) for `amount`.
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// `guests` does not affect the price yet; it is accepted so callers pass the full stay.
pub fn price(base_nightly_rate: f64, nights: i32, _guests: i32) -> Pricing {
    let nightly_price = base_nightly_rate * f64::from(nights);
    let tax = nightly_price * TAX_RATE;
    let platform_fee = nightly_price * PLATFORM_FEE_RATE;

    Pricing {
        nightly_rate: base_nightly_rate,
        nightly_price,
        number_of_nights: nights,
        tax: round2(tax),
        platform_fee: round2(platform_fee),
        // Summed before rounding the parts.
        total_price: round2(nightly_price + tax + platform_fee),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_nights_at_one_hundred() {
        let p = price(100.0, 3, 2);
        assert_eq!(p.nightly_price, 300.0);
        assert_eq!(p.tax, 54.0);
        assert_eq!(p.platform_fee, 15.0);
        assert_eq!(p.total_price, 369.0);
        assert_eq!(p.number_of_nights, 3);
    }

    #[test]
    fn total_tracks_combined_rate() {
        for rate in [0.0, 1.0, 49.99, 120.5, 999.95, 2500.0] {
            for nights in 1..=30 {
                let p = price(rate, nights, 1);
                let expected = round2(rate * f64::from(nights) * 1.23);
                assert!(
                    (p.total_price - expected).abs() <= 0.01 + 1e-9,
                    "rate={rate} nights={nights} got={} want={expected}",
                    p.total_price
                );
            }
        }
    }

    #[test]
    fn components_are_rounded_to_cents() {
        let p = price(33.33, 1, 1);
        assert_eq!(p.tax, 6.0);
        assert_eq!(p.platform_fee, 1.67);
        assert_eq!(p.total_price, 41.0);
    }

    #[test]
    fn guests_do_not_change_price() {
        assert_eq!(price(80.0, 2, 1), price(80.0, 2, 6));
    }

    #[test]
    fn round2_goes_half_away_from_zero() {
        assert_eq!(round2(1.125), 1.13);
        assert_eq!(round2(-1.125), -1.13);
        assert_eq!(round2(2.0), 2.0);
    }

    #[test]
    fn minor_units() {
        assert_eq!(to_minor_units(369.0), 36_900);
        assert_eq!(to_minor_units(41.0), 4_100);
        assert_eq!(to_minor_units(0.29), 29);
    }
}

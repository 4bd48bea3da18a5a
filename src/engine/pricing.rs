use crate::model::PriceBreakdown;
use crate::{Amount, Rate};

/// Tax and service-charge rates applied on top of the base price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingRates {
    pub tax: Rate,
    pub service: Rate,
}

/// Price a stay of `nights` for `room_count` rooms.
///
/// Each component is rounded half-up to cents on its own and the total is the
/// sum of the rounded components, so every line of the breakdown is auditable.
/// `None` when any line would overflow.
pub fn compute_breakdown(
    rate_per_night: Amount,
    nights: u32,
    room_count: u32,
    rates: PricingRates,
) -> Option<PriceBreakdown> {
    let base = rate_per_night.checked_mul(nights)?.checked_mul(room_count)?;
    let tax = base.apply_rate(rates.tax)?;
    let service_charge = base.apply_rate(rates.service)?;
    let total = base.checked_add(tax)?.checked_add(service_charge)?;
    Some(PriceBreakdown {
        base,
        tax,
        service_charge,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates() -> PricingRates {
        PricingRates {
            tax: "0.16".parse().unwrap(),
            service: "0.05".parse().unwrap(),
        }
    }

    #[test]
    fn three_nights_two_rooms() {
        let price = compute_breakdown("100.00".parse().unwrap(), 3, 2, rates()).unwrap();
        assert_eq!(price.base, "600.00".parse().unwrap());
        assert_eq!(price.tax, "96.00".parse().unwrap());
        assert_eq!(price.service_charge, "30.00".parse().unwrap());
        assert_eq!(price.total, "726.00".parse().unwrap());
    }

    #[test]
    fn components_round_independently() {
        // base 33.33: tax 5.3328 -> 5.33, service 1.6665 -> 1.67
        let price = compute_breakdown("33.33".parse().unwrap(), 1, 1, rates()).unwrap();
        assert_eq!(price.tax, Amount::from_cents(533));
        assert_eq!(price.service_charge, Amount::from_cents(167));
        assert_eq!(price.total, Amount::from_cents(3333 + 533 + 167));
    }

    #[test]
    fn minimum_rate() {
        let price = compute_breakdown(Amount::from_cents(1), 1, 1, rates()).unwrap();
        assert_eq!(price.base, Amount::from_cents(1));
        assert_eq!(price.tax, Amount::ZERO);
        assert_eq!(price.service_charge, Amount::ZERO);
        assert_eq!(price.total, Amount::from_cents(1));
    }

    #[test]
    fn zero_rates() {
        let zero = PricingRates {
            tax: Rate::default(),
            service: Rate::default(),
        };
        let price = compute_breakdown(Amount::from_units(80), 2, 1, zero).unwrap();
        assert_eq!(price.total, Amount::from_units(160));
    }

    #[test]
    fn overflow_is_none() {
        let rate: Amount = "90000000000000000.00".parse().unwrap();
        assert_eq!(compute_breakdown(rate, 3, 2, rates()), None);
        // base and tax fit, their sum does not
        let rate = Amount::from_cents(i64::MAX / 100 * 90);
        assert_eq!(compute_breakdown(rate, 1, 1, rates()), None);
    }
}

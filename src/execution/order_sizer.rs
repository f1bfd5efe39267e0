use crate::config::SizingConfig;
use crate::models::SymbolFilters;

/// Tolerance (in step units) that keeps float noise like `2.9999999999`
/// from losing a whole step when flooring
const STEP_EPSILON: f64 = 1e-9;

/// Why a sizing attempt produced no tradable quantity
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizingRejection {
    /// Price, balance or filters make sizing meaningless
    InvalidInput,
    BelowMinQty { qty: f64, min_qty: f64 },
    BelowMinNotional { notional: f64, required: f64 },
}

/// Result of sizing: a positive exchange-compliant quantity or a rejection
pub type Sizing = std::result::Result<f64, SizingRejection>;

/// Converts balances into exchange-compliant order quantities.
///
/// Pure: the same filters, balance and price always give the same answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderSizer {
    pub buy_buffer: f64,
    pub sell_buffer: f64,
    pub notional_safety: f64,
}

impl Default for OrderSizer {
    fn default() -> Self {
        Self::from(&SizingConfig::default())
    }
}

impl From<&SizingConfig> for OrderSizer {
    fn from(config: &SizingConfig) -> Self {
        Self {
            buy_buffer: config.buy_buffer,
            sell_buffer: config.sell_buffer,
            notional_safety: config.notional_safety,
        }
    }
}

impl OrderSizer {
    /// Quantity to buy with `quote_balance` at `price`
    ///
    /// Always floors to the step so the notional never exceeds the balance,
    /// then requires `min_qty` and `min_notional * notional_safety`.
    pub fn size_buy(&self, filters: &SymbolFilters, quote_balance: f64, price: f64) -> Sizing {
        if !valid_number(price) || !valid_number(quote_balance) || !valid_filters(filters) {
            return Err(SizingRejection::InvalidInput);
        }

        let raw_qty = quote_balance * self.buy_buffer / price;
        let qty = floor_to_step(raw_qty, filters.step_size);

        if qty <= 0.0 || qty < filters.min_qty {
            return Err(SizingRejection::BelowMinQty {
                qty,
                min_qty: filters.min_qty,
            });
        }

        let notional = qty * price;
        let required = filters.min_notional * self.notional_safety;
        if notional < required {
            return Err(SizingRejection::BelowMinNotional { notional, required });
        }

        Ok(qty)
    }

    /// Quantity to sell out of `base_balance`
    ///
    /// No notional margin here: an exit clears whatever is held.
    pub fn size_sell(&self, filters: &SymbolFilters, base_balance: f64) -> Sizing {
        if !valid_number(base_balance) || !valid_filters(filters) {
            return Err(SizingRejection::InvalidInput);
        }

        let raw_qty = base_balance * self.sell_buffer;
        let qty = floor_to_step(raw_qty, filters.step_size);

        if qty <= 0.0 || qty < filters.min_qty {
            return Err(SizingRejection::BelowMinQty {
                qty,
                min_qty: filters.min_qty,
            });
        }

        Ok(qty)
    }
}

/// Round `qty` down to a multiple of `step`
pub fn floor_to_step(qty: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return qty;
    }
    ((qty / step) + STEP_EPSILON).floor() * step
}

fn valid_number(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn valid_filters(filters: &SymbolFilters) -> bool {
    valid_number(filters.step_size)
        && filters.min_qty.is_finite()
        && filters.min_qty >= 0.0
        && filters.min_notional.is_finite()
        && filters.min_notional >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters() -> SymbolFilters {
        SymbolFilters {
            step_size: 0.01,
            min_qty: 0.1,
            min_notional: 10.0,
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_buy_accepts_and_floors() {
        // raw = 205 * 0.99 / 20 = 10.1475 -> 10.14, notional 202.8 >= 11
        let qty = OrderSizer::default().size_buy(&filters(), 205.0, 20.0).unwrap();
        assert!(approx(qty, 10.14));
        assert!(qty * 20.0 <= 205.0);
    }

    #[test]
    fn test_buy_rejects_below_safe_notional() {
        // raw = 10 * 0.99 / 20 = 0.495 -> 0.49, notional 9.8 < 11
        let result = OrderSizer::default().size_buy(&filters(), 10.0, 20.0);
        match result {
            Err(SizingRejection::BelowMinNotional { notional, required }) => {
                assert!(approx(notional, 9.8));
                assert!(approx(required, 11.0));
            }
            other => panic!("expected notional rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_buy_rejects_just_above_raw_min_notional() {
        // 10.5 notional would pass the exchange minimum but not the 1.1 margin
        let result = OrderSizer::default().size_buy(&filters(), 10.65, 1.0);
        assert!(matches!(result, Err(SizingRejection::BelowMinNotional { .. })));
    }

    #[test]
    fn test_buy_rejects_below_min_qty() {
        let strict = SymbolFilters {
            step_size: 0.01,
            min_qty: 1.0,
            min_notional: 0.0,
        };
        let result = OrderSizer::default().size_buy(&strict, 100.0, 200.0);
        assert!(matches!(result, Err(SizingRejection::BelowMinQty { .. })));
    }

    #[test]
    fn test_buy_never_rounds_up() {
        // raw = 99 * 0.99 / 1 = 98.01 with step 1 -> 98, not 99
        let coarse = SymbolFilters {
            step_size: 1.0,
            min_qty: 1.0,
            min_notional: 1.0,
        };
        let qty = OrderSizer::default().size_buy(&coarse, 99.0, 1.0).unwrap();
        assert_eq!(qty, 98.0);
    }

    #[test]
    fn test_sell_keeps_dust_margin() {
        // 5 * 0.999 = 4.995 -> 4.99
        let qty = OrderSizer::default().size_sell(&filters(), 5.0).unwrap();
        assert!(approx(qty, 4.99));
    }

    #[test]
    fn test_sell_ignores_notional_margin() {
        // 0.2 units is far below any notional minimum but still sellable
        let qty = OrderSizer::default().size_sell(&filters(), 0.2).unwrap();
        assert!(approx(qty, 0.19));
    }

    #[test]
    fn test_sell_rejects_dust() {
        let result = OrderSizer::default().size_sell(&filters(), 0.05);
        assert!(matches!(result, Err(SizingRejection::BelowMinQty { .. })));
        let result = OrderSizer::default().size_sell(&filters(), 0.0);
        assert_eq!(result, Err(SizingRejection::InvalidInput));
    }

    #[test]
    fn test_invalid_inputs_are_rejected() {
        let sizer = OrderSizer::default();
        assert_eq!(sizer.size_buy(&filters(), 100.0, 0.0), Err(SizingRejection::InvalidInput));
        assert_eq!(
            sizer.size_buy(&filters(), f64::NAN, 20.0),
            Err(SizingRejection::InvalidInput)
        );
        let no_step = SymbolFilters {
            step_size: 0.0,
            ..filters()
        };
        assert_eq!(sizer.size_buy(&no_step, 100.0, 20.0), Err(SizingRejection::InvalidInput));
    }

    #[test]
    fn test_sizing_is_pure() {
        let sizer = OrderSizer::default();
        let first = sizer.size_buy(&filters(), 1234.56, 17.3);
        for _ in 0..10 {
            assert_eq!(sizer.size_buy(&filters(), 1234.56, 17.3), first);
        }
    }

    #[test]
    fn test_floor_to_step_absorbs_float_noise() {
        assert!(approx(floor_to_step(0.3, 0.1), 0.3));
        assert!(approx(floor_to_step(0.299, 0.1), 0.2));
        assert_eq!(floor_to_step(7.0, 0.0), 7.0);
    }
}

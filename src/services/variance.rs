use rust_decimal::Decimal;

/// Result of one variance evaluation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VarianceResult {
    pub variance: Decimal,
    pub reason_required: bool,
}

/// Computes counted-vs-stock variance and whether a reason is mandatory.
///
/// Pure function of its inputs; re-run on every relevant field change and
/// again, authoritatively, at submit time. Returnable damaged units still
/// exist physically, so they count toward the total against stock;
/// non-returnable damage does not enter the formula.
pub fn evaluate(counted_qty: Decimal, returnable_damaged_qty: Decimal, stock_qty: Decimal) -> VarianceResult {
    let variance = counted_qty + returnable_damaged_qty - stock_qty;
    VarianceResult {
        variance,
        reason_required: !variance.is_zero(),
    }
}

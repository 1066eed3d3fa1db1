use crate::enums::SegmentTier;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Lower ARR bound (inclusive) of the enterprise tier.
pub const ENTERPRISE_MIN_ARR: Decimal = dec!(100000);
/// Lower ARR bound (inclusive) of the mid-market tier.
pub const MID_MARKET_MIN_ARR: Decimal = dec!(25000);

/// Maps an ARR figure to its segment tier.
///
/// Total over every decimal: zero and negative ARR land in `Smb`.
pub fn classify(arr: Decimal) -> SegmentTier {
    if arr >= ENTERPRISE_MIN_ARR {
        SegmentTier::Enterprise
    } else if arr >= MID_MARKET_MIN_ARR {
        SegmentTier::MidMarket
    } else {
        SegmentTier::Smb
    }
}

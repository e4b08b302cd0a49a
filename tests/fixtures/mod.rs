//! Upload records in both naming conventions, as exported from the mill.

use serde_json::{json, Value};

/// Channel section from the medium-merchant mill, normalized naming.
pub fn channel_record() -> Value {
    json!({
        "heat": "C103262",
        "mill": "MM",
        "section": "CHANNEL 75*40*4.8",
        "grade": "IS 2062 EZSOBR",
        "bundle": "1",
        "unit": "MM"
    })
}

/// TMT bar bundle in the tracking system's upper-case export.
pub fn tmt_legacy_record(bundle: u32) -> Value {
    json!({
        "ID": format!("20250143{bundle:02}"),
        "HEAT_NO": "C075400",
        "SECTION": "TMT BAR 25",
        "GRADE": "IS 1786 FE550D",
        "MILL": "MM",
        "UNIT": "SAIL-BSP",
        "BUNDLE_NOS": bundle,
        "PRODUCT_HEADING": "TMT BAR",
        "ISI_TOP": "IS 1786",
        "ISI_BOTTOM": "CM/L-4100085001",
        "LENGTH": "12000",
        "WEIGHT": "2.1",
        "LOCATION": "BAY-4",
        "PQD": "101520002123005267",
        "DATE1": "04-MAR-24",
        "TIME1": "14:21",
        "CHARGE_DTM": "2024-03-04 14:21:07"
    })
}

/// The same TMT bundle as re-read by a newer uploader: other naming,
/// later timestamp, re-weighed.
pub fn tmt_normalized_reread(bundle: u32) -> Value {
    json!({
        "label_id": format!("20250143{bundle:02}"),
        "heat_no": "C075400",
        "section": "TMT BAR 25",
        "grade": "IS 1786 FE550D",
        "mill": "MM",
        "unit": "SAIL-BSP",
        "bundle_no": bundle.to_string(),
        "date": "05-MAR-24",
        "time": "09:02",
        "weight": "2.2"
    })
}
